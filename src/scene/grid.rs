//! 线框网格

use crate::core::math::{Color, Vector3};
use crate::renderer::vertex::LineVertex;

/// 生成由两组平行线组成的网格
///
/// # 参数
///
/// * `divisions` - 每个方向的分段数
/// * `x_axis` / `y_axis` - 网格两条轴的半长向量
/// * `origin` - 网格中心
pub fn grid_lines(divisions: u32, x_axis: Vector3, y_axis: Vector3, origin: Vector3, color: Color) -> Vec<LineVertex> {
    let divisions = divisions.max(1);
    let mut vertices = Vec::with_capacity(4 * (divisions as usize + 1));

    for i in 0..=divisions {
        let percent = (i as f32 / divisions as f32) * 2.0 - 1.0;
        let scale = x_axis * percent + origin;
        vertices.push(LineVertex::new(scale - y_axis, color));
        vertices.push(LineVertex::new(scale + y_axis, color));
    }

    for i in 0..=divisions {
        let percent = (i as f32 / divisions as f32) * 2.0 - 1.0;
        let scale = y_axis * percent + origin;
        vertices.push(LineVertex::new(scale - x_axis, color));
        vertices.push(LineVertex::new(scale + x_axis, color));
    }

    vertices
}

/// 示例中的 XZ 平面网格
pub fn floor_grid(divisions: u32) -> Vec<LineVertex> {
    grid_lines(
        divisions,
        Vector3::new(2.0, 0.0, 0.0),
        Vector3::new(0.0, 0.0, 2.0),
        Vector3::zeros(),
        Color::WHITE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_grid() {
        let lines = floor_grid(20);
        assert_eq!(lines.len(), 84);

        assert_eq!(lines[0].position, [-2.0, 0.0, -2.0]);
        assert_eq!(lines[1].position, [-2.0, 0.0, 2.0]);
        assert!(lines.iter().all(|v| v.position[1] == 0.0));
    }
}
