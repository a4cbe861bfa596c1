//! 数学类型
//!
//! 基于 `nalgebra` 的类型别名和少量矩阵辅助函数。
//! 顶点结构使用原始数组（nalgebra 类型不能实现 bytemuck trait），
//! 计算阶段使用这里的类型。

pub use nalgebra::{Point3, UnitQuaternion};

pub type Vector2 = nalgebra::Vector2<f32>;
pub type Vector3 = nalgebra::Vector3<f32>;
pub type Vector4 = nalgebra::Vector4<f32>;
pub type Matrix4 = nalgebra::Matrix4<f32>;

/// 颜色类型（RGBA，范围 0.0-1.0）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };
    pub const CORNFLOWER_BLUE: Color = Color { r: 0.392, g: 0.584, b: 0.929, a: 1.0 };

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl From<[f32; 4]> for Color {
    fn from(c: [f32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

/// 矩阵辅助函数
pub mod matrix {
    use super::*;

    /// 绕 Y 轴旋转
    pub fn rotation_y(angle: f32) -> Matrix4 {
        Matrix4::from_axis_angle(&Vector3::y_axis(), angle)
    }

    /// 右手系透视投影，深度映射到 [0, 1]
    ///
    /// nalgebra 的 `new_perspective` 输出 OpenGL 风格的 [-1, 1] 深度，
    /// 这里按 wgpu / D3D 的裁剪空间重新构造。
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Matrix4 {
        let f = 1.0 / (0.5 * fov_y).tan();
        let range = far / (near - far);

        #[rustfmt::skip]
        let m = Matrix4::new(
            f / aspect, 0.0, 0.0,   0.0,
            0.0,        f,   0.0,   0.0,
            0.0,        0.0, range, range * near,
            0.0,        0.0, -1.0,  0.0,
        );
        m
    }

    /// 屏幕像素坐标（左上角原点）到裁剪空间的正交投影
    pub fn screen_orthographic(width: f32, height: f32) -> Matrix4 {
        #[rustfmt::skip]
        let m = Matrix4::new(
            2.0 / width, 0.0,           0.0, -1.0,
            0.0,         -2.0 / height, 0.0, 1.0,
            0.0,         0.0,           1.0, 0.0,
            0.0,         0.0,           0.0, 1.0,
        );
        m
    }

    /// 右手系 Look-At 视图矩阵
    pub fn look_at(eye: &Vector3, target: &Vector3, up: &Vector3) -> Matrix4 {
        Matrix4::look_at_rh(&Point3::from(*eye), &Point3::from(*target), up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perspective_depth_range() {
        let proj = matrix::perspective(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 10.0);

        let near = proj * Vector4::new(0.0, 0.0, -0.1, 1.0);
        let far = proj * Vector4::new(0.0, 0.0, -10.0, 1.0);

        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_screen_orthographic_corners() {
        let ortho = matrix::screen_orthographic(800.0, 600.0);

        let top_left = ortho * Vector4::new(0.0, 0.0, 0.0, 1.0);
        let bottom_right = ortho * Vector4::new(800.0, 600.0, 0.0, 1.0);

        assert!((top_left.x + 1.0).abs() < 1e-6 && (top_left.y - 1.0).abs() < 1e-6);
        assert!((bottom_right.x - 1.0).abs() < 1e-6 && (bottom_right.y + 1.0).abs() < 1e-6);
    }
}
