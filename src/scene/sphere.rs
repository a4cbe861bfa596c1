//! 经纬球

use std::f32::consts::{PI, TAU};

use crate::core::math::Vector3;
use crate::renderer::vertex::LitVertex;

/// 带索引的光照网格
#[derive(Debug, Clone, Default)]
pub struct LitMesh {
    pub vertices: Vec<LitVertex>,
    pub indices: Vec<u16>,
}

/// 以原点为球心的经纬球
///
/// 纬线 `tessellation` 段、经线 `2 * tessellation` 段，接缝处的顶点重复一份以便 UV 连续。
/// 三角形从球外看为逆时针。
///
/// # 参数
///
/// * `diameter` - 直径
/// * `tessellation` - 细分数，至少为 3
pub fn uv_sphere(diameter: f32, tessellation: u32) -> LitMesh {
    let vertical = tessellation.max(3);
    let horizontal = vertical * 2;
    let radius = diameter / 2.0;
    let stride = horizontal + 1;

    let mut vertices = Vec::with_capacity(((vertical + 1) * stride) as usize);
    for i in 0..=vertical {
        let v = 1.0 - i as f32 / vertical as f32;
        let latitude = i as f32 * PI / vertical as f32 - PI / 2.0;
        let (dy, dxz) = latitude.sin_cos();

        for j in 0..=horizontal {
            let u = j as f32 / horizontal as f32;
            let longitude = j as f32 * TAU / horizontal as f32;
            let (dx, dz) = longitude.sin_cos();

            let normal = Vector3::new(dx * dxz, dy, dz * dxz);
            vertices.push(LitVertex::new(normal * radius, normal, [u, v]));
        }
    }

    let mut indices = Vec::with_capacity((vertical * horizontal * 6) as usize);
    for i in 0..vertical {
        for j in 0..horizontal {
            let a = (i * stride + j) as u16;
            let b = (i * stride + j + 1) as u16;
            let c = ((i + 1) * stride + j) as u16;
            let d = ((i + 1) * stride + j + 1) as u16;
            indices.extend_from_slice(&[a, b, c, b, d, c]);
        }
    }

    LitMesh { vertices, indices }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_counts() {
        let sphere = uv_sphere(1.0, 16);
        assert_eq!(sphere.vertices.len(), 17 * 33);
        assert_eq!(sphere.indices.len(), 16 * 32 * 6);
        assert!(sphere.indices.iter().all(|&i| (i as usize) < sphere.vertices.len()));
    }

    #[test]
    fn test_vertices_lie_on_surface() {
        let sphere = uv_sphere(3.0, 8);
        for vertex in &sphere.vertices {
            let position = Vector3::from(vertex.position);
            let normal = Vector3::from(vertex.normal);
            assert!((position.norm() - 1.5).abs() < 1e-4);
            assert!((normal.norm() - 1.0).abs() < 1e-4);
            assert!((position.normalize() - normal).norm() < 1e-4);
            assert!((0.0..=1.0).contains(&vertex.uv[0]) && (0.0..=1.0).contains(&vertex.uv[1]));
        }
    }

    #[test]
    fn test_triangles_face_outward() {
        let sphere = uv_sphere(2.0, 12);
        for triangle in sphere.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|k| Vector3::from(sphere.vertices[triangle[k] as usize].position));
            let face = (b - a).cross(&(c - a));
            // 极点处的三角形退化
            if face.norm() < 1e-6 {
                continue;
            }
            assert!(face.dot(&(a + b + c)) > 0.0);
        }
    }
}
