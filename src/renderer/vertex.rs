//! 顶点数据定义
//!
//! 示例场景使用的三种顶点：精灵、光照几何体、线框。
//!
//! # 设计说明
//!
//! - 使用 `#[repr(C)]` 确保内存布局稳定
//! - 实现 `Pod` 和 `Zeroable` trait 以支持零拷贝传输到 GPU
//! - 字段使用原始数组，构造函数接受数学库的 Vector 类型

use bytemuck::{Pod, Zeroable};

use crate::core::math::{Color, Vector2, Vector3};

/// 精灵顶点
///
/// 位置为屏幕像素坐标（左上角为原点），着色器中用正交矩阵变换。
#[repr(C)]
#[derive(Default, Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl SpriteVertex {
    pub fn new(position: Vector2, uv: [f32; 2], color: Color) -> Self {
        Self {
            position: [position.x, position.y],
            uv,
            color: color.to_array(),
        }
    }
}

/// 光照几何体顶点
#[repr(C)]
#[derive(Default, Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LitVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl LitVertex {
    pub fn new(position: Vector3, normal: Vector3, uv: [f32; 2]) -> Self {
        Self {
            position: [position.x, position.y, position.z],
            normal: [normal.x, normal.y, normal.z],
            uv,
        }
    }
}

/// 线框顶点
#[repr(C)]
#[derive(Default, Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl LineVertex {
    pub fn new(position: Vector3, color: Color) -> Self {
        Self {
            position: [position.x, position.y, position.z],
            color: color.to_array(),
        }
    }
}

/// 示例中的光照三角形
///
/// 位于 z = 0 平面，法线朝向 +Z（相机方向）。
pub fn lit_triangle() -> [LitVertex; 3] {
    let normal = Vector3::new(0.0, 0.0, 1.0);
    [
        LitVertex::new(Vector3::new(0.0, 3.0, 0.0), normal, [0.5, 0.0]),
        LitVertex::new(Vector3::new(-3.0, -3.0, 0.0), normal, [0.0, 1.0]),
        LitVertex::new(Vector3::new(3.0, -3.0, 0.0), normal, [1.0, 1.0]),
    ]
}
