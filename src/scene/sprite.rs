//! 2D 精灵
//!
//! 精灵只保存纹理名，绘制时通过纹理注册表解析，未加载的纹理显示为回退纹理。

use crate::core::config::SpriteConfig;
use crate::core::math::{Color, Vector2};
use crate::renderer::vertex::SpriteVertex;

/// 一个精灵
#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    /// 纹理名（文件路径）
    pub texture: String,
    /// 左上角的屏幕坐标（像素）
    pub position: Vector2,
    /// 绘制尺寸，`None` 表示使用纹理原始尺寸
    pub size: Option<Vector2>,
    pub tint: Color,
}

impl Sprite {
    pub fn new(texture: impl Into<String>, position: Vector2) -> Self {
        Self {
            texture: texture.into(),
            position,
            size: None,
            tint: Color::WHITE,
        }
    }

    /// 铺满整个屏幕的背景
    pub fn fullscreen(texture: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            size: Some(Vector2::new(width as f32, height as f32)),
            ..Self::new(texture, Vector2::zeros())
        }
    }

    /// 绘制尺寸，纹理尺寸在绘制时才知道
    pub fn resolved_size(&self, texture_size: (u32, u32)) -> Vector2 {
        self.size
            .unwrap_or_else(|| Vector2::new(texture_size.0 as f32, texture_size.1 as f32))
    }

    /// 生成两个三角形的顶点
    pub fn vertices(&self, texture_size: (u32, u32)) -> [SpriteVertex; 6] {
        sprite_quad(self.position, self.resolved_size(texture_size), self.tint)
    }
}

impl From<&SpriteConfig> for Sprite {
    fn from(config: &SpriteConfig) -> Self {
        Self {
            tint: Color::from(config.tint),
            ..Self::new(config.texture.clone(), Vector2::from(config.position))
        }
    }
}

/// 屏幕空间矩形（两个三角形）
pub fn sprite_quad(position: Vector2, size: Vector2, tint: Color) -> [SpriteVertex; 6] {
    let (x0, y0) = (position.x, position.y);
    let (x1, y1) = (x0 + size.x, y0 + size.y);

    let tl = SpriteVertex::new(Vector2::new(x0, y0), [0.0, 0.0], tint);
    let tr = SpriteVertex::new(Vector2::new(x1, y0), [1.0, 0.0], tint);
    let bl = SpriteVertex::new(Vector2::new(x0, y1), [0.0, 1.0], tint);
    let br = SpriteVertex::new(Vector2::new(x1, y1), [1.0, 1.0], tint);

    [tl, tr, bl, bl, tr, br]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sprite_uses_texture_size() {
        let sprite = Sprite::new("cat.dds", Vector2::new(50.0, 50.0));
        let vertices = sprite.vertices((64, 32));

        assert_eq!(vertices[0].position, [50.0, 50.0]);
        assert_eq!(vertices[5].position, [114.0, 82.0]);
        assert_eq!(vertices[5].uv, [1.0, 1.0]);
    }

    #[test]
    fn test_fullscreen_ignores_texture_size() {
        let sprite = Sprite::fullscreen("sunset.jpg", 800, 600);
        assert_eq!(sprite.resolved_size((16, 16)), Vector2::new(800.0, 600.0));
    }
}
