//! 图形后端模块
//!
//! 实现渲染核心（`renderer`）定义的协作者 trait：
//!
//! - `wgpu`：真实 GPU 后端，运行时选择 DirectX 12 / Vulkan / Metal / OpenGL
//! - `headless`：进程内模拟的 GPU，用于测试和无窗口运行
//!
//! 两个后端共用同一套启动序列：先排队回退纹理，再排队配置和场景引用的纹理，
//! 最后一次性 flush。

pub mod headless;
pub mod wgpu;

use crate::core::config::Config;
use crate::renderer::texture::{TextureData, TextureRegistry};
use crate::scene::Scene;

/// 回退纹理：64x64 的品红 / 黑色棋盘格
pub fn fallback_texture() -> TextureData {
    TextureData::checkerboard(64, 8, [255, 0, 255, 255], [0, 0, 0, 255])
}

/// 排队启动时加载的全部纹理
///
/// 回退纹理排在最前面，保证它总是得到第一个槽位。
pub fn queue_texture_manifest<R>(registry: &mut TextureRegistry<R>, config: &Config, scene: &Scene) {
    registry.queue_pixels(config.textures.fallback.clone(), fallback_texture());

    for file in &config.textures.files {
        registry.queue_load(file.clone());
    }
    for name in scene.texture_names() {
        registry.queue_load(name);
    }
}
