//! GUI 状态
//!
//! GuiState 保存面板显示的数据和用户可以修改的参数，与图形后端无关。
//! 渲染器每帧把统计写进来，面板修改过的参数再由渲染器读回。

use crate::core::config::Config;
use crate::renderer::frame::FrameStats;
use crate::renderer::memory::MemoryStats;
use crate::renderer::texture::TextureRegistry;

/// 纹理表中的一行
#[derive(Debug, Clone, PartialEq)]
pub struct TextureRow {
    pub name: String,
    pub slot: u32,
    pub width: u32,
    pub height: u32,
}

/// GUI 状态（与后端无关）
#[derive(Debug, Clone)]
pub struct GuiState {
    pub show_panel: bool,

    // 性能
    pub fps: f32,
    pub frame_time_ms: f32,

    // 设备
    pub backend: String,
    pub adapter: String,
    pub msaa_samples: u32,
    pub offscreen: bool,
    pub frames_in_flight: usize,
    pub reconstructions: u32,

    // 帧周期
    pub frame_number: u64,
    pub last_signaled: u64,
    pub last_completed: u64,
    pub ring_waits: u64,
    pub memory: MemoryStats,

    // 纹理注册表
    pub fallback: String,
    pub descriptors_used: u32,
    pub descriptor_capacity: u32,
    pub textures: Vec<TextureRow>,

    // 可编辑参数
    pub clear_color: [f32; 4],
    pub camera_speed: f32,
}

impl GuiState {
    pub fn new(config: &Config) -> Self {
        Self {
            show_panel: true,
            fps: 0.0,
            frame_time_ms: 0.0,
            backend: config.graphics.backend.name().to_string(),
            adapter: String::new(),
            msaa_samples: config.graphics.msaa_samples,
            offscreen: config.graphics.offscreen,
            frames_in_flight: config.graphics.frame_count,
            reconstructions: 0,
            frame_number: 0,
            last_signaled: 0,
            last_completed: 0,
            ring_waits: 0,
            memory: MemoryStats::default(),
            fallback: config.textures.fallback.clone(),
            descriptors_used: 0,
            descriptor_capacity: config.textures.descriptor_capacity,
            textures: Vec::new(),
            clear_color: config.scene.clear_color,
            camera_speed: config.scene.camera.move_speed,
        }
    }

    pub fn update_performance(&mut self, fps: f32, frame_time_ms: f32) {
        self.fps = fps;
        self.frame_time_ms = frame_time_ms;
    }

    /// 同步帧周期统计
    pub fn update_frames(&mut self, frame_number: u64, stats: &FrameStats, memory: MemoryStats) {
        self.frame_number = frame_number;
        self.last_signaled = stats.last_signaled.value();
        self.last_completed = stats.last_completed.value();
        self.ring_waits = stats.ring_waits;
        self.memory = memory;
    }

    /// 同步纹理注册表内容（按槽位排序）
    pub fn update_textures<R>(&mut self, registry: &TextureRegistry<R>, size: impl Fn(&R) -> (u32, u32)) {
        self.descriptors_used = registry.descriptor_range().allocated_count();
        self.descriptor_capacity = registry.descriptor_range().capacity();
        self.textures = registry
            .iter_by_slot()
            .map(|handle| {
                let (width, height) = size(handle.resource());
                TextureRow {
                    name: handle.name().to_string(),
                    slot: handle.slot().index(),
                    width,
                    height,
                }
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::{HeadlessTexture, HeadlessUploader};
    use crate::renderer::descriptor::DescriptorRange;
    use crate::renderer::sync::FenceValue;
    use crate::renderer::texture::TextureData;

    #[test]
    fn test_state_from_config() {
        let state = GuiState::new(&Config::default());
        assert_eq!(state.msaa_samples, 4);
        assert_eq!(state.frames_in_flight, 3);
        assert_eq!(state.fallback, "default");
        assert!(state.textures.is_empty());
    }

    #[test]
    fn test_update_textures_sorted_by_slot() {
        let mut registry: TextureRegistry<HeadlessTexture> = TextureRegistry::new(DescriptorRange::new(0, 8), "default");
        registry.queue_pixels("default", TextureData::solid(2, 2, [0; 4]));
        registry.queue_pixels("b", TextureData::solid(4, 8, [0; 4]));
        registry.queue_pixels("a", TextureData::solid(1, 1, [0; 4]));
        registry.flush_loads(&mut HeadlessUploader::new()).unwrap();

        let mut state = GuiState::new(&Config::default());
        state.update_textures(&registry, |t| (t.width, t.height));

        let names: Vec<_> = state.textures.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["default", "b", "a"]);
        assert_eq!((state.textures[1].width, state.textures[1].height), (4, 8));
        assert_eq!(state.descriptors_used, 3);
        assert_eq!(state.descriptor_capacity, 8);
    }

    #[test]
    fn test_update_frames() {
        let mut state = GuiState::new(&Config::default());
        let stats = FrameStats {
            frames_submitted: 10,
            last_signaled: FenceValue::new(10),
            last_completed: FenceValue::new(8),
            ring_waits: 2,
        };
        state.update_frames(10, &stats, MemoryStats::default());

        assert_eq!((state.last_signaled, state.last_completed, state.ring_waits), (10, 8, 2));
    }
}
