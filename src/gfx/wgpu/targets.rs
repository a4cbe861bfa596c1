//! 渲染目标
//!
//! 场景 pass 写入的颜色目标取决于帧配置：
//!
//! | MSAA | 离屏 | 场景目标      | resolve 目标 | 合成      |
//! |------|------|---------------|--------------|-----------|
//! | 否   | 否   | 交换链        | -            | -         |
//! | 是   | 否   | 多重采样颜色  | 交换链       | -         |
//! | 否   | 是   | 离屏颜色      | -            | → 交换链  |
//! | 是   | 是   | 多重采样颜色  | 离屏颜色     | → 交换链  |

use tracing::debug;

use crate::renderer::pass::FrameTargets;

use super::context::DEPTH_FORMAT;

struct Target {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl Target {
    fn new(
        device: &wgpu::Device,
        label: &str,
        format: wgpu::TextureFormat,
        (width, height): (u32, u32),
        sample_count: u32,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { _texture: texture, view }
    }
}

/// 与窗口大小相关的渲染目标，改变大小时整体重建
pub struct RenderTargets {
    targets: FrameTargets,
    size: (u32, u32),
    msaa_color: Option<Target>,
    depth: Target,
    offscreen: Option<Target>,
    /// 合成 pass 采样离屏颜色的 bind group
    composite: Option<wgpu::BindGroup>,
}

impl RenderTargets {
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        size: (u32, u32),
        targets: FrameTargets,
        composite_layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
    ) -> Self {
        let samples = targets.msaa_samples;

        let msaa_color = targets.is_multisampled().then(|| {
            Target::new(
                device,
                "MSAA Color Target",
                format,
                size,
                samples,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            )
        });
        let depth = Target::new(
            device,
            "Depth Target",
            DEPTH_FORMAT,
            size,
            samples,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        let offscreen = targets.offscreen.then(|| {
            Target::new(
                device,
                "Offscreen Color Target",
                format,
                size,
                1,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            )
        });

        let composite = offscreen.as_ref().map(|target| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Composite Bind Group"),
                layout: composite_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&target.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            })
        });

        debug!(width = size.0, height = size.1, samples, offscreen = targets.offscreen, "Render targets created");

        Self {
            targets,
            size,
            msaa_color,
            depth,
            offscreen,
            composite,
        }
    }

    pub fn frame_targets(&self) -> FrameTargets {
        self.targets
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// 场景 pass 的颜色附件
    pub fn scene_view<'a>(&'a self, swapchain: &'a wgpu::TextureView) -> &'a wgpu::TextureView {
        self.msaa_color
            .as_ref()
            .or(self.offscreen.as_ref())
            .map_or(swapchain, |target| &target.view)
    }

    /// 多重采样颜色的 resolve 目标
    pub fn resolve_view<'a>(&'a self, swapchain: &'a wgpu::TextureView) -> &'a wgpu::TextureView {
        self.offscreen.as_ref().map_or(swapchain, |target| &target.view)
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth.view
    }

    pub fn composite_bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.composite.as_ref()
    }
}
