//! wgpu 纹理上传
//!
//! 每个纹理在描述符表（bind group 表）中占一个槽位，槽位由注册表分配。
//! 像素数据通过 `queue.write_texture` 暂存，批次结束时提交并阻塞到拷贝完成。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::core::error::{GraphicsError, Result, TextureError};
use crate::renderer::descriptor::DescriptorSlot;
use crate::renderer::texture::{TextureSource, TextureUploader};

/// 纹理统一使用的格式
pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// 已上传的纹理
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// 进行中的上传批次
#[derive(Debug, Default)]
pub struct WgpuUploadBatch {
    slots: Vec<DescriptorSlot>,
    bytes: u64,
}

/// wgpu 纹理上传器
pub struct WgpuUploader {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    device_lost: Arc<AtomicBool>,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    /// 描述符表：槽位 → bind group
    table: Vec<Option<wgpu::BindGroup>>,
}

impl WgpuUploader {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, device_lost: Arc<AtomicBool>) -> Self {
        let layout = texture_bind_group_layout(&device, "Texture Bind Group Layout");
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Texture Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            device,
            queue,
            device_lost,
            layout,
            sampler,
            table: Vec::new(),
        }
    }

    /// 纹理 bind group 的布局，管线布局需要引用它
    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    /// 槽位上的 bind group
    pub fn bind_group(&self, slot: DescriptorSlot) -> Option<&wgpu::BindGroup> {
        self.table.get(slot.index() as usize)?.as_ref()
    }

    fn upload_error(name: &str, reason: impl ToString) -> crate::core::error::EmteError {
        TextureError::Upload {
            name: name.to_string(),
            reason: reason.to_string(),
        }
        .into()
    }
}

impl TextureUploader for WgpuUploader {
    type Resource = GpuTexture;
    type Batch = WgpuUploadBatch;

    fn begin_batch(&mut self) -> Result<WgpuUploadBatch> {
        if self.device_lost.load(Ordering::SeqCst) {
            return Err(GraphicsError::DeviceLost("cannot upload textures".to_string()).into());
        }
        Ok(WgpuUploadBatch::default())
    }

    fn create_texture(
        &mut self,
        batch: &mut WgpuUploadBatch,
        name: &str,
        source: &TextureSource,
        slot: DescriptorSlot,
    ) -> Result<GpuTexture> {
        let data = source.load()?;

        let max = self.device.limits().max_texture_dimension_2d;
        if data.width > max || data.height > max {
            return Err(Self::upload_error(
                name,
                format!("{}x{} exceeds the {} texel limit", data.width, data.height, max),
            ));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let size = wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(name),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(data.bytes_per_row()),
                rows_per_image: Some(data.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(name),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        if let Some(e) = validation.or(out_of_memory) {
            return Err(Self::upload_error(name, e));
        }

        let index = slot.index() as usize;
        if self.table.len() <= index {
            self.table.resize_with(index + 1, || None);
        }
        self.table[index] = Some(bind_group);

        batch.slots.push(slot);
        batch.bytes += data.rgba.len() as u64;

        Ok(GpuTexture {
            texture,
            view,
            width: data.width,
            height: data.height,
        })
    }

    fn end_batch(&mut self, batch: WgpuUploadBatch) -> Result<()> {
        let index = self.queue.submit(std::iter::empty());
        self.device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));

        if self.device_lost.load(Ordering::SeqCst) {
            for slot in &batch.slots {
                if let Some(entry) = self.table.get_mut(slot.index() as usize) {
                    *entry = None;
                }
            }
            return Err(GraphicsError::DeviceLost(format!(
                "device lost while uploading {} textures",
                batch.slots.len()
            ))
            .into());
        }

        debug!(textures = batch.slots.len(), bytes = batch.bytes, "Upload batch resident");
        Ok(())
    }
}

/// 单纹理 + 采样器的 bind group 布局
pub fn texture_bind_group_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}
