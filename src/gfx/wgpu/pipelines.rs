//! 渲染管线
//!
//! 四条管线共用一个场景 uniform（group 0）：
//!
//! - `sprite`：屏幕空间精灵，纹理在 group 1，只做深度测试
//! - `lit`：三角形和球，漫反射纹理在 group 1，法线贴图在 group 2
//! - `line`：线框网格
//! - `composite`：离屏目标 → 交换链，不参与多重采样

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::core::error::{GraphicsError, Result};
use crate::core::math::Matrix4;
use crate::renderer::vertex::{LineVertex, LitVertex, SpriteVertex};

use super::context::DEPTH_FORMAT;
use super::upload::texture_bind_group_layout;

/// 场景 uniform，布局与 WGSL 中的 `SceneUniforms` 一致
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SceneUniforms {
    pub world: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub screen: [[f32; 4]; 4],
    pub light_dir: [f32; 4],
    pub eye_pos: [f32; 4],
}

impl SceneUniforms {
    pub fn new(world: &Matrix4, view_proj: &Matrix4, screen: &Matrix4, light_dir: [f32; 3], eye_pos: [f32; 3]) -> Self {
        Self {
            world: *world.as_ref(),
            view_proj: *view_proj.as_ref(),
            screen: *screen.as_ref(),
            light_dir: [light_dir[0], light_dir[1], light_dir[2], 0.0],
            eye_pos: [eye_pos[0], eye_pos[1], eye_pos[2], 1.0],
        }
    }
}

/// 管线及其共享资源
pub struct Pipelines {
    pub sprite: wgpu::RenderPipeline,
    pub lit: wgpu::RenderPipeline,
    pub line: wgpu::RenderPipeline,
    pub composite: wgpu::RenderPipeline,
    pub uniform_buffer: wgpu::Buffer,
    pub uniform_bind_group: wgpu::BindGroup,
    pub composite_layout: wgpu::BindGroupLayout,
    pub composite_sampler: wgpu::Sampler,
}

impl Pipelines {
    /// 创建全部管线
    ///
    /// # 参数
    ///
    /// * `format` - 交换链 / 离屏目标的颜色格式
    /// * `samples` - 场景 pass 的采样数
    /// * `texture_layout` - 上传器的纹理 bind group 布局
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        samples: u32,
        texture_layout: &wgpu::BindGroupLayout,
    ) -> Result<Self> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Uniform Buffer"),
            size: std::mem::size_of::<SceneUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Uniform Bind Group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let composite_layout = texture_bind_group_layout(device, "Composite Layout");
        let composite_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Composite Sampler"),
            ..Default::default()
        });

        let sprite_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Sprite Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, texture_layout],
            push_constant_ranges: &[],
        });
        let lit_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Lit Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, texture_layout, texture_layout],
            push_constant_ranges: &[],
        });
        let line_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Line Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });
        let composite_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Composite Pipeline Layout"),
            bind_group_layouts: &[&composite_layout],
            push_constant_ranges: &[],
        });

        let sprite_vertex = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SpriteVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Float32x4],
        };
        let lit_vertex = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LitVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2],
        };
        let line_vertex = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4],
        };

        let sprite = PipelineBuilder {
            label: "Sprite Pipeline",
            source: include_str!("shaders/sprite.wgsl"),
            layout: &sprite_layout,
            vertex: Some(sprite_vertex),
            topology: wgpu::PrimitiveTopology::TriangleList,
            format,
            blend: wgpu::BlendState::ALPHA_BLENDING,
            depth_write: Some(false),
            samples,
        }
        .build(device);

        let lit = PipelineBuilder {
            label: "Lit Pipeline",
            source: include_str!("shaders/lit.wgsl"),
            layout: &lit_layout,
            vertex: Some(lit_vertex),
            topology: wgpu::PrimitiveTopology::TriangleList,
            format,
            blend: wgpu::BlendState::REPLACE,
            depth_write: Some(true),
            samples,
        }
        .build(device);

        let line = PipelineBuilder {
            label: "Line Pipeline",
            source: include_str!("shaders/line.wgsl"),
            layout: &line_layout,
            vertex: Some(line_vertex),
            topology: wgpu::PrimitiveTopology::LineList,
            format,
            blend: wgpu::BlendState::REPLACE,
            depth_write: Some(true),
            samples,
        }
        .build(device);

        let composite = PipelineBuilder {
            label: "Composite Pipeline",
            source: include_str!("shaders/composite.wgsl"),
            layout: &composite_pipeline_layout,
            vertex: None,
            topology: wgpu::PrimitiveTopology::TriangleList,
            format,
            blend: wgpu::BlendState::REPLACE,
            depth_write: None,
            samples: 1,
        }
        .build(device);

        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            return Err(GraphicsError::ShaderCompilation(e.to_string()).into());
        }
        debug!(samples, format = ?format, "Render pipelines created");

        Ok(Self {
            sprite,
            lit,
            line,
            composite,
            uniform_buffer,
            uniform_bind_group,
            composite_layout,
            composite_sampler,
        })
    }
}

struct PipelineBuilder<'a> {
    label: &'a str,
    source: &'a str,
    layout: &'a wgpu::PipelineLayout,
    vertex: Option<wgpu::VertexBufferLayout<'a>>,
    topology: wgpu::PrimitiveTopology,
    format: wgpu::TextureFormat,
    blend: wgpu::BlendState,
    /// `None` 表示没有深度附件
    depth_write: Option<bool>,
    samples: u32,
}

impl PipelineBuilder<'_> {
    fn build(self, device: &wgpu::Device) -> wgpu::RenderPipeline {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(self.label),
            source: wgpu::ShaderSource::Wgsl(self.source.into()),
        });
        let buffers: Vec<wgpu::VertexBufferLayout> = self.vertex.into_iter().collect();

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(self.label),
            layout: Some(self.layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: "vs_main",
                buffers: &buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.format,
                    blend: Some(self.blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: self.topology,
                // 双面可见
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: self.depth_write.map(|depth_write_enabled| wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: self.samples,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        })
    }
}
