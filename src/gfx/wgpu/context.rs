//! wgpu 设备上下文
//!
//! 负责设备相关对象的创建：
//! - 按配置选择后端（DirectX 12 / Vulkan / Metal / OpenGL）
//! - 选择适配器，`--warp` 时使用软件适配器
//! - 检查最低着色器模型，不满足时直接失败
//! - 创建逻辑设备，安装设备丢失回调
//! - 配置交换链，校验 MSAA 采样数
//!
//! 窗口由调用方创建并在设备重建之间保持不变，其余对象都随 `WgpuContext` 一起丢弃重建。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use winit::window::Window;

use crate::core::config::{Config, GraphicsBackend};
use crate::core::error::{GraphicsError, Result};

/// 场景使用的深度格式
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// wgpu 设备上下文
pub struct WgpuContext {
    pub instance: wgpu::Instance,
    pub surface: Arc<wgpu::Surface<'static>>,
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub surface_config: wgpu::SurfaceConfiguration,
    /// 实际使用的 MSAA 采样数（可能低于配置值）
    pub msaa_samples: u32,
    window: Arc<Window>,
    device_lost: Arc<AtomicBool>,
}

impl WgpuContext {
    pub fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let graphics = &config.graphics;
        info!(backend = graphics.backend.name(), warp = graphics.warp, "Initializing wgpu context");

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: backends_for(graphics.backend),
            dx12_shader_compiler: Default::default(),
            flags: wgpu::InstanceFlags::from_build_config(),
            gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
        });

        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|e| GraphicsError::DeviceCreation(format!("Failed to create surface: {}", e)))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: graphics.warp,
        }))
        .ok_or_else(|| {
            GraphicsError::DeviceCreation(format!(
                "No {} adapter found{}",
                graphics.backend.name(),
                if graphics.warp { " (software fallback requested)" } else { "" }
            ))
        })?;

        let adapter_info = adapter.get_info();
        info!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "Selected adapter"
        );

        check_shader_model(&adapter, graphics.min_shader_model)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("EMTE Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
            },
            None,
        ))
        .map_err(|e| GraphicsError::DeviceCreation(format!("Failed to create device: {}", e)))?;

        let device_lost = Arc::new(AtomicBool::new(false));
        {
            let lost = Arc::clone(&device_lost);
            device.set_device_lost_callback(move |reason, message| {
                error!(?reason, %message, "Device lost");
                lost.store(true, Ordering::SeqCst);
            });
        }
        device.on_uncaptured_error(Box::new(|e| {
            error!(error = %e, "Uncaptured wgpu error");
        }));

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| GraphicsError::SwapchainError("Surface reports no formats".to_string()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let size = window.inner_size();
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if graphics.vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: graphics.frame_count as u32,
        };
        surface.configure(&device, &surface_config);
        debug!(format = ?surface_format, width = surface_config.width, height = surface_config.height, "Surface configured");

        let msaa_samples = supported_msaa(&adapter, surface_format, graphics.msaa_samples);

        Ok(Self {
            instance,
            surface: Arc::new(surface),
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            surface_config,
            msaa_samples,
            window,
            device_lost,
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    /// 设备丢失标志，由回调设置
    pub fn device_lost_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.device_lost)
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::SeqCst)
    }

    /// 重新配置交换链（窗口大小改变，或表面 Lost / Outdated）
    pub fn reconfigure_surface(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
    }
}

fn backends_for(backend: GraphicsBackend) -> wgpu::Backends {
    match backend {
        GraphicsBackend::Dx12 => wgpu::Backends::DX12,
        GraphicsBackend::Vulkan => wgpu::Backends::VULKAN,
        GraphicsBackend::Metal => wgpu::Backends::METAL,
        GraphicsBackend::Gl => wgpu::Backends::GL,
        GraphicsBackend::Auto | GraphicsBackend::Headless => wgpu::Backends::all(),
    }
}

/// 着色器模型编号
fn shader_model_number(model: wgpu::ShaderModel) -> u32 {
    match model {
        wgpu::ShaderModel::Sm2 => 2,
        wgpu::ShaderModel::Sm4 => 4,
        wgpu::ShaderModel::Sm5 => 5,
    }
}

/// 适配器的着色器模型低于要求时是致命错误
fn check_shader_model(adapter: &wgpu::Adapter, required: u32) -> Result<()> {
    let supported = shader_model_number(adapter.get_downlevel_capabilities().shader_model);
    if supported < required {
        return Err(GraphicsError::UnsupportedFeature(format!(
            "Adapter supports shader model {}, {} required",
            supported, required
        ))
        .into());
    }
    debug!(supported, required, "Shader model check passed");
    Ok(())
}

/// 颜色和深度格式都支持的最大采样数（不超过请求值）
fn supported_msaa(adapter: &wgpu::Adapter, format: wgpu::TextureFormat, requested: u32) -> u32 {
    let color = adapter.get_texture_format_features(format).flags;
    let depth = adapter.get_texture_format_features(DEPTH_FORMAT).flags;

    let samples = pick_sample_count(requested, |n| {
        color.sample_count_supported(n) && depth.sample_count_supported(n)
    });

    if samples != requested {
        warn!(requested, used = samples, "MSAA sample count not supported, falling back");
    }
    samples
}

/// 不超过请求值的最大可用采样数，都不支持时为 1
fn pick_sample_count(requested: u32, supported: impl Fn(u32) -> bool) -> u32 {
    [16, 8, 4, 2]
        .into_iter()
        .filter(|&n| n <= requested)
        .find(|&n| supported(n))
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_count_keeps_supported_request() {
        assert_eq!(pick_sample_count(4, |n| n <= 8), 4);
        assert_eq!(pick_sample_count(1, |_| true), 1);
    }

    #[test]
    fn test_sample_count_falls_back_to_highest_supported() {
        // 只支持 4x 时，8x 请求降到 4x
        assert_eq!(pick_sample_count(8, |n| n == 4), 4);
        assert_eq!(pick_sample_count(16, |n| n == 2 || n == 4), 4);
    }

    #[test]
    fn test_sample_count_falls_back_to_one() {
        assert_eq!(pick_sample_count(4, |_| false), 1);
        // 非 2 的幂按不超过它的档位处理
        assert_eq!(pick_sample_count(3, |n| n == 4), 1);
    }
}
