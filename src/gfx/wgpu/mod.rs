//! wgpu 图形后端
//!
//! wgpu 在运行时选择 DirectX 12、Vulkan、Metal 或 OpenGL。
//!
//! # 模块结构
//!
//! - `context`：实例、适配器、设备和交换链
//! - `queue`：帧周期使用的命令队列（fence ↔ SubmissionIndex）
//! - `upload`：纹理上传器和描述符表
//! - `targets`：MSAA / 深度 / 离屏渲染目标
//! - `pipelines`：渲染管线和场景 uniform
//! - `renderer`：组合以上部分的渲染器

mod context;
mod pipelines;
mod queue;
mod renderer;
mod targets;
mod upload;

pub use context::WgpuContext;
pub use queue::{WgpuCommands, WgpuQueue};
pub use renderer::WgpuRenderer;
pub use upload::{GpuTexture, WgpuUploader};
