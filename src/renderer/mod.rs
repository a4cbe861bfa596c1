//! 渲染器模块
//!
//! 与具体图形 API 无关的渲染核心：
//!
//! - `sync`：fence 值、GPU 时间线 trait 和 fence 管理器
//! - `descriptor`：纹理使用的描述符区间
//! - `texture`：纹理注册表、待加载队列和上传器 trait
//! - `pass`：帧内 pass 顺序和记录器
//! - `frame`：帧周期控制器和 GPU 队列 trait
//! - `memory`：每帧临时分配的跟踪
//! - `vertex`：顶点类型
//!
//! 图形后端（`gfx::wgpu`、`gfx::headless`）实现这里的 trait。

pub mod descriptor;
pub mod frame;
pub mod memory;
pub mod pass;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use descriptor::{DescriptorRange, DescriptorSlot};
pub use frame::{ActiveFrame, FrameCycle, FrameSlot, FrameStats, GpuQueue, SlotState};
pub use memory::GraphicsMemory;
pub use pass::{FramePass, FrameRecorder, FrameTargets};
pub use sync::{FenceManager, FenceValue, GpuTimeline};
pub use texture::{TextureData, TextureHandle, TextureRegistry, TextureSource, TextureUploader};
