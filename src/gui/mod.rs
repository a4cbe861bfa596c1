//! GUI 系统模块
//!
//! 基于 egui 的运行时控制面板：帧率、帧周期 fence、纹理注册表内容，
//! 以及背景色和相机速度两个可调参数。

mod manager;
mod metrics;
pub mod panels;
mod state;

pub use manager::GuiManager;
pub use metrics::PerformanceMetrics;
pub use state::{GuiState, TextureRow};
