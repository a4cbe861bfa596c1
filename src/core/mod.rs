//! 核心功能模块
//!
//! 与图形 API 无关的基础设施：配置、日志、错误类型、数学类型和固定步长计时器。
//!
//! - `config`：TOML 配置 + 命令行覆盖
//! - `log`：基于 `tracing` 的日志初始化和 target 宏
//! - `error`：统一的错误类型
//! - `math`：nalgebra 类型别名
//! - `timer`：60 Hz 固定步长计时器

pub mod config;
pub mod error;
pub mod log;
pub mod math;
pub mod timer;

pub use config::Config;
pub use error::{EmteError, Result};
pub use math::{Color, Matrix4, Vector2, Vector3, Vector4};
pub use timer::StepTimer;
