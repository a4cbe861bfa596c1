//! EMTE - 纹理注册表与帧周期示例
//!
//! 一组逐步叠加功能的渲染示例的公共部分：
//!
//! - 纹理注册表：按名字加载纹理、分配描述符槽位、缺失时使用回退纹理
//! - 帧周期：固定大小的帧环，用 fence 限制 CPU 领先 GPU 的帧数
//!
//! # 模块结构
//!
//! - `core`：配置、日志、错误、数学类型、固定步长计时器
//! - `renderer`：与图形 API 无关的渲染核心（注册表、帧周期、pass 顺序）
//! - `gfx`：图形后端（wgpu、headless）
//! - `scene`：示例场景（精灵、光照三角形、线框网格、自由相机）
//! - `gui`：egui 控制面板
//!
//! # 使用示例
//!
//! ```no_run
//! use emte::core::Config;
//! use emte::gfx::headless::{Completion, HeadlessRenderer};
//!
//! let config = Config::default();
//! let mut renderer = HeadlessRenderer::new(&config, Completion::Lagged(1))?;
//! let stats = renderer.run(120)?;
//! println!("submitted {} frames, waited {} times", stats.frames_submitted, stats.ring_waits);
//! # Ok::<(), emte::core::EmteError>(())
//! ```

pub mod core;
pub mod gfx;
pub mod gui;
pub mod renderer;
pub mod scene;
