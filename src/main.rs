//! EMTE 示例程序
//!
//! 打开一个窗口，加载纹理清单，按固定步长更新场景，每个 tick 渲染一帧。
//!
//! ```bash
//! # 使用 config.toml（不存在时用默认配置）
//! cargo run
//!
//! # 命令行覆盖
//! cargo run -- --dx12 --msaa 8 --offscreen
//! cargo run -- --warp
//!
//! # 无窗口运行 120 帧
//! cargo run -- --headless --frames 120
//! ```
//!
//! 操作：WASD 移动，按住鼠标右键转动视角，Esc 退出。

use std::sync::Arc;

use anyhow::Context;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use emte::core::{log, Config, StepTimer};
use emte::gfx::headless::{Completion, HeadlessRenderer};
use emte::gfx::wgpu::WgpuRenderer;
use emte::scene::InputSystem;
use emte::{app_error, app_info};

/// 无窗口模式的默认帧数
const DEFAULT_HEADLESS_FRAMES: u64 = 120;

fn main() -> anyhow::Result<()> {
    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(std::env::args().skip(1));
    config.validate().context("Invalid configuration")?;

    let log_file = config
        .logging
        .file_output
        .then_some(config.logging.log_file.as_str());
    log::init_logger(config.logging.level, config.logging.file_output, log_file);

    app_info!(version = env!("CARGO_PKG_VERSION"), "EMTE starting");
    app_info!(
        backend = config.graphics.backend.name(),
        width = config.window.width,
        height = config.window.height,
        msaa = config.graphics.msaa_samples,
        offscreen = config.graphics.offscreen,
        frames_in_flight = config.graphics.frame_count,
        "Graphics configuration"
    );

    if config.graphics.backend.is_headless() {
        run_headless(&config)
    } else {
        run_windowed(config)
    }
}

fn run_headless(config: &Config) -> anyhow::Result<()> {
    let frames = config.max_frames.unwrap_or(DEFAULT_HEADLESS_FRAMES);
    let mut renderer =
        HeadlessRenderer::new(config, Completion::Lagged(1)).context("Failed to create headless renderer")?;
    let stats = renderer.run(frames)?;

    app_info!(
        frames = stats.frames_submitted,
        last_fence = %stats.last_signaled,
        ring_waits = stats.ring_waits,
        "Headless run complete"
    );
    Ok(())
}

fn run_windowed(config: Config) -> anyhow::Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let window = WindowBuilder::new()
        .with_title(format!("{} [{}]", config.window.title, config.graphics.backend.name()))
        .with_inner_size(winit::dpi::PhysicalSize::new(config.window.width, config.window.height))
        .with_resizable(config.window.resizable)
        .build(&event_loop)
        .context("Failed to create window")?;
    let window = Arc::new(window);

    // 适配器、着色器模型、回退纹理的失败都在这里退出
    let mut renderer = WgpuRenderer::new(Arc::clone(&window), &config).context("Failed to initialize renderer")?;
    let mut input = InputSystem::new(&config.scene.camera);
    let mut timer = StepTimer::new();
    let mut rendered: u64 = 0;

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, window_id } if window_id == window.id() => {
            if renderer.handle_gui_event(&event) {
                return;
            }

            match event {
                WindowEvent::CloseRequested
                | WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            physical_key: PhysicalKey::Code(KeyCode::Escape),
                            state: ElementState::Pressed,
                            ..
                        },
                    ..
                } => {
                    app_info!("Close requested, shutting down");
                    if let Err(e) = renderer.wait_for_gpu() {
                        app_error!(error = %e, "Failed to drain GPU work");
                    }
                    elwt.exit();
                }
                WindowEvent::Resized(size) => {
                    if let Err(e) = renderer.resize(size.width, size.height) {
                        app_error!(error = %e, "Resize failed");
                        elwt.exit();
                    }
                }
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            physical_key: PhysicalKey::Code(code),
                            state,
                            ..
                        },
                    ..
                } => input.on_keyboard_input(code, state),
                WindowEvent::MouseInput { state, button, .. } => {
                    input.on_mouse_button(&window, button, state);
                }
                WindowEvent::CursorMoved { position, .. } => {
                    input.on_mouse_move((position.x, position.y));
                }
                WindowEvent::Focused(false) => input.unlock_cursor(&window),
                WindowEvent::RedrawRequested => {
                    let steps = timer.tick(|t| renderer.update(&mut input, t));
                    if steps == 0 {
                        return;
                    }

                    if let Err(e) = renderer.render() {
                        app_error!(error = %e, "Render failed");
                        elwt.exit();
                        return;
                    }

                    rendered += 1;
                    if config.max_frames.is_some_and(|max| rendered >= max) {
                        app_info!(frames = rendered, "Frame limit reached");
                        if let Err(e) = renderer.wait_for_gpu() {
                            app_error!(error = %e, "Failed to drain GPU work");
                        }
                        elwt.exit();
                    }
                }
                _ => {}
            }
        }
        Event::AboutToWait => window.request_redraw(),
        _ => {}
    })?;

    Ok(())
}
