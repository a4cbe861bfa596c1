//! GUI 管理器
//!
//! 集成 egui、egui-winit 和 egui-wgpu：处理窗口事件，每帧构建面板，
//! 在帧的最后一个 pass 中绘制到交换链。

use egui_wgpu::Renderer as EguiRenderer;
use egui_winit::State as EguiState;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::gui::metrics::PerformanceMetrics;
use crate::gui::panels;
use crate::gui::state::GuiState;

/// GUI 管理器（egui + wgpu）
pub struct GuiManager {
    context: egui::Context,
    state: EguiState,
    renderer: EguiRenderer,

    gui_state: GuiState,
    metrics: PerformanceMetrics,
    /// `update` 产生、`render` 消费的输出
    pending: Option<egui::FullOutput>,
}

impl GuiManager {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        window: &Window,
        gui_state: GuiState,
    ) -> Self {
        let context = egui::Context::default();
        let state = EguiState::new(
            context.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
        );
        let renderer = EguiRenderer::new(device, surface_format, None, 1);

        Self {
            context,
            state,
            renderer,
            gui_state,
            metrics: PerformanceMetrics::new(),
            pending: None,
        }
    }

    /// 处理窗口事件，返回 GUI 是否消费了该事件
    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.state.on_window_event(window, event).consumed
    }

    /// 构建本帧的面板
    pub fn update(&mut self, window: &Window) {
        self.metrics.record_frame();
        self.gui_state
            .update_performance(self.metrics.fps(), self.metrics.frame_time_ms());

        let raw_input = self.state.take_egui_input(window);
        let gui_state = &mut self.gui_state;
        self.pending = Some(self.context.run(raw_input, |ctx| panels::render(ctx, gui_state)));
    }

    /// 把 `update` 构建的面板绘制到 `view`
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        window: &Window,
    ) {
        let Some(full_output) = self.pending.take() else {
            return;
        };

        self.state
            .handle_platform_output(window, full_output.platform_output);

        let paint_jobs = self
            .context
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        let size = window.inner_size();
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [size.width, size.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        for (id, image_delta) in &full_output.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, image_delta);
        }
        // 没有自定义绘制回调，不会产生额外的命令缓冲
        let _ = self
            .renderer
            .update_buffers(device, queue, encoder, &paint_jobs, &screen_descriptor);

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("GUI Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.renderer
                .render(&mut render_pass, &paint_jobs, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.renderer.free_texture(id);
        }
    }

    pub fn state(&self) -> &GuiState {
        &self.gui_state
    }

    pub fn state_mut(&mut self) -> &mut GuiState {
        &mut self.gui_state
    }
}
