//! 控制面板
//!
//! 一个可折叠的窗口，分为性能、帧周期、纹理和场景四节。

use egui::{Color32, Context, Grid, RichText, Slider, Ui, Window};

use crate::gui::state::GuiState;

/// 构建整个面板
pub fn render(ctx: &Context, state: &mut GuiState) {
    let mut open = state.show_panel;
    Window::new("EMTE")
        .open(&mut open)
        .default_width(320.0)
        .resizable(true)
        .show(ctx, |ui| {
            performance(ui, state);
            ui.separator();
            frame_cycle(ui, state);
            ui.separator();
            textures(ui, state);
            ui.separator();
            scene(ui, state);
        });
    state.show_panel = open;
}

fn performance(ui: &mut Ui, state: &GuiState) {
    ui.collapsing("性能", |ui| {
        ui.label(format!("FPS: {:.1}", state.fps));
        ui.label(format!("帧时间: {:.2} ms", state.frame_time_ms));
        ui.label(format!("后端: {} / {}", state.backend, state.adapter));
        ui.label(format!(
            "MSAA: {}x   离屏: {}",
            state.msaa_samples,
            if state.offscreen { "是" } else { "否" }
        ));
        if state.reconstructions > 0 {
            ui.colored_label(Color32::YELLOW, format!("设备重建 {} 次", state.reconstructions));
        }
    });
}

fn frame_cycle(ui: &mut Ui, state: &GuiState) {
    ui.collapsing("帧周期", |ui| {
        Grid::new("frame_cycle").num_columns(2).show(ui, |ui| {
            ui.label("在途帧数");
            ui.label(state.frames_in_flight.to_string());
            ui.end_row();

            ui.label("帧号");
            ui.label(state.frame_number.to_string());
            ui.end_row();

            ui.label("已 signal");
            ui.label(state.last_signaled.to_string());
            ui.end_row();

            ui.label("已完成");
            ui.label(state.last_completed.to_string());
            ui.end_row();

            ui.label("环等待");
            ui.label(state.ring_waits.to_string());
            ui.end_row();

            ui.label("临时内存");
            ui.label(format!(
                "{} B 在途 / 峰值 {} B",
                state.memory.bytes_in_flight, state.memory.peak_bytes
            ));
            ui.end_row();
        });
    });
}

fn textures(ui: &mut Ui, state: &GuiState) {
    ui.collapsing(
        format!("纹理 ({}/{})", state.descriptors_used, state.descriptor_capacity),
        |ui| {
            Grid::new("textures").num_columns(3).striped(true).show(ui, |ui| {
                for row in &state.textures {
                    ui.label(format!("#{}", row.slot));
                    let name = if row.name == state.fallback {
                        RichText::new(&row.name).italics()
                    } else {
                        RichText::new(&row.name)
                    };
                    ui.label(name);
                    ui.label(format!("{}x{}", row.width, row.height));
                    ui.end_row();
                }
            });
        },
    );
}

fn scene(ui: &mut Ui, state: &mut GuiState) {
    ui.collapsing("场景", |ui| {
        ui.horizontal(|ui| {
            ui.label("背景色");
            ui.color_edit_button_rgba_unmultiplied(&mut state.clear_color);
        });
        ui.add(Slider::new(&mut state.camera_speed, 0.5..=20.0).text("相机速度"));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::gui::state::TextureRow;

    #[test]
    fn test_panel_builds_without_backend() {
        let ctx = Context::default();
        let mut state = GuiState::new(&Config::default());
        state.textures.push(TextureRow {
            name: "default".to_string(),
            slot: 0,
            width: 64,
            height: 64,
        });

        // 新窗口第一帧只测量大小
        ctx.run(egui::RawInput::default(), |ctx| render(ctx, &mut state));
        let output = ctx.run(egui::RawInput::default(), |ctx| render(ctx, &mut state));

        assert!(!output.shapes.is_empty());
        assert!(state.show_panel);
    }
}
