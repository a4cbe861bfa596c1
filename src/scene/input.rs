//! 相机输入
//!
//! 把 winit 的键盘 / 鼠标事件转换成相机移动：WASD 或方向键移动，Space / PageUp 上升，
//! X / PageDown 下降，Home 回到初始位置，按住右键拖动转向。

use std::collections::HashSet;

use tracing::{debug, warn};
use winit::event::{ElementState, MouseButton};
use winit::keyboard::KeyCode;
use winit::window::{CursorGrabMode, Window};

use super::camera::Camera;
use crate::core::config::CameraConfig;

/// 相机输入状态
pub struct InputSystem {
    pressed_keys: HashSet<KeyCode>,

    last_mouse_pos: Option<(f64, f64)>,
    mouse_buttons: HashSet<MouseButton>,
    mouse_delta: (f32, f32),

    /// 单位/秒
    move_speed: f32,
    /// 度/像素
    mouse_sensitivity: f32,

    cursor_locked: bool,
}

impl InputSystem {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            pressed_keys: HashSet::new(),
            last_mouse_pos: None,
            mouse_buttons: HashSet::new(),
            mouse_delta: (0.0, 0.0),
            move_speed: config.move_speed,
            mouse_sensitivity: config.mouse_sensitivity,
            cursor_locked: false,
        }
    }

    /// 键盘事件
    pub fn on_keyboard_input(&mut self, keycode: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                self.pressed_keys.insert(keycode);
            }
            ElementState::Released => {
                self.pressed_keys.remove(&keycode);
            }
        }
    }

    /// 鼠标按键事件，右键按下时锁定光标
    pub fn on_mouse_button(&mut self, window: &Window, button: MouseButton, state: ElementState) {
        match state {
            ElementState::Pressed => {
                self.mouse_buttons.insert(button);
                if button == MouseButton::Right {
                    self.lock_cursor(window);
                }
            }
            ElementState::Released => {
                self.mouse_buttons.remove(&button);
                if button == MouseButton::Right {
                    self.unlock_cursor(window);
                }
            }
        }
    }

    /// 鼠标移动事件
    pub fn on_mouse_move(&mut self, position: (f64, f64)) {
        if let Some(last) = self.last_mouse_pos {
            self.mouse_delta.0 += (position.0 - last.0) as f32;
            self.mouse_delta.1 += (position.1 - last.1) as f32;
        }
        self.last_mouse_pos = Some(position);
    }

    fn any_pressed(&self, keys: &[KeyCode]) -> bool {
        keys.iter().any(|key| self.pressed_keys.contains(key))
    }

    /// 每个固定步长调用一次
    pub fn update_camera(&mut self, camera: &mut Camera, delta_time: f32) {
        if self.any_pressed(&[KeyCode::Home]) {
            camera.reset();
        }

        let distance = self.move_speed * delta_time;

        if self.any_pressed(&[KeyCode::KeyW, KeyCode::ArrowUp]) {
            camera.walk(distance);
        }
        if self.any_pressed(&[KeyCode::KeyS, KeyCode::ArrowDown]) {
            camera.walk(-distance);
        }
        if self.any_pressed(&[KeyCode::KeyA, KeyCode::ArrowLeft]) {
            camera.strafe(-distance);
        }
        if self.any_pressed(&[KeyCode::KeyD, KeyCode::ArrowRight]) {
            camera.strafe(distance);
        }
        if self.any_pressed(&[KeyCode::Space, KeyCode::PageUp]) {
            camera.rise(distance);
        }
        if self.any_pressed(&[KeyCode::KeyX, KeyCode::PageDown]) {
            camera.rise(-distance);
        }

        if self.mouse_buttons.contains(&MouseButton::Right) {
            let dx = (-self.mouse_delta.0 * self.mouse_sensitivity).to_radians();
            let dy = (-self.mouse_delta.1 * self.mouse_sensitivity).to_radians();
            camera.pitch(dy);
            camera.rotate_y(dx);
        }

        self.mouse_delta = (0.0, 0.0);
    }

    /// 锁定并隐藏光标
    pub fn lock_cursor(&mut self, window: &Window) {
        if self.cursor_locked {
            return;
        }

        window.set_cursor_visible(false);

        // Confined 支持更广，失败时再尝试 Locked
        match window.set_cursor_grab(CursorGrabMode::Confined) {
            Ok(()) => {
                debug!("Cursor grabbed with Confined mode");
                self.cursor_locked = true;
            }
            Err(e) => match window.set_cursor_grab(CursorGrabMode::Locked) {
                Ok(()) => {
                    debug!("Cursor grabbed with Locked mode");
                    self.cursor_locked = true;
                }
                Err(e2) => warn!("Failed to grab cursor (Confined: {}, Locked: {})", e, e2),
            },
        }
    }

    /// 解锁并显示光标
    pub fn unlock_cursor(&mut self, window: &Window) {
        window.set_cursor_visible(true);
        if !self.cursor_locked {
            return;
        }

        if let Err(e) = window.set_cursor_grab(CursorGrabMode::None) {
            warn!("Failed to release cursor grab: {}", e);
        }
        self.cursor_locked = false;
    }

    /// 窗口失去焦点时清空状态
    pub fn reset(&mut self) {
        self.pressed_keys.clear();
        self.mouse_buttons.clear();
        self.mouse_delta = (0.0, 0.0);
        self.last_mouse_pos = None;
    }

    pub fn move_speed(&self) -> f32 {
        self.move_speed
    }

    pub fn set_move_speed(&mut self, speed: f32) {
        self.move_speed = speed.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::Vector3;

    #[test]
    fn test_walk_forward() {
        let mut input = InputSystem::new(&CameraConfig::default());
        let mut camera = Camera::new(1.0, 1.0, 0.1, 10.0);

        input.on_keyboard_input(KeyCode::KeyW, ElementState::Pressed);
        input.update_camera(&mut camera, 0.5);
        assert!((camera.position() - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-5);

        input.on_keyboard_input(KeyCode::KeyW, ElementState::Released);
        input.update_camera(&mut camera, 0.5);
        assert!((camera.position() - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-5);
    }

    #[test]
    fn test_arrow_keys_match_wasd() {
        let mut input = InputSystem::new(&CameraConfig::default());
        let mut camera = Camera::new(1.0, 1.0, 0.1, 10.0);

        input.on_keyboard_input(KeyCode::ArrowUp, ElementState::Pressed);
        input.on_keyboard_input(KeyCode::ArrowRight, ElementState::Pressed);
        input.update_camera(&mut camera, 0.5);

        assert!((camera.position() - Vector3::new(1.0, 0.0, -1.0)).norm() < 1e-5);
    }

    #[test]
    fn test_vertical_movement() {
        let mut input = InputSystem::new(&CameraConfig::default());
        let mut camera = Camera::new(1.0, 1.0, 0.1, 10.0);

        input.on_keyboard_input(KeyCode::Space, ElementState::Pressed);
        input.update_camera(&mut camera, 0.5);
        assert!((camera.position() - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-5);

        input.on_keyboard_input(KeyCode::Space, ElementState::Released);
        input.on_keyboard_input(KeyCode::PageDown, ElementState::Pressed);
        input.update_camera(&mut camera, 1.0);
        assert!((camera.position() - Vector3::new(0.0, -1.0, 0.0)).norm() < 1e-5);

        // 上升和下降同时按下互相抵消
        input.on_keyboard_input(KeyCode::PageUp, ElementState::Pressed);
        input.update_camera(&mut camera, 1.0);
        assert!((camera.position() - Vector3::new(0.0, -1.0, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn test_home_resets_camera() {
        let config = CameraConfig::default();
        let mut input = InputSystem::new(&config);
        let mut camera = Camera::from_config(&config, 1.0);
        let start = camera.position();
        let look = camera.look();

        input.on_keyboard_input(KeyCode::KeyW, ElementState::Pressed);
        input.update_camera(&mut camera, 1.0);
        camera.rotate_y(0.5);
        assert!((camera.position() - start).norm() > 1e-3);

        input.on_keyboard_input(KeyCode::KeyW, ElementState::Released);
        input.on_keyboard_input(KeyCode::Home, ElementState::Pressed);
        input.update_camera(&mut camera, 1.0);

        assert!((camera.position() - start).norm() < 1e-5);
        assert!((camera.look() - look).norm() < 1e-5);
    }

    #[test]
    fn test_mouse_without_right_button_does_not_rotate() {
        let mut input = InputSystem::new(&CameraConfig::default());
        let mut camera = Camera::new(1.0, 1.0, 0.1, 10.0);
        let look = camera.look();

        input.on_mouse_move((0.0, 0.0));
        input.on_mouse_move((40.0, 10.0));
        input.update_camera(&mut camera, 1.0 / 60.0);

        assert!((camera.look() - look).norm() < 1e-6);
    }

    #[test]
    fn test_reset() {
        let mut input = InputSystem::new(&CameraConfig::default());
        input.on_keyboard_input(KeyCode::KeyD, ElementState::Pressed);
        input.reset();

        let mut camera = Camera::new(1.0, 1.0, 0.1, 10.0);
        input.update_camera(&mut camera, 1.0);
        assert!(camera.position().norm() < 1e-6);
    }
}
