//! Input state consumed by the free-look camera

use glam::{Vec2, Vec3};
use winit::event::{ElementState, MouseButton};
use winit::keyboard::KeyCode;

/// Keys and mouse state for one frame of camera control
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraInput {
    /// Movement keys (WASD, Space/Shift for up/down)
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,

    /// Mouse delta since last frame (in pixels)
    pub mouse_delta: Vec2,

    /// Whether mouse look is active (right mouse button held)
    pub look_active: bool,
}

impl CameraInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unnormalized movement in camera space: +x right, +y up, +z forward
    pub fn movement(&self) -> Vec3 {
        let axis = |positive: bool, negative: bool| positive as i32 as f32 - negative as i32 as f32;
        Vec3::new(
            axis(self.right, self.left),
            axis(self.up, self.down),
            axis(self.forward, self.backward),
        )
    }

    /// Track a key press or release. Returns true if the key moves the camera.
    pub fn handle_key(&mut self, key: KeyCode, state: ElementState) -> bool {
        let pressed = state == ElementState::Pressed;
        let slot = match key {
            KeyCode::KeyW => &mut self.forward,
            KeyCode::KeyS => &mut self.backward,
            KeyCode::KeyA => &mut self.left,
            KeyCode::KeyD => &mut self.right,
            KeyCode::Space => &mut self.up,
            KeyCode::ShiftLeft => &mut self.down,
            _ => return false,
        };
        *slot = pressed;
        true
    }

    pub fn handle_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if button == MouseButton::Right {
            self.look_active = state == ElementState::Pressed;
        }
    }

    /// Accumulate raw mouse motion until the next [`reset_deltas`](Self::reset_deltas)
    pub fn add_mouse_delta(&mut self, delta: Vec2) {
        self.mouse_delta += delta;
    }

    /// Reset per-frame deltas (call after update)
    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite_keys_cancel() {
        let mut input = CameraInput::new();
        input.handle_key(KeyCode::KeyW, ElementState::Pressed);
        input.handle_key(KeyCode::KeyS, ElementState::Pressed);
        input.handle_key(KeyCode::Space, ElementState::Pressed);
        assert_eq!(input.movement(), Vec3::new(0.0, 1.0, 0.0));

        input.handle_key(KeyCode::KeyS, ElementState::Released);
        assert_eq!(input.movement(), Vec3::new(0.0, 1.0, 1.0));
    }

    #[test]
    fn test_unrelated_key_ignored() {
        let mut input = CameraInput::new();
        assert!(!input.handle_key(KeyCode::KeyQ, ElementState::Pressed));
        assert_eq!(input, CameraInput::default());
    }

    #[test]
    fn test_right_button_toggles_look() {
        let mut input = CameraInput::new();
        input.handle_mouse_button(MouseButton::Right, ElementState::Pressed);
        assert!(input.look_active);
        input.add_mouse_delta(Vec2::new(3.0, -1.0));
        input.add_mouse_delta(Vec2::new(1.0, 0.0));
        assert_eq!(input.mouse_delta, Vec2::new(4.0, -1.0));
        input.reset_deltas();
        assert_eq!(input.mouse_delta, Vec2::ZERO);
        input.handle_mouse_button(MouseButton::Right, ElementState::Released);
        assert!(!input.look_active);
    }
}
