//! Keyboard state and cursor deltas.
//!
//! Rendering code only ever asks two questions: is a key down, and how far
//! did the cursor move since the last frame. Key presses are also recorded
//! as edges so toggles fire once per press.

use std::collections::HashSet;

use winit::event::{ElementState, WindowEvent};
use winit::keyboard::PhysicalKey;

pub use winit::keyboard::KeyCode;

/// Tracks the current state of keyboard and mouse input.
#[derive(Debug, Default)]
pub struct InputState {
    /// Currently pressed keys
    pressed_keys: HashSet<KeyCode>,
    /// Keys that went down since the last frame
    just_pressed_keys: HashSet<KeyCode>,
    /// Raw mouse motion accumulated since the last frame
    cursor_delta: (f32, f32),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the end of each frame to clear per-frame state.
    pub fn end_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.cursor_delta = (0.0, 0.0);
    }

    /// Feeds a window event. Returns `true` if it was a keyboard event.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        let WindowEvent::KeyboardInput { event, .. } = event else {
            return false;
        };
        let PhysicalKey::Code(key) = event.physical_key else {
            return false;
        };
        match event.state {
            ElementState::Pressed => self.on_key_pressed(key),
            ElementState::Released => self.on_key_released(key),
        }
        true
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    /// Accumulates raw mouse motion (`DeviceEvent::MouseMotion`).
    pub fn on_mouse_motion(&mut self, dx: f64, dy: f64) {
        self.cursor_delta.0 += dx as f32;
        self.cursor_delta.1 += dy as f32;
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// True only on the frame the key went down; auto-repeat is ignored.
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    /// Cursor movement in pixels since the last [`InputState::end_frame`].
    pub fn cursor_delta(&self) -> (f32, f32) {
        self.cursor_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_edges() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Space);
        assert!(input.is_key_down(KeyCode::Space));
        assert!(input.is_key_just_pressed(KeyCode::Space));

        input.end_frame();
        // Held key repeating does not re-trigger the edge
        input.on_key_pressed(KeyCode::Space);
        assert!(input.is_key_down(KeyCode::Space));
        assert!(!input.is_key_just_pressed(KeyCode::Space));

        input.on_key_released(KeyCode::Space);
        assert!(!input.is_key_down(KeyCode::Space));
    }

    #[test]
    fn test_cursor_delta_accumulates() {
        let mut input = InputState::new();
        input.on_mouse_motion(3.0, -1.0);
        input.on_mouse_motion(2.0, 4.0);
        assert_eq!(input.cursor_delta(), (5.0, 3.0));

        input.end_frame();
        assert_eq!(input.cursor_delta(), (0.0, 0.0));
    }
}
