//! Keyboard and mouse state for the viewer controls.

use std::collections::HashSet;

use glam::Vec2;
pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Other,
        }
    }
}

/// Input accumulated between two frames.
///
/// Window events feed the `on_*` methods; the frame loop reads the state and
/// calls [`InputState::begin_frame`] once it has consumed the deltas.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
    pressed_buttons: HashSet<MouseButton>,
    cursor: Option<Vec2>,
    /// Cursor movement since the last frame, summed over all move events.
    cursor_delta: Vec2,
    /// Scroll lines since the last frame.
    scroll: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the per-frame deltas.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.cursor_delta = Vec2::ZERO;
        self.scroll = 0.0;
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        self.pressed_buttons.insert(button);
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Records a cursor position. The first position after the cursor enters
    /// the window produces no delta.
    pub fn on_cursor_moved(&mut self, x: f32, y: f32) {
        let position = Vec2::new(x, y);
        if let Some(previous) = self.cursor {
            self.cursor_delta += position - previous;
        }
        self.cursor = Some(position);
    }

    pub fn on_cursor_left(&mut self) {
        self.cursor = None;
    }

    pub fn on_scroll(&mut self, lines: f32) {
        self.scroll += lines;
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn cursor_delta(&self) -> Vec2 {
        self.cursor_delta
    }

    pub fn scroll(&self) -> f32 {
        self.scroll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_delta_accumulates() {
        let mut input = InputState::new();
        input.on_cursor_moved(10.0, 10.0);
        assert_eq!(input.cursor_delta(), Vec2::ZERO);

        input.on_cursor_moved(12.0, 9.0);
        input.on_cursor_moved(15.0, 9.0);
        assert_eq!(input.cursor_delta(), Vec2::new(5.0, -1.0));

        input.begin_frame();
        assert_eq!(input.cursor_delta(), Vec2::ZERO);
    }

    #[test]
    fn test_cursor_reentry_has_no_jump() {
        let mut input = InputState::new();
        input.on_cursor_moved(0.0, 0.0);
        input.on_cursor_left();
        input.on_cursor_moved(500.0, 500.0);
        assert_eq!(input.cursor_delta(), Vec2::ZERO);
    }

    #[test]
    fn test_key_just_pressed_once() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Escape);
        assert!(input.is_key_just_pressed(KeyCode::Escape));

        input.begin_frame();
        input.on_key_pressed(KeyCode::Escape);
        assert!(input.is_key_pressed(KeyCode::Escape));
        assert!(!input.is_key_just_pressed(KeyCode::Escape));

        input.on_key_released(KeyCode::Escape);
        assert!(!input.is_key_pressed(KeyCode::Escape));
    }

    #[test]
    fn test_scroll_sums_within_frame() {
        let mut input = InputState::new();
        input.on_scroll(1.0);
        input.on_scroll(2.0);
        assert_eq!(input.scroll(), 3.0);
        input.begin_frame();
        assert_eq!(input.scroll(), 0.0);
    }

    #[test]
    fn test_mouse_buttons() {
        let mut input = InputState::new();
        input.on_mouse_pressed(MouseButton::Left);
        assert!(input.is_mouse_pressed(MouseButton::Left));
        input.on_mouse_released(MouseButton::Left);
        assert!(!input.is_mouse_pressed(MouseButton::Left));
    }
}
