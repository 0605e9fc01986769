use std::collections::HashSet;

use glam::Vec2;

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
}

/// Non-character keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Escape,
}

/// Keys currently held down, updated from key press/release events.
#[derive(Debug, Default)]
pub struct InputState {
    keys: HashSet<KeyCode>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&mut self, key: KeyCode) {
        self.keys.insert(key);
    }

    pub fn set_key_up(&mut self, key: KeyCode) {
        self.keys.remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    pub fn release_all(&mut self) {
        self.keys.clear();
    }
}

/// Turns absolute cursor positions into look offsets.
///
/// The first sample after creation or [`MouseTracker::rearm`] only records
/// the position, so the camera does not jump to wherever the cursor was.
/// The y offset is flipped: screen y grows downward, pitch grows upward.
#[derive(Debug, Clone)]
pub struct MouseTracker {
    first_mouse: bool,
    last: Vec2,
}

impl MouseTracker {
    pub fn new(start: Vec2) -> Self {
        Self {
            first_mouse: true,
            last: start,
        }
    }

    pub fn offset(&mut self, position: Vec2) -> Vec2 {
        if self.first_mouse {
            self.last = position;
            self.first_mouse = false;
        }
        let offset = Vec2::new(position.x - self.last.x, self.last.y - position.y);
        self.last = position;
        offset
    }

    pub fn rearm(&mut self) {
        self.first_mouse = true;
    }

    pub fn is_armed(&self) -> bool {
        self.first_mouse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_state_tracks_keys() {
        let mut state = InputState::new();
        state.set_key_down(KeyCode::Character('W'));
        assert!(state.is_key_down(KeyCode::Character('W')));
        state.set_key_up(KeyCode::Character('W'));
        assert!(!state.is_key_down(KeyCode::Character('W')));
    }

    #[test]
    fn release_all_forgets_held_keys() {
        let mut state = InputState::new();
        state.set_key_down(KeyCode::Character('A'));
        state.set_key_down(KeyCode::Named(NamedKey::Escape));
        state.release_all();
        assert!(!state.is_key_down(KeyCode::Character('A')));
        assert!(!state.is_key_down(KeyCode::Named(NamedKey::Escape)));
    }

    #[test]
    fn first_sample_produces_no_offset() {
        for start in [Vec2::new(600.0, 450.0), Vec2::ZERO] {
            let mut tracker = MouseTracker::new(start);
            assert_eq!(tracker.offset(Vec2::new(1187.0, -43.5)), Vec2::ZERO);
        }
    }

    #[test]
    fn y_offset_is_inverted() {
        let mut tracker = MouseTracker::new(Vec2::ZERO);
        tracker.offset(Vec2::new(100.0, 100.0));
        assert_eq!(tracker.offset(Vec2::new(110.0, 90.0)), Vec2::new(10.0, 10.0));
        assert_eq!(tracker.offset(Vec2::new(105.0, 120.0)), Vec2::new(-5.0, -30.0));
    }

    #[test]
    fn rearm_swallows_the_next_jump() {
        let mut tracker = MouseTracker::new(Vec2::ZERO);
        tracker.offset(Vec2::new(10.0, 10.0));
        tracker.rearm();
        assert!(tracker.is_armed());
        assert_eq!(tracker.offset(Vec2::new(900.0, 700.0)), Vec2::ZERO);
        assert!(!tracker.is_armed());
        assert_eq!(tracker.offset(Vec2::new(901.0, 700.0)), Vec2::new(1.0, 0.0));
    }
}
