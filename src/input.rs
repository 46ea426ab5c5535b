//! Serialized keyboard/mouse events crossing the Host → Render RPC boundary
//! (spec.md §6 `handle_input(event)`), plus the small pieces of state
//! derived from them: cursor position (for [`crate::render::raycast_ground`])
//! and the six-boolean [`crate::physics::MovementInput`] snapshot the host
//! derives from held keys before forwarding it to the physics worker via
//! `set_player_input`.
//!
//! This crate owns none of the actual OS-level event capture — that's the
//! "input capture" collaborator spec.md §1 puts out of scope — only the
//! wire representation and the bookkeeping that turns a stream of these
//! into the two downstream shapes (`MovementInput`, cursor position) the
//! simulation core actually consumes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::physics::MovementInput;

/// A key identity, independent of any concrete windowing crate's keycode
/// enum (this crate depends on none — spec.md §1 puts input capture out of
/// scope). Only the keys the character controller and host-level shortcuts
/// actually care about are named; anything else arrives as `Other(u32)`
/// carrying a platform scancode the host is free to map itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    W,
    A,
    S,
    D,
    Space,
    ShiftLeft,
    Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

/// One serialized input event, per spec.md §6. `x`/`y` on [`InputEvent::MouseMoved`]
/// are window-coordinate pixels, not NDC — [`crate::render::RenderWorker::raycast_ground`]
/// takes NDC directly from its own caller instead of reading cursor state,
/// matching spec.md §6's signature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    MouseDown(MouseButton),
    MouseUp(MouseButton),
    MouseMoved { x: f32, y: f32 },
}

/// Cursor position in window pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f32,
    pub y: f32,
}

/// Tracks held keys/buttons and derives [`MovementInput`] from the WASD +
/// Space + Left-Shift convention spec.md §3 assumes. Owned by the host, fed
/// by [`InputEvent`]s, and the single source of truth forwarded to both
/// workers (see `crate::host`).
#[derive(Debug, Default)]
pub struct InputState {
    held_keys: HashSet<KeyCode>,
    held_buttons: HashSet<MouseButton>,
    cursor: CursorPosition,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: InputEvent) {
        match event {
            InputEvent::KeyDown(key) => {
                self.held_keys.insert(key);
            }
            InputEvent::KeyUp(key) => {
                self.held_keys.remove(&key);
            }
            InputEvent::MouseDown(button) => {
                self.held_buttons.insert(button);
            }
            InputEvent::MouseUp(button) => {
                self.held_buttons.remove(&button);
            }
            InputEvent::MouseMoved { x, y } => {
                self.cursor = CursorPosition { x, y };
            }
        }
    }

    pub fn cursor_position(&self) -> CursorPosition {
        self.cursor
    }

    pub fn is_held(&self, key: KeyCode) -> bool {
        self.held_keys.contains(&key)
    }

    /// Derives the current [`MovementInput`] snapshot from held keys, per
    /// spec.md §3's WASD + Space (jump) + Left-Shift (sprint) convention.
    pub fn movement_input(&self) -> MovementInput {
        MovementInput {
            forward: self.is_held(KeyCode::W),
            backward: self.is_held(KeyCode::S),
            left: self.is_held(KeyCode::A),
            right: self.is_held(KeyCode::D),
            jump: self.is_held(KeyCode::Space),
            sprint: self.is_held(KeyCode::ShiftLeft),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wasd_and_modifiers_derive_movement_input() {
        let mut state = InputState::new();
        state.apply(InputEvent::KeyDown(KeyCode::W));
        state.apply(InputEvent::KeyDown(KeyCode::ShiftLeft));

        let input = state.movement_input();
        assert!(input.forward);
        assert!(input.sprint);
        assert!(!input.backward);
        assert!(!input.jump);
    }

    #[test]
    fn key_up_clears_held_state() {
        let mut state = InputState::new();
        state.apply(InputEvent::KeyDown(KeyCode::D));
        assert!(state.movement_input().right);
        state.apply(InputEvent::KeyUp(KeyCode::D));
        assert!(!state.movement_input().right);
    }

    #[test]
    fn mouse_moved_updates_cursor_position() {
        let mut state = InputState::new();
        state.apply(InputEvent::MouseMoved { x: 12.0, y: 34.0 });
        assert_eq!(state.cursor_position(), CursorPosition { x: 12.0, y: 34.0 });
    }
}
