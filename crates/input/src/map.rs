//! Key mapping from terminal events to front-end intents.

use crate::types::TiltDirection;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// What a key press asks the front end to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyIntent {
    Flap,
    Tilt(TiltDirection),
    /// Connect the device, or disconnect it when already connected.
    ToggleDevice,
    Calibrate,
}

/// Map keyboard input to intents.
pub fn handle_key_event(key: KeyEvent) -> Option<KeyIntent> {
    match key.code {
        KeyCode::Char(' ') | KeyCode::Up | KeyCode::Char('w') | KeyCode::Char('W') => {
            Some(KeyIntent::Flap)
        }

        KeyCode::Left | KeyCode::Char('a') | KeyCode::Char('A') => {
            Some(KeyIntent::Tilt(TiltDirection::Left))
        }
        KeyCode::Right | KeyCode::Char('d') | KeyCode::Char('D') => {
            Some(KeyIntent::Tilt(TiltDirection::Right))
        }

        // Device
        KeyCode::Char('-') => Some(KeyIntent::ToggleDevice),
        KeyCode::Char('=') => Some(KeyIntent::Calibrate),

        _ => None,
    }
}

/// Check if key should quit.
pub fn should_quit(key: KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc)
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}
