//! Keyboard tilt handler for terminal environments.
//!
//! Holding a direction key keeps steering: after an initial delay the held
//! direction re-emits a tilt every repeat interval. Terminals that do not
//! emit key release events are handled by a timeout.

use crossterm::event::KeyCode;

use arrayvec::ArrayVec;

use crate::types::{InputEvent, TiltDirection, TiltEvent};

/// Delay before a held direction starts repeating.
pub const DEFAULT_TILT_DELAY_MS: u32 = 150;

/// Interval between repeated tilts while held.
pub const DEFAULT_TILT_REPEAT_MS: u32 = 50;

// In terminals without key-release events, a short timeout prevents a single tap
// from turning into a sustained "held" state.
const DEFAULT_KEY_RELEASE_TIMEOUT_MS: u32 = 150;

/// Tracks the held tilt direction.
#[derive(Debug, Clone)]
pub struct KeyboardTilt {
    held: Option<TiltDirection>,
    last_key_time: std::time::Instant,
    delay_timer: u32,
    repeat_accumulator: u32,
    delay_ms: u32,
    repeat_ms: u32,
    key_release_timeout_ms: u32,
}

fn direction_for(code: KeyCode) -> Option<TiltDirection> {
    match code {
        KeyCode::Left | KeyCode::Char('a') | KeyCode::Char('A') => Some(TiltDirection::Left),
        KeyCode::Right | KeyCode::Char('d') | KeyCode::Char('D') => Some(TiltDirection::Right),
        _ => None,
    }
}

impl KeyboardTilt {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_TILT_DELAY_MS, DEFAULT_TILT_REPEAT_MS)
    }

    pub fn with_config(delay_ms: u32, repeat_ms: u32) -> Self {
        Self {
            held: None,
            last_key_time: std::time::Instant::now(),
            delay_timer: 0,
            repeat_accumulator: 0,
            delay_ms,
            repeat_ms: repeat_ms.max(1),
            key_release_timeout_ms: DEFAULT_KEY_RELEASE_TIMEOUT_MS,
        }
    }

    pub fn with_key_release_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.key_release_timeout_ms = timeout_ms;
        self
    }

    pub fn held(&self) -> Option<TiltDirection> {
        self.held
    }

    /// A press of a direction key emits a keyboard tilt immediately, unless
    /// that direction is already held (terminal auto-repeat).
    pub fn handle_key_press(&mut self, code: KeyCode, now_ms: u64) -> Option<InputEvent> {
        let direction = direction_for(code)?;
        self.last_key_time = std::time::Instant::now();
        if self.held == Some(direction) {
            return None;
        }
        self.held = Some(direction);
        self.delay_timer = 0;
        self.repeat_accumulator = 0;
        Some(InputEvent::Tilt(TiltEvent::keyboard(direction, now_ms)))
    }

    pub fn handle_key_release(&mut self, code: KeyCode) {
        if let Some(direction) = direction_for(code) {
            if self.held == Some(direction) {
                self.release();
            }
        }
    }

    /// Advance by `elapsed_ms` and return the repeats that became due.
    pub fn update(&mut self, elapsed_ms: u32, now_ms: u64) -> ArrayVec<InputEvent, 16> {
        let mut events = ArrayVec::<InputEvent, 16>::new();

        let time_since_last_key = self.last_key_time.elapsed().as_millis() as u32;
        if time_since_last_key > self.key_release_timeout_ms {
            self.release();
        }

        let Some(direction) = self.held else {
            return events;
        };

        let prev = self.delay_timer;
        self.delay_timer = self.delay_timer.saturating_add(elapsed_ms);
        if self.delay_timer >= self.delay_ms {
            let excess = if prev < self.delay_ms {
                self.delay_timer - self.delay_ms
            } else {
                elapsed_ms
            };
            self.repeat_accumulator += excess;
            while self.repeat_accumulator >= self.repeat_ms {
                let _ = events.try_push(InputEvent::Tilt(TiltEvent::keyboard(direction, now_ms)));
                self.repeat_accumulator -= self.repeat_ms;
            }
        }

        events
    }

    pub fn reset(&mut self) {
        self.release();
        self.last_key_time = std::time::Instant::now();
    }

    fn release(&mut self) {
        self.held = None;
        self.delay_timer = 0;
        self.repeat_accumulator = 0;
    }
}

impl Default for KeyboardTilt {
    fn default() -> Self {
        Self::new()
    }
}
