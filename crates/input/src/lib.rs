//! Terminal input module (front-end facing).
//!
//! This module is intentionally independent of the device link. It maps
//! `crossterm` key events into [`KeyIntent`]s, turns held direction keys into
//! keyboard tilts, and provides [`EventSlots`], the latest-value handoff the
//! frame loop drains once per tick.

pub mod handler;
pub mod map;
pub mod slots;

pub use wavy_bird_types as types;

pub use handler::KeyboardTilt;
pub use map::{handle_key_event, should_quit, KeyIntent};
pub use slots::EventSlots;
