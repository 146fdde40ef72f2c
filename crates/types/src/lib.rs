//! Core types module - shared data structures and constants
//!
//! This module defines the input vocabulary shared by the device link, the
//! keyboard front end and the frame loop. All types are plain data with no
//! external dependencies, so every layer can use them without pulling in
//! tokio or a terminal backend.
//!
//! # Events
//!
//! The game consumes two kinds of discrete events:
//!
//! - [`InputEvent::Flap`]: momentary upward impulse (device `WAVE`, space bar)
//! - [`InputEvent::Tilt`]: directional steering with optional magnitude
//!
//! # Timing and link constants
//!
//! | Constant | Value | Description |
//! |----------|-------|-------------|
//! | `TICK_MS` | 16 | Frame interval (~60 FPS) |
//! | `DEFAULT_BAUD_RATE` | 115200 | Accelerometer firmware baud rate |
//! | `CALIBRATE_COMMAND` | `b'0'` | Outbound calibration request |
//!
//! # Examples
//!
//! ```
//! use wavy_bird_types::{ConnectionState, InputEvent, InputSource, TiltDirection, TiltEvent};
//!
//! let tilt = TiltEvent::keyboard(TiltDirection::Left, 1_000);
//! assert_eq!(tilt.source, InputSource::Keyboard);
//! assert_eq!(tilt.velocity, None);
//!
//! let event = InputEvent::Tilt(tilt);
//! assert!(event.is_tilt());
//!
//! assert!(ConnectionState::Error.can_connect());
//! ```

/// Fixed frame interval in milliseconds (16ms ≈ 60 FPS)
pub const TICK_MS: u32 = 16;

/// Baud rate used by the current accelerometer firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Single byte sent to the device to request a rest-position calibration (ASCII '0').
pub const CALIBRATE_COMMAND: u8 = b'0';

/// Line terminator of the device protocol.
pub const LINE_DELIMITER: char = '\n';

/// Lifecycle of the device connection.
///
/// Exactly one value exists per device link; only the link mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    /// Whether `connect()` starts a new attempt from this state.
    pub fn can_connect(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Error)
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }

    /// Human readable status line shown by the front end.
    pub fn status_label(self) -> &'static str {
        match self {
            ConnectionState::Connected => "Accelerometer Connected (Serial)",
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Error => "Serial Error - Using Keyboard",
            ConnectionState::Disconnected => "Keyboard Mode (Press '-' to connect serial)",
        }
    }
}

/// Steering direction of a tilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TiltDirection {
    Left,
    Right,
}

impl TiltDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TiltDirection::Left => "left",
            TiltDirection::Right => "right",
        }
    }
}

/// Which control scheme produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSource {
    Keyboard,
    Serial,
}

impl InputSource {
    pub fn as_str(self) -> &'static str {
        match self {
            InputSource::Keyboard => "keyboard",
            InputSource::Serial => "serial",
        }
    }
}

/// Directional steering event.
///
/// `velocity` is in deg/s and `angle` in degrees. Keyboard tilts carry
/// neither.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiltEvent {
    pub direction: TiltDirection,
    pub velocity: Option<u32>,
    pub angle: Option<f64>,
    pub source: InputSource,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl TiltEvent {
    pub fn keyboard(direction: TiltDirection, timestamp_ms: u64) -> Self {
        Self {
            direction,
            velocity: None,
            angle: None,
            source: InputSource::Keyboard,
            timestamp_ms,
        }
    }

    pub fn serial(direction: TiltDirection, velocity: u32, angle: f64, timestamp_ms: u64) -> Self {
        Self {
            direction,
            velocity: Some(velocity),
            angle: Some(angle),
            source: InputSource::Serial,
            timestamp_ms,
        }
    }
}

/// Normalized high-level input consumed once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Flap,
    Tilt(TiltEvent),
}

impl InputEvent {
    pub fn is_flap(&self) -> bool {
        matches!(self, InputEvent::Flap)
    }

    pub fn is_tilt(&self) -> bool {
        matches!(self, InputEvent::Tilt(_))
    }
}

/// Active control scheme, following the device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InputMode {
    #[default]
    Keyboard,
    Serial,
}

impl InputMode {
    pub fn for_state(state: ConnectionState) -> Self {
        if state.is_connected() {
            InputMode::Serial
        } else {
            InputMode::Keyboard
        }
    }
}
