//! Protocol module - accelerometer line grammar
//!
//! The device speaks newline-delimited ASCII text. Each trimmed line is one of
//! a small set of shapes; adding a new device message means adding a
//! [`DeviceLine`] variant and a match arm in [`parse_line`].
//!
//! ```text
//! WAVE                       -> flap
//! TILT_LEFT:<vel>:<angle>    -> tilt left  (vel: u32 deg/s, angle: signed degrees)
//! TILT_RIGHT:<vel>:<angle>   -> tilt right
//! DEBUG:...                  -> status, ignored by gameplay
//! Rest position:...          -> status
//! ...Calibrating...          -> status
//! READY                      -> status
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::types::{InputEvent, TiltDirection, TiltEvent, CALIBRATE_COMMAND};

const WAVE: &str = "WAVE";
const READY: &str = "READY";
const TILT_PREFIX: &str = "TILT_";
const DEBUG_PREFIX: &str = "DEBUG:";
const REST_PREFIX: &str = "Rest position:";
const CALIBRATING: &str = "Calibrating";

/// Informational output of the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Debug,
    RestPosition,
    Calibrating,
    Ready,
}

/// One classified line of device output.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceLine {
    Wave,
    Tilt {
        direction: TiltDirection,
        velocity: u32,
        angle: f64,
    },
    Status {
        kind: StatusKind,
        text: String,
    },
    /// Well-formed text that matches no known shape, including malformed tilts.
    Unrecognized(String),
}

impl DeviceLine {
    /// Map the line to a gameplay event, stamping tilts with `timestamp_ms`.
    pub fn to_event(&self, timestamp_ms: u64) -> Option<InputEvent> {
        match self {
            DeviceLine::Wave => Some(InputEvent::Flap),
            DeviceLine::Tilt {
                direction,
                velocity,
                angle,
            } => Some(InputEvent::Tilt(TiltEvent::serial(
                *direction,
                *velocity,
                *angle,
                timestamp_ms,
            ))),
            DeviceLine::Status { .. } | DeviceLine::Unrecognized(_) => None,
        }
    }

    /// Debug trace of a received line; every classified line goes through here.
    pub fn log(&self) {
        match self {
            DeviceLine::Wave => debug!("device event: WAVE"),
            DeviceLine::Tilt {
                direction,
                velocity,
                angle,
            } => debug!(direction = direction.as_str(), velocity, angle, "device event: TILT"),
            DeviceLine::Status { kind, text } => debug!(?kind, "device status: {}", text),
            DeviceLine::Unrecognized(text) => debug!("device line (unparsed): {}", text),
        }
    }
}

/// Classify one raw line. Returns `None` for blank lines.
pub fn parse_line(raw: &str) -> Option<DeviceLine> {
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }

    if line == WAVE {
        return Some(DeviceLine::Wave);
    }

    if let Some(rest) = line.strip_prefix(TILT_PREFIX) {
        if let Some(tilt) = parse_tilt(rest) {
            return Some(tilt);
        }
        return Some(DeviceLine::Unrecognized(line.to_string()));
    }

    if let Some(kind) = status_kind(line) {
        return Some(DeviceLine::Status {
            kind,
            text: line.to_string(),
        });
    }

    Some(DeviceLine::Unrecognized(line.to_string()))
}

fn status_kind(line: &str) -> Option<StatusKind> {
    if line.starts_with(DEBUG_PREFIX) {
        Some(StatusKind::Debug)
    } else if line.starts_with(REST_PREFIX) {
        Some(StatusKind::RestPosition)
    } else if line.contains(CALIBRATING) {
        Some(StatusKind::Calibrating)
    } else if line == READY {
        Some(StatusKind::Ready)
    } else {
        None
    }
}

/// `<DIR>:<velocity>:<angle>` after the `TILT_` prefix.
fn parse_tilt(rest: &str) -> Option<DeviceLine> {
    let mut parts = rest.split(':');
    let direction = match parts.next()? {
        "LEFT" => TiltDirection::Left,
        "RIGHT" => TiltDirection::Right,
        _ => return None,
    };
    let velocity = parse_unsigned(parts.next()?)?;
    let angle = parse_signed_decimal(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some(DeviceLine::Tilt {
        direction,
        velocity,
        angle,
    })
}

fn parse_unsigned(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// `[+-]?digits(.digits)?` - rejects `inf`, `NaN`, exponents and bare dots.
fn parse_signed_decimal(s: &str) -> Option<f64> {
    let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    if !digits(int_part) || !frac_part.map_or(true, digits) {
        return None;
    }
    s.parse().ok()
}

/// Commands the host may send to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCommand {
    /// Re-measure the rest position.
    Calibrate,
}

impl DeviceCommand {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            DeviceCommand::Calibrate => &[CALIBRATE_COMMAND],
        }
    }
}

/// Milliseconds since the Unix epoch, used to stamp events.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
