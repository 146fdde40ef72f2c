//! Per-frame input consumption.
//!
//! The frame loop owns the keyboard side of input and is the single reader of
//! the [`EventSlots`]. Device lines reach the same slots from the link's read
//! loop, so one `tick` sees keyboard and accelerometer input alike.

use std::sync::Arc;

use arrayvec::ArrayVec;
use crossterm::event::KeyCode;

use crate::input::{EventSlots, KeyIntent, KeyboardTilt};
use crate::types::{ConnectionState, InputEvent, InputMode, InputSource, TiltEvent};

/// Something the front end has to ask of the device link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRequest {
    Toggle,
    Calibrate,
}

/// What one frame consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub mode: InputMode,
    pub state: ConnectionState,
    pub events: ArrayVec<InputEvent, 2>,
}

#[derive(Debug)]
pub struct FrameInput {
    slots: Arc<EventSlots>,
    tilt: KeyboardTilt,
    frame: u64,
    flaps: u64,
    tilts: u64,
    last_tilt: Option<TiltEvent>,
}

impl FrameInput {
    pub fn new(slots: Arc<EventSlots>) -> Self {
        Self::with_tilt(slots, KeyboardTilt::new())
    }

    pub fn with_tilt(slots: Arc<EventSlots>, tilt: KeyboardTilt) -> Self {
        Self {
            slots,
            tilt,
            frame: 0,
            flaps: 0,
            tilts: 0,
            last_tilt: None,
        }
    }

    pub fn slots(&self) -> &Arc<EventSlots> {
        &self.slots
    }

    /// Handle a key press. Gameplay keys publish straight into the slots;
    /// device keys are returned for the caller to run against the link.
    pub fn key_press(&mut self, intent: KeyIntent, code: KeyCode, now_ms: u64) -> Option<DeviceRequest> {
        match intent {
            KeyIntent::Flap => {
                self.slots.publish(InputEvent::Flap);
                None
            }
            KeyIntent::Tilt(_) => {
                if let Some(event) = self.tilt.handle_key_press(code, now_ms) {
                    self.slots.publish(event);
                }
                None
            }
            KeyIntent::ToggleDevice => {
                // The control scheme is about to change; drop any held tilt.
                self.tilt.reset();
                Some(DeviceRequest::Toggle)
            }
            KeyIntent::Calibrate => Some(DeviceRequest::Calibrate),
        }
    }

    pub fn key_release(&mut self, code: KeyCode) {
        self.tilt.handle_key_release(code);
    }

    /// Advance one frame and consume whatever is pending.
    pub fn tick(&mut self, elapsed_ms: u32, now_ms: u64, state: ConnectionState) -> FrameReport {
        for event in self.tilt.update(elapsed_ms, now_ms) {
            self.slots.publish(event);
        }

        let events = self.slots.drain();
        for event in &events {
            match event {
                InputEvent::Flap => self.flaps += 1,
                InputEvent::Tilt(t) => {
                    self.tilts += 1;
                    self.last_tilt = Some(*t);
                }
            }
        }

        self.frame += 1;
        FrameReport {
            frame: self.frame,
            mode: InputMode::for_state(state),
            state,
            events,
        }
    }

    pub fn flaps(&self) -> u64 {
        self.flaps
    }

    pub fn tilts(&self) -> u64 {
        self.tilts
    }

    pub fn last_tilt(&self) -> Option<TiltEvent> {
        self.last_tilt
    }

    /// One-line HUD for the terminal front end.
    pub fn status_line(&self, report: &FrameReport) -> String {
        let mode = match report.mode {
            InputMode::Keyboard => "keyboard",
            InputMode::Serial => "serial",
        };
        let mut line = format!(
            "{} | mode: {} | flaps: {} tilts: {} dropped: {}",
            report.state.status_label(),
            mode,
            self.flaps,
            self.tilts,
            self.slots.overwritten(),
        );

        if let Some(t) = self.last_tilt {
            line.push_str(&format!(" | last tilt: {}", t.direction.as_str()));
            match (t.source, t.velocity, t.angle) {
                (InputSource::Serial, Some(v), Some(a)) => {
                    line.push_str(&format!(" {v} deg/s {a:.1} deg"));
                }
                (source, _, _) => line.push_str(&format!(" ({})", source.as_str())),
            }
        }
        line
    }
}
