//! Latest-value handoff between input producers and the frame loop.
//!
//! This is deliberately not a queue. The frame loop consumes at most one
//! flap and one tilt per frame; a second flap or tilt arriving before the
//! frame drains overwrites the first. Overwrites are counted so the loss is
//! observable.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use arrayvec::ArrayVec;

use crate::types::{InputEvent, TiltEvent};

#[derive(Debug, Default)]
pub struct EventSlots {
    flap: AtomicBool,
    tilt: Mutex<Option<TiltEvent>>,
    overwritten: AtomicU64,
}

impl EventSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `event` in its slot, replacing any unconsumed event of the same kind.
    pub fn publish(&self, event: InputEvent) {
        match event {
            InputEvent::Flap => {
                if self.flap.swap(true, Ordering::AcqRel) {
                    self.overwritten.fetch_add(1, Ordering::Relaxed);
                }
            }
            InputEvent::Tilt(tilt) => {
                if let Ok(mut slot) = self.tilt.lock() {
                    if slot.replace(tilt).is_some() {
                        self.overwritten.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    pub fn take_flap(&self) -> bool {
        self.flap.swap(false, Ordering::AcqRel)
    }

    pub fn take_tilt(&self) -> Option<TiltEvent> {
        self.tilt.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Everything pending for this frame: the flap (if any) first, then the tilt.
    pub fn drain(&self) -> ArrayVec<InputEvent, 2> {
        let mut events = ArrayVec::new();
        if self.take_flap() {
            events.push(InputEvent::Flap);
        }
        if let Some(tilt) = self.take_tilt() {
            events.push(InputEvent::Tilt(tilt));
        }
        events
    }

    /// Events replaced before a frame consumed them.
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}
