//! Wavy Bird input layer (workspace facade crate).
//!
//! This package exposes `wavy_bird::{device,input,types}` as one API while the
//! implementation lives in dedicated crates under `crates/`. The front-end
//! pieces shared by the binary and the integration tests live here:
//! [`frame`] (per-frame input consumption), [`cli`] and [`view`].

pub mod cli;
pub mod frame;
pub mod view;

pub use wavy_bird_device as device;
pub use wavy_bird_input as input;
pub use wavy_bird_types as types;
