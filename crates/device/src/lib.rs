//! Device module - accelerometer input over a serial line
//!
//! This crate turns the byte stream of the wave/tilt accelerometer into
//! discrete game events. It is organised bottom-up:
//!
//! - [`line_reader`]: streaming UTF-8 decode + newline framing, tolerant of
//!   reads that split lines (or characters) anywhere
//! - [`protocol`]: the tagged line grammar (`WAVE`, `TILT_<DIR>:<vel>:<angle>`,
//!   status text) and the outbound calibration command
//! - [`transport`]: how a port is picked and opened (real serial port,
//!   capture replay, scripted streams)
//! - [`link`]: the connection state machine, the read loop and the callbacks
//!   the front end observes it through
//! - [`wire_log`]: optional JSON-lines capture of device traffic
//!
//! # Protocol
//!
//! ```text
//! device -> host   WAVE\n
//! device -> host   TILT_LEFT:30:-12.5\n
//! device -> host   Rest position: 0.01, 0.98\n
//! host -> device   0            (calibrate)
//! ```
//!
//! # Environment Variables
//!
//! - `WAVY_SERIAL_PORT`: serial port path (default: first enumerated port)
//! - `WAVY_SERIAL_BAUD`: baud rate (default: 115200)
//! - `WAVY_SERIAL_DISABLED`: set to "1" or "true" to disable device input
//! - `WAVY_SERIAL_LOG_PATH`: append device traffic as JSON lines
//!
//! # Example
//!
//! ```no_run
//! use wavy_bird_device::{DeviceLink, LinkCallbacks, LinkConfig, SerialPortProvider};
//!
//! # async fn run() {
//! let config = LinkConfig::from_env();
//! let provider = SerialPortProvider::new(config.port.clone());
//! let callbacks = LinkCallbacks::new().on_line(|line| println!("{line:?}"));
//! let link = DeviceLink::new(config, provider, callbacks);
//! if link.connect().await.is_ok() {
//!     let _ = link.calibrate().await;
//! }
//! # }
//! ```

pub mod error;
pub mod line_reader;
pub mod link;
pub mod protocol;
pub mod transport;
pub mod wire_log;

pub use wavy_bird_types as types;

pub use error::LinkError;
pub use line_reader::LineReader;
pub use link::{DeviceLink, LinkCallbacks, LinkConfig};
pub use protocol::{current_timestamp_ms, parse_line, DeviceCommand, DeviceLine, StatusKind};
pub use transport::{
    list_ports, BoxTransport, OpenedPort, PortProvider, PortSummary, ReplayPortProvider,
    ScriptedPortProvider, SerialPortProvider, SerialStream, Transport,
};
pub use wire_log::{WireDirection, WireLog, WireRecord};
