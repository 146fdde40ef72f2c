//! Device link errors.
//!
//! None of these are fatal to the game: the front end reports them and
//! keeps running on keyboard input.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    /// Serial access is not available on this platform/build.
    #[error("serial transport not supported: {0}")]
    TransportUnsupported(String),

    /// Port selection produced nothing (no device attached, selection dismissed).
    #[error("no serial port selected")]
    NoPortSelected,

    /// Permission denied, device busy, bad path.
    #[error("failed to open {port}: {source}")]
    OpenFailure {
        port: String,
        #[source]
        source: io::Error,
    },

    #[error("serial read failed: {0}")]
    ReadFailure(#[source] io::Error),

    #[error("serial write failed: {0}")]
    WriteFailure(#[source] io::Error),

    /// Best-effort teardown failure; logged and swallowed.
    #[error("serial close failed: {0}")]
    CloseFailure(#[source] io::Error),

    #[error("device not connected")]
    NotConnected,
}

impl LinkError {
    /// Short machine-friendly name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LinkError::TransportUnsupported(_) => "transport_unsupported",
            LinkError::NoPortSelected => "no_port_selected",
            LinkError::OpenFailure { .. } => "open_failure",
            LinkError::ReadFailure(_) => "read_failure",
            LinkError::WriteFailure(_) => "write_failure",
            LinkError::CloseFailure(_) => "close_failure",
            LinkError::NotConnected => "not_connected",
        }
    }

    pub fn open(port: impl Into<String>, source: io::Error) -> Self {
        LinkError::OpenFailure {
            port: port.into(),
            source,
        }
    }
}
