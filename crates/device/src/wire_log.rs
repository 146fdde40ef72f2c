//! Optional JSON-lines capture of device traffic.
//!
//! Enabled with `WAVY_SERIAL_LOG_PATH`. Records are handed to a background
//! task over a bounded channel so the read loop never waits on disk; when
//! the writer falls behind, records are dropped and counted.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::protocol::current_timestamp_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireDirection {
    Rx,
    Tx,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireRecord {
    pub ts: u64,
    pub dir: WireDirection,
    pub line: String,
}

const WIRE_LOG_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct WireLog {
    tx: mpsc::Sender<WireRecord>,
    dropped: Arc<AtomicU64>,
}

impl WireLog {
    /// Start the writer task. Must be called from within a Tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(path, WIRE_LOG_CAPACITY)
    }

    pub fn with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let (tx, mut rx) = mpsc::channel::<WireRecord>(capacity.max(1));

        tokio::spawn(async move {
            use tokio::fs::OpenOptions;
            use tokio::io::AsyncWriteExt;

            let mut file = match OpenOptions::new().create(true).append(true).open(&path).await {
                Ok(f) => f,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "wire log disabled");
                    return;
                }
            };

            let mut buf: Vec<u8> = Vec::with_capacity(256);
            while let Some(rec) = rx.recv().await {
                buf.clear();
                if serde_json::to_writer(&mut buf, &rec).is_err() {
                    continue;
                }
                buf.push(b'\n');
                if file.write_all(&buf).await.is_err() {
                    break;
                }
            }

            let _ = file.flush().await;
        });

        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records lost because the writer task fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn received(&self, line: &str) {
        self.record(WireDirection::Rx, line.to_string());
    }

    pub fn sent(&self, bytes: &[u8]) {
        self.record(WireDirection::Tx, String::from_utf8_lossy(bytes).into_owned());
    }

    fn record(&self, dir: WireDirection, line: String) {
        let rec = WireRecord {
            ts: current_timestamp_ms(),
            dir,
            line,
        };
        match self.tx.try_send(rec) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                if self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                    warn!("wire log falling behind, dropping records");
                }
            }
        }
    }
}
