//! Device link: connection lifecycle over a [`PortProvider`].
//!
//! ```text
//!            connect()                 open ok
//! Disconnected ───────▶ Connecting ─────────────▶ Connected
//!      ▲                    │ open failed             │ EOF / read error / disconnect()
//!      │                    ▼                         │
//!      └─── disconnect() ─ Error ◀─ (no auto-retry)   │
//!      └──────────────────────────────────────────────┘
//! ```
//!
//! One read loop runs per session as a tokio task. It feeds the
//! [`LineReader`], classifies every line and reports it through the
//! `on_line` callback. Every way out of the loop ends in the same release
//! path: cancel, close the transport (close errors are swallowed), drop the
//! session, go to `Disconnected`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::LinkError;
use crate::line_reader::LineReader;
use crate::protocol::{parse_line, DeviceCommand, DeviceLine};
use crate::transport::{BoxTransport, PortProvider};
use crate::types::{ConnectionState, DEFAULT_BAUD_RATE};
use crate::wire_log::WireLog;

const DEFAULT_READ_BUFFER: usize = 256;

/// Link configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Serial port path; `None` picks the first enumerated port.
    pub port: Option<String>,
    pub baud_rate: u32,
    pub read_buffer_size: usize,
    pub wire_log_path: Option<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_buffer_size: DEFAULT_READ_BUFFER,
            wire_log_path: None,
        }
    }
}

impl LinkConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        use std::env;

        let non_empty = |key: &str| {
            env::var(key)
                .ok()
                .map(|s| s.trim().to_string())
                .and_then(|s| if s.is_empty() { None } else { Some(s) })
        };

        let baud_rate = env::var("WAVY_SERIAL_BAUD")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_BAUD_RATE);

        Self {
            port: non_empty("WAVY_SERIAL_PORT"),
            baud_rate,
            read_buffer_size: DEFAULT_READ_BUFFER,
            wire_log_path: non_empty("WAVY_SERIAL_LOG_PATH"),
        }
    }

    /// Check if device input is disabled via environment
    pub fn is_disabled() -> bool {
        std::env::var("WAVY_SERIAL_DISABLED")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false)
    }
}

type Notify = Box<dyn Fn() + Send + Sync>;
type StateHook = Box<dyn Fn(ConnectionState) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&LinkError) + Send + Sync>;
type LineHook = Box<dyn Fn(&DeviceLine) + Send + Sync>;

/// Observers of the link. All hooks run on tokio worker threads and must
/// not block.
#[derive(Default)]
pub struct LinkCallbacks {
    on_open: Option<Notify>,
    on_close: Option<Notify>,
    on_error: Option<ErrorHook>,
    on_line: Option<LineHook>,
    on_state: Option<StateHook>,
}

impl LinkCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_open(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Box::new(f));
        self
    }

    pub fn on_close(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&LinkError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Every non-blank line, classified.
    pub fn on_line(mut self, f: impl Fn(&DeviceLine) + Send + Sync + 'static) -> Self {
        self.on_line = Some(Box::new(f));
        self
    }

    /// Every state transition (old state differs from new).
    pub fn on_state(mut self, f: impl Fn(ConnectionState) + Send + Sync + 'static) -> Self {
        self.on_state = Some(Box::new(f));
        self
    }
}

struct Session {
    id: u64,
    port: String,
    /// Locked separately so a stalled write never holds up the session lock.
    writer: Arc<Mutex<WriteHalf<BoxTransport>>>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

struct Inner {
    config: LinkConfig,
    provider: Box<dyn PortProvider>,
    callbacks: LinkCallbacks,
    state_tx: watch::Sender<ConnectionState>,
    /// All state transitions happen while this lock is held.
    session: Mutex<Option<Session>>,
    /// Set while a `connect()` call (open or toggle) is running.
    connecting: AtomicBool,
    next_session_id: AtomicU64,
    last_error: std::sync::Mutex<Option<String>>,
    wire_log: Option<WireLog>,
}

/// Owns the connection to the accelerometer.
pub struct DeviceLink {
    inner: Arc<Inner>,
}

impl DeviceLink {
    /// Build an idle link. When a wire log path is configured this must run
    /// inside a Tokio runtime.
    pub fn new(config: LinkConfig, provider: impl PortProvider, callbacks: LinkCallbacks) -> Self {
        let wire_log = config.wire_log_path.as_deref().map(WireLog::spawn);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                provider: Box::new(provider),
                callbacks,
                state_tx,
                session: Mutex::new(None),
                connecting: AtomicBool::new(false),
                next_session_id: AtomicU64::new(1),
                last_error: std::sync::Mutex::new(None),
                wire_log,
            }),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Message of the most recent error, cleared by a successful connect.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Open the device, or close it when already connected.
    ///
    /// A call made while another `connect()` is still running is ignored.
    /// Open failures move the link to `Error`; nothing is retried.
    pub async fn connect(&self) -> Result<(), LinkError> {
        let Some(_claim) = ConnectClaim::acquire(&self.inner.connecting) else {
            debug!("connect ignored: connect already in flight");
            return Ok(());
        };
        let mut slot = self.inner.session.lock().await;

        if !self.state().can_connect() {
            if let Some(session) = slot.take() {
                debug!(port = %session.port, "connect while connected: disconnecting");
                self.inner.release(session, true).await;
            }
            return Ok(());
        }

        self.inner.transition(ConnectionState::Connecting);
        let baud_rate = self.inner.config.baud_rate;
        let opened = match self.inner.provider.open(baud_rate).await {
            Ok(opened) => opened,
            Err(err) => {
                error!(error = %err, kind = err.kind(), "device connect failed");
                self.inner.transition(ConnectionState::Error);
                self.inner.report_error(&err);
                return Err(err);
            }
        };

        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (reader, writer) = tokio::io::split(opened.stream);
        let cancel = CancellationToken::new();

        if let Ok(mut last) = self.inner.last_error.lock() {
            *last = None;
        }
        self.inner.transition(ConnectionState::Connected);
        info!(port = %opened.name, baud_rate, session = id, "device connected");
        if let Some(f) = &self.inner.callbacks.on_open {
            f();
        }

        let handle = tokio::spawn(read_loop(
            Arc::clone(&self.inner),
            id,
            reader,
            cancel.clone(),
        ));

        *slot = Some(Session {
            id,
            port: opened.name,
            writer: Arc::new(Mutex::new(writer)),
            cancel,
            reader: Some(handle),
        });
        Ok(())
    }

    /// Cancel the pending read, close the transport and go to `Disconnected`.
    ///
    /// Safe in any state; never reports an error.
    pub async fn disconnect(&self) {
        let mut slot = self.inner.session.lock().await;
        match slot.take() {
            Some(session) => self.inner.release(session, true).await,
            None => {
                if self.inner.transition(ConnectionState::Disconnected) {
                    if let Some(f) = &self.inner.callbacks.on_close {
                        f();
                    }
                }
            }
        }
    }

    /// Write raw bytes to the device. Fails with `NotConnected` without
    /// touching any transport unless the link is connected, and when the
    /// link is disconnected while the write is still pending.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let (writer, cancel, port) = {
            let slot = self.inner.session.lock().await;
            let Some(session) = slot.as_ref() else {
                debug!("send ignored: device not connected");
                return Err(LinkError::NotConnected);
            };
            (
                Arc::clone(&session.writer),
                session.cancel.clone(),
                session.port.clone(),
            )
        };

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(port = %port, "send interrupted by disconnect");
                return Err(LinkError::NotConnected);
            }
            r = async {
                let mut writer = writer.lock().await;
                writer.write_all(bytes).await?;
                writer.flush().await
            } => r,
        };

        match written {
            Ok(()) => {
                if let Some(log) = &self.inner.wire_log {
                    log.sent(bytes);
                }
                Ok(())
            }
            Err(e) => {
                let err = LinkError::WriteFailure(e);
                warn!(port = %port, error = %err, "device write failed");
                Err(err)
            }
        }
    }

    /// Ask the device to re-measure its rest position.
    pub async fn calibrate(&self) -> Result<(), LinkError> {
        self.send(DeviceCommand::Calibrate.as_bytes()).await?;
        info!("calibration command sent");
        Ok(())
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        // Stop the read loop; it holds its own reference to the shared state.
        if let Ok(slot) = self.inner.session.try_lock() {
            if let Some(session) = slot.as_ref() {
                session.cancel.cancel();
            }
        }
    }
}

impl Inner {
    /// Returns true when the state actually changed.
    fn transition(&self, next: ConnectionState) -> bool {
        let prev = self.state_tx.send_replace(next);
        if prev == next {
            return false;
        }
        debug!(from = prev.as_str(), to = next.as_str(), "device link state");
        if let Some(f) = &self.callbacks.on_state {
            f(next);
        }
        true
    }

    fn report_error(&self, err: &LinkError) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(err.to_string());
        }
        if let Some(f) = &self.callbacks.on_error {
            f(err);
        }
    }

    /// Caller holds the session lock and has already taken `session` out of it.
    async fn release(&self, mut session: Session, join_reader: bool) {
        session.cancel.cancel();

        {
            // A pending send sees the cancellation and lets go of the writer.
            let mut writer = session.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                let err = LinkError::CloseFailure(e);
                warn!(port = %session.port, error = %err, "ignoring close failure");
            }
        }

        if join_reader {
            if let Some(handle) = session.reader.take() {
                let _ = handle.await;
            }
        }

        if self.transition(ConnectionState::Disconnected) {
            if let Some(f) = &self.callbacks.on_close {
                f();
            }
        }
        let wire_log_dropped = self.wire_log.as_ref().map_or(0, WireLog::dropped);
        info!(
            port = %session.port,
            session = session.id,
            wire_log_dropped,
            "device disconnected"
        );
    }

    fn dispatch_line(&self, raw: &str) {
        let Some(line) = parse_line(raw) else {
            return;
        };

        if let Some(log) = &self.wire_log {
            log.received(raw.trim());
        }
        line.log();

        if let Some(f) = &self.callbacks.on_line {
            f(&line);
        }
    }

    /// Read loop exit after EOF or a read error.
    async fn finish_session(&self, id: u64, cancel: &CancellationToken) {
        let mut slot = tokio::select! {
            biased;
            // An explicit disconnect owns the teardown and is waiting for us.
            _ = cancel.cancelled() => return,
            guard = self.session.lock() => guard,
        };

        if slot.as_ref().map(|s| s.id) != Some(id) {
            return;
        }
        if let Some(session) = slot.take() {
            self.release(session, false).await;
        }
    }
}

/// Marks a running `connect()`; released on drop, including when the
/// caller abandons the future.
struct ConnectClaim<'a>(&'a AtomicBool);

impl<'a> ConnectClaim<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for ConnectClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum ReadEnd {
    Eof,
    Cancelled,
    Failed(std::io::Error),
}

async fn read_loop(
    inner: Arc<Inner>,
    id: u64,
    mut reader: ReadHalf<BoxTransport>,
    cancel: CancellationToken,
) {
    let mut lines = LineReader::new();
    let mut buf = vec![0u8; inner.config.read_buffer_size.max(1)];

    let end = loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break ReadEnd::Cancelled,
            r = reader.read(&mut buf) => r,
        };

        match read {
            Ok(0) => break ReadEnd::Eof,
            Ok(n) => {
                for raw in lines.feed(&buf[..n]) {
                    inner.dispatch_line(&raw);
                }
            }
            Err(e) => break ReadEnd::Failed(e),
        }
    };

    let dropped = lines.finish();
    if dropped > 0 {
        debug!(session = id, dropped, "discarding unterminated device output");
    }

    match end {
        ReadEnd::Cancelled => {
            debug!(session = id, "device read cancelled");
            return;
        }
        ReadEnd::Eof => info!(session = id, "device stream closed"),
        ReadEnd::Failed(e) => {
            let err = LinkError::ReadFailure(e);
            error!(session = id, error = %err, "device read failed");
            inner.report_error(&err);
        }
    }

    inner.finish_session(id, &cancel).await;
}
