//! Byte-stream transports for the device link.
//!
//! A [`PortProvider`] performs the "pick a port, open it at a baud rate" step
//! and hands back an async duplex stream. The link never cares what is behind
//! the stream:
//!
//! - [`SerialPortProvider`]: a real serial device through the `serialport` crate
//! - [`ReplayPortProvider`]: a captured session replayed from a file
//! - [`ScriptedPortProvider`]: pre-built streams (in-memory pipes, mocks) in order

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use serialport::{SerialPort, SerialPortType};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;
use tracing::{debug, warn};

use crate::error::LinkError;

/// Anything the link can read device output from and write commands to.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

pub type BoxTransport = Box<dyn Transport>;

/// An opened transport together with a display name for logs and the UI.
pub struct OpenedPort {
    pub name: String,
    pub stream: BoxTransport,
}

impl OpenedPort {
    pub fn new(name: impl Into<String>, stream: impl Transport + 'static) -> Self {
        Self {
            name: name.into(),
            stream: Box::new(stream),
        }
    }
}

impl std::fmt::Debug for OpenedPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedPort").field("name", &self.name).finish()
    }
}

/// Acquires and opens a transport.
pub trait PortProvider: Send + Sync + 'static {
    fn open(&self, baud_rate: u32) -> BoxFuture<'_, Result<OpenedPort, LinkError>>;
}

/// Lets a caller keep a handle on a provider it gave to a link.
impl<P: PortProvider + ?Sized> PortProvider for std::sync::Arc<P> {
    fn open(&self, baud_rate: u32) -> BoxFuture<'_, Result<OpenedPort, LinkError>> {
        (**self).open(baud_rate)
    }
}

// ============== Serial ==============

const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(100);
const SERIAL_CHANNEL_DEPTH: usize = 64;
const SERIAL_WRITE_DEPTH: usize = 16;
const SERIAL_CHUNK: usize = 256;

/// Summary of an enumerated serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSummary {
    pub name: String,
    pub usb: bool,
    pub product: Option<String>,
}

/// List serial ports, USB adapters first.
pub fn list_ports() -> Result<Vec<PortSummary>, LinkError> {
    let ports = serialport::available_ports()
        .map_err(|e| LinkError::TransportUnsupported(e.to_string()))?;
    let mut out: Vec<PortSummary> = ports
        .into_iter()
        .map(|p| match p.port_type {
            SerialPortType::UsbPort(info) => PortSummary {
                name: p.port_name,
                usb: true,
                product: info.product,
            },
            _ => PortSummary {
                name: p.port_name,
                usb: false,
                product: None,
            },
        })
        .collect();
    out.sort_by_key(|p| !p.usb);
    Ok(out)
}

/// Opens a named serial port, or the first USB-looking one when no name is set.
#[derive(Debug, Clone, Default)]
pub struct SerialPortProvider {
    port: Option<String>,
}

impl SerialPortProvider {
    pub fn new(port: Option<String>) -> Self {
        Self { port }
    }

    fn select_port(&self) -> Result<String, LinkError> {
        if let Some(port) = &self.port {
            return Ok(port.clone());
        }
        list_ports()?
            .into_iter()
            .next()
            .map(|p| p.name)
            .ok_or(LinkError::NoPortSelected)
    }
}

impl PortProvider for SerialPortProvider {
    fn open(&self, baud_rate: u32) -> BoxFuture<'_, Result<OpenedPort, LinkError>> {
        Box::pin(async move {
            let name = self.select_port()?;
            debug!(port = %name, baud_rate, "opening serial port");

            let path = name.clone();
            let opened = tokio::task::spawn_blocking(move || {
                serialport::new(path, baud_rate)
                    .timeout(SERIAL_READ_TIMEOUT)
                    .open()
            })
            .await
            .map_err(|e| LinkError::open(&name, io::Error::new(io::ErrorKind::Other, e)))?;

            let port = opened.map_err(|e| LinkError::open(&name, e.into()))?;
            let stream = SerialStream::spawn(port).map_err(|e| LinkError::open(&name, e))?;
            Ok(OpenedPort::new(name, stream))
        })
    }
}

/// Async adapter over a blocking serial handle.
///
/// Two dedicated threads own the blocking calls. The reader forwards chunks
/// and exits on device EOF, on a read error, or once this stream is dropped.
/// The writer drains queued commands and exits when the queue closes.
pub struct SerialStream {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    chunk: Vec<u8>,
    pos: usize,
    writes: PollSender<Vec<u8>>,
}

impl SerialStream {
    pub fn spawn(port: Box<dyn SerialPort>) -> io::Result<Self> {
        let reader = port.try_clone().map_err(io::Error::from)?;
        Self::from_blocking(reader, port)
    }

    /// Bridge a blocking reader/writer pair. The reader should time out
    /// periodically so its thread notices when the stream goes away.
    pub fn from_blocking<R, W>(reader: R, writer: W) -> io::Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SERIAL_CHANNEL_DEPTH);
        std::thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || serial_reader_thread(reader, tx))?;

        let (write_tx, write_rx) = mpsc::channel(SERIAL_WRITE_DEPTH);
        std::thread::Builder::new()
            .name("serial-writer".to_string())
            .spawn(move || serial_writer_thread(writer, write_rx))?;

        Ok(Self {
            rx,
            chunk: Vec::new(),
            pos: 0,
            writes: PollSender::new(write_tx),
        })
    }
}

fn serial_writer_thread(mut port: impl Write, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(bytes) = rx.blocking_recv() {
        if let Err(e) = port.write_all(&bytes).and_then(|()| port.flush()) {
            warn!(error = %e, "serial write failed");
            break;
        }
    }
    debug!("serial writer thread exiting");
}

fn writer_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "serial writer stopped")
}

fn serial_reader_thread(mut port: impl Read, tx: mpsc::Sender<io::Result<Vec<u8>>>) {
    let mut buf = [0u8; SERIAL_CHUNK];
    loop {
        if tx.is_closed() {
            break;
        }
        match port.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }
    debug!("serial reader thread exiting");
}

impl AsyncRead for SerialStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.pos < this.chunk.len() {
                let n = buf.remaining().min(this.chunk.len() - this.pos);
                buf.put_slice(&this.chunk[this.pos..this.pos + n]);
                this.pos += n;
                return Poll::Ready(Ok(()));
            }
            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => {
                    this.chunk = chunk;
                    this.pos = 0;
                }
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}

impl AsyncWrite for SerialStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if ready!(this.writes.poll_reserve(cx)).is_err() {
            return Poll::Ready(Err(writer_gone()));
        }
        match this.writes.send_item(buf.to_vec()) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(writer_gone())),
        }
    }

    /// The writer thread flushes after every command.
    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.writes.is_closed() {
            return Poll::Ready(Err(writer_gone()));
        }
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Closing the channels stops both threads; the reader at its next timeout.
        let this = self.get_mut();
        this.writes.close();
        this.rx.close();
        Poll::Ready(Ok(()))
    }
}

// ============== Replay ==============

/// Opens a captured device session (raw bytes as sent by the firmware).
///
/// Commands written while replaying are discarded.
#[derive(Debug, Clone)]
pub struct ReplayPortProvider {
    path: PathBuf,
}

impl ReplayPortProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PortProvider for ReplayPortProvider {
    fn open(&self, _baud_rate: u32) -> BoxFuture<'_, Result<OpenedPort, LinkError>> {
        Box::pin(async move {
            let name = self.path.display().to_string();
            let file = tokio::fs::File::open(&self.path)
                .await
                .map_err(|e| LinkError::open(&name, e))?;
            let stream = tokio::io::join(file, tokio::io::sink());
            Ok(OpenedPort::new(name, stream))
        })
    }
}

// ============== Scripted ==============

/// Hands out pre-built open results in order; an exhausted script reports
/// [`LinkError::NoPortSelected`].
#[derive(Default)]
pub struct ScriptedPortProvider {
    script: Mutex<VecDeque<Result<OpenedPort, LinkError>>>,
}

impl ScriptedPortProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(self, name: &str, stream: impl Transport + 'static) -> Self {
        self.push(Ok(OpenedPort::new(name, stream)));
        self
    }

    pub fn with_error(self, err: LinkError) -> Self {
        self.push(Err(err));
        self
    }

    pub fn push(&self, result: Result<OpenedPort, LinkError>) {
        match self.script.lock() {
            Ok(mut script) => script.push_back(result),
            Err(_) => warn!("scripted port provider poisoned"),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl PortProvider for ScriptedPortProvider {
    fn open(&self, _baud_rate: u32) -> BoxFuture<'_, Result<OpenedPort, LinkError>> {
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());
        Box::pin(async move { next.unwrap_or(Err(LinkError::NoPortSelected)) })
    }
}
