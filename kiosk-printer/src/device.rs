//! Device transports for sending ESC/POS data and reading status replies
//!
//! Supports:
//! - Network printers (raw TCP, usually port 9100)
//! - Character devices (`/dev/usb/lp0` from the usblp driver)
//!
//! Every write, flush and close runs under the transport's I/O timeout. A
//! printer that stops draining its buffer fails the call with
//! [`PrintError::Timeout`] and the handle is dropped, so the caller can
//! finalize and release the printer.

use crate::error::{PrintError, PrintResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument, warn};

/// Largest status reply we expect
const READ_BUF: usize = 16;

/// I/O timeout when the caller does not pick one
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Hardware I/O collaborator
///
/// Every status query and print job goes open → write/read → close.
/// Absent hardware surfaces as [`PrintError::NotFound`], a stalled device as
/// [`PrintError::Timeout`].
#[async_trait]
pub trait DeviceIo: Send + Sync {
    /// Human-readable address for logs
    fn describe(&self) -> String;

    async fn open(&mut self) -> PrintResult<()>;

    /// Release the device. Closing a closed device is a no-op.
    async fn close(&mut self) -> PrintResult<()>;

    async fn write(&mut self, data: &[u8]) -> PrintResult<()>;

    /// Read whatever reply is available. No reply before `timeout` yields an
    /// empty buffer.
    async fn read(&mut self, timeout: Duration) -> PrintResult<Vec<u8>>;
}

/// Where a printer lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAddress {
    /// `tcp://host:port`
    Tcp(String),
    /// Character device path
    Char(PathBuf),
}

impl DeviceAddress {
    pub fn parse(s: &str) -> PrintResult<Self> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix("tcp://") {
            if rest.is_empty() {
                return Err(PrintError::InvalidConfig(format!("Invalid address: {s}")));
            }
            let addr = if rest.contains(':') {
                rest.to_string()
            } else {
                format!("{rest}:9100")
            };
            return Ok(DeviceAddress::Tcp(addr));
        }
        if s.starts_with('/') {
            return Ok(DeviceAddress::Char(PathBuf::from(s)));
        }
        Err(PrintError::InvalidConfig(format!("Invalid address: {s}")))
    }

    /// Build the transport for this address. `io_timeout` bounds every
    /// write, flush and close.
    pub fn connect(&self, io_timeout: Duration) -> Box<dyn DeviceIo> {
        match self {
            DeviceAddress::Tcp(addr) => {
                Box::new(TcpDevice::new(addr.clone()).with_io_timeout(io_timeout))
            }
            DeviceAddress::Char(path) => {
                Box::new(CharDevice::new(path.clone()).with_io_timeout(io_timeout))
            }
        }
    }
}

fn stalled(op: &str, target: &str, limit: Duration) -> PrintError {
    PrintError::Timeout(format!("{op} on {target} made no progress in {limit:?}"))
}

/// Network printer (raw TCP)
#[derive(Debug)]
pub struct TcpDevice {
    addr: String,
    timeout: Duration,
    io_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpDevice {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: Duration::from_secs(5),
            io_timeout: DEFAULT_IO_TIMEOUT,
            stream: None,
        }
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the write/flush/close timeout
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    fn stream(&mut self) -> PrintResult<&mut TcpStream> {
        let addr = &self.addr;
        self.stream
            .as_mut()
            .ok_or_else(|| PrintError::NotOpen(addr.clone()))
    }
}

#[async_trait]
impl DeviceIo for TcpDevice {
    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    #[instrument(skip(self), fields(addr = %self.addr))]
    async fn open(&mut self) -> PrintResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| PrintError::NotFound(format!("connection timeout: {}", self.addr)))?
            .map_err(|e| match e.kind() {
                ErrorKind::ConnectionRefused
                | ErrorKind::HostUnreachable
                | ErrorKind::NetworkUnreachable
                | ErrorKind::AddrNotAvailable => {
                    PrintError::NotFound(format!("{}: {}", self.addr, e))
                }
                _ => PrintError::Connection(format!("{}: {}", self.addr, e)),
            })?;
        debug!("connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) -> PrintResult<()> {
        if let Some(mut stream) = self.stream.take() {
            // Peer may already be gone, or stuck; either way the socket is dropped
            if tokio::time::timeout(self.io_timeout, stream.shutdown())
                .await
                .is_err()
            {
                warn!(addr = %self.addr, "shutdown stalled, dropping connection");
            }
        }
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let limit = self.io_timeout;
        let stream = self.stream()?;
        let sent = tokio::time::timeout(limit, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await;
        match sent {
            Ok(result) => result.map_err(PrintError::from),
            Err(_) => {
                // Unknown how much of `data` went out
                self.stream = None;
                Err(stalled("write", &self.describe(), limit))
            }
        }
    }

    async fn read(&mut self, timeout: Duration) -> PrintResult<Vec<u8>> {
        let stream = self.stream()?;
        let mut buf = [0u8; READ_BUF];
        match tokio::time::timeout(timeout, stream.read(&mut buf)).await {
            Ok(Ok(n)) => Ok(buf[..n].to_vec()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(Vec::new()),
        }
    }
}

/// USB printer exposed as a character device
///
/// `tokio::fs::File` runs each call on the blocking pool. A call that times
/// out keeps running there, so the handle is dropped rather than reused.
#[derive(Debug)]
pub struct CharDevice {
    path: PathBuf,
    io_timeout: Duration,
    file: Option<File>,
}

impl CharDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            file: None,
        }
    }

    /// Set the open/write/flush/close timeout
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    fn file(&mut self) -> PrintResult<&mut File> {
        let path = &self.path;
        self.file
            .as_mut()
            .ok_or_else(|| PrintError::NotOpen(path.display().to_string()))
    }
}

/// ENXIO / ENODEV: node exists but nothing is attached
fn is_absent(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::NotFound || matches!(e.raw_os_error(), Some(6) | Some(19))
}

fn device_error(e: std::io::Error) -> PrintError {
    if is_absent(&e) {
        PrintError::NotFound(e.to_string())
    } else {
        PrintError::Io(e)
    }
}

#[async_trait]
impl DeviceIo for CharDevice {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn open(&mut self) -> PrintResult<()> {
        if self.file.is_some() {
            return Ok(());
        }
        let mut options = tokio::fs::OpenOptions::new();
        options.read(true).write(true);
        let opening = options.open(&self.path);
        let file = tokio::time::timeout(self.io_timeout, opening)
            .await
            .map_err(|_| stalled("open", &self.describe(), self.io_timeout))?
            .map_err(|e| {
                if is_absent(&e) {
                    PrintError::NotFound(format!("{}: {}", self.path.display(), e))
                } else {
                    PrintError::Io(e)
                }
            })?;
        self.file = Some(file);
        Ok(())
    }

    async fn close(&mut self) -> PrintResult<()> {
        if let Some(mut file) = self.file.take()
            && tokio::time::timeout(self.io_timeout, file.flush())
                .await
                .is_err()
        {
            warn!(path = %self.path.display(), "flush on close stalled, dropping handle");
        }
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let limit = self.io_timeout;
        let file = self.file()?;
        let sent = tokio::time::timeout(limit, async {
            file.write_all(data).await?;
            file.flush().await
        })
        .await;
        match sent {
            Ok(result) => result.map_err(device_error),
            Err(_) => {
                self.file = None;
                Err(stalled("write", &self.describe(), limit))
            }
        }
    }

    async fn read(&mut self, timeout: Duration) -> PrintResult<Vec<u8>> {
        let file = self.file()?;
        let mut buf = [0u8; READ_BUF];
        match tokio::time::timeout(timeout, file.read(&mut buf)).await {
            Ok(Ok(n)) => Ok(buf[..n].to_vec()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                // The blocking read is still pending; a later flush would wait on it
                self.file = None;
                Ok(Vec::new())
            }
        }
    }
}
