//! Byte transport between the host and the gauge.
//!
//! The [`Transport`] trait is the seam between the gauge client and the physical
//! link. [`SerialTransport`] drives a real RS-485/RS-232 adapter (or any async
//! byte stream, which is how the tests use `tokio::io::duplex`), and
//! [`MockTransport`] replays scripted replies without any I/O.
//!
//! A transport owns exactly one request/response exchange at a time; the client
//! holds it by `&mut`, so interleaving two commands on one link is impossible.

mod mock;
mod serial;

pub use mock::{MockLog, MockReply, MockTransport};
pub use serial::SerialTransport;

use crate::error::AppResult;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

/// How a response frame is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Frame ends at this byte; the terminator is stripped from the result.
    Terminated(u8),
    /// Frame is exactly this many bytes.
    FixedLength(usize),
}

/// Anything that behaves like an open serial port.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased serial stream.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Request/response byte link to one gauge.
#[async_trait]
pub trait Transport: Send {
    /// Write one complete command frame.
    ///
    /// Blocks (asynchronously) until at least `min_delay` has passed since the
    /// previous send, and discards any stale unread input first.
    async fn send(&mut self, frame: &[u8]) -> AppResult<()>;

    /// Read one response frame, waiting at most `timeout`.
    async fn receive(&mut self, framing: Framing, timeout: Duration) -> AppResult<Vec<u8>>;

    /// Release the link. Further use fails.
    async fn close(&mut self) -> AppResult<()>;
}

/// Enforces the minimum spacing between consecutive sends.
#[derive(Debug, Clone)]
pub struct SendPacer {
    min_delay: Duration,
    last_send: Option<Instant>,
}

impl SendPacer {
    /// Pacer allowing one send per `min_delay`.
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_send: None,
        }
    }

    /// Sleep until the next send is allowed.
    pub async fn wait_turn(&self) {
        if let Some(last) = self.last_send {
            tokio::time::sleep_until(last + self.min_delay).await;
        }
    }

    /// Record that a send just happened.
    pub fn mark_sent(&mut self) {
        self.last_send = Some(Instant::now());
    }
}
