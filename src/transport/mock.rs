//! Scripted transport for tests and dry runs.
//!
//! Replies come from, in order of precedence: a responder closure fed with the
//! last command, a FIFO script, and a fallback reply repeated forever. With none
//! of those left the mock stays silent and `receive` times out.

use super::{Framing, SendPacer, Transport};
use crate::error::{AppResult, GaugeError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// What the fake gauge does for one `receive`.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Deliver this frame (terminator already stripped).
    Frame(Vec<u8>),
    /// Say nothing; the receive times out after its full timeout.
    Silence,
    /// Fail the link with a transport error.
    Fail(String),
}

type Responder = Box<dyn FnMut(&[u8]) -> MockReply + Send>;

#[derive(Debug, Default)]
struct LogState {
    sent: Vec<(Instant, Vec<u8>)>,
    closed: bool,
}

/// Shared view of everything a [`MockTransport`] was asked to do.
///
/// Clone it before handing the transport to a client; the clone observes the
/// same log.
#[derive(Debug, Clone, Default)]
pub struct MockLog {
    state: Arc<Mutex<LogState>>,
}

impl MockLog {
    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every command frame written, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.iter().map(|(_, frame)| frame.clone()).collect()
    }

    /// When each command was written.
    pub fn send_times(&self) -> Vec<Instant> {
        self.lock().sent.iter().map(|(at, _)| *at).collect()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// In-memory [`Transport`] with scripted replies.
pub struct MockTransport {
    script: VecDeque<MockReply>,
    fallback: Option<MockReply>,
    responder: Option<Responder>,
    pending: Option<MockReply>,
    pacer: SendPacer,
    log: MockLog,
    closed: bool,
}

impl MockTransport {
    /// Reply to successive receives with `replies`, then stay silent.
    pub fn new(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            script: replies.into_iter().collect(),
            fallback: None,
            responder: None,
            pending: None,
            pacer: SendPacer::new(Duration::ZERO),
            log: MockLog::default(),
            closed: false,
        }
    }

    /// Reply to every receive with the same answer.
    pub fn always(reply: MockReply) -> Self {
        let mut mock = Self::new([]);
        mock.fallback = Some(reply);
        mock
    }

    /// Compute each reply from the command that was just sent.
    pub fn responding<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> MockReply + Send + 'static,
    {
        let mut mock = Self::new([]);
        mock.responder = Some(Box::new(responder));
        mock
    }

    /// Enforce a minimum spacing between sends, like the serial transport does.
    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.pacer = SendPacer::new(min_delay);
        self
    }

    /// Handle onto the shared send log.
    pub fn log(&self) -> MockLog {
        self.log.clone()
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.closed {
            Err(GaugeError::Transport("mock transport is closed".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: &[u8]) -> AppResult<()> {
        self.ensure_open()?;
        self.pacer.wait_turn().await;
        // Unread replies are stale once a new command goes out
        self.pending = self.responder.as_mut().map(|respond| respond(frame));
        self.log.lock().sent.push((Instant::now(), frame.to_vec()));
        self.pacer.mark_sent();
        Ok(())
    }

    async fn receive(&mut self, _framing: Framing, timeout: Duration) -> AppResult<Vec<u8>> {
        self.ensure_open()?;
        let reply = self
            .pending
            .take()
            .or_else(|| self.script.pop_front())
            .or_else(|| self.fallback.clone())
            .unwrap_or(MockReply::Silence);

        match reply {
            MockReply::Frame(frame) => Ok(frame),
            MockReply::Silence => {
                tokio::time::sleep(timeout).await;
                Err(GaugeError::Timeout(timeout))
            }
            MockReply::Fail(reason) => Err(GaugeError::Transport(reason)),
        }
    }

    async fn close(&mut self) -> AppResult<()> {
        self.closed = true;
        self.log.lock().closed = true;
        Ok(())
    }
}
