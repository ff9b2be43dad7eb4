//! Live channel carrying a turn's progress to the HTTP response
//!
//! Records are encoded as newline-terminated text lines. Tokens are written
//! raw, so the client concatenates every non-tagged fragment into the answer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

pub const STEP_TAG: &str = "[STEP]";
pub const OBSERVATION_TAG: &str = "[OBS]";
pub const DONE_SENTINEL: &str = "[DONE]";
pub const ERROR_PREFIX: &str = "Error:";

/// How long a send waits on a full channel before the reader counts as gone
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// One unit of live output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveRecord {
    Step(String),
    Observation(String),
    Token(String),
    /// Emitted only after the turn has been committed
    Done,
    Error(String),
}

impl LiveRecord {
    pub fn encode(&self) -> String {
        match self {
            LiveRecord::Step(text) => format!("{STEP_TAG} {text}\n"),
            LiveRecord::Observation(text) => format!("{OBSERVATION_TAG} {text}\n"),
            LiveRecord::Token(text) => text.clone(),
            LiveRecord::Done => format!("{DONE_SENTINEL}\n"),
            LiveRecord::Error(message) => format!("{ERROR_PREFIX} {message}"),
        }
    }
}

/// Sending half of the live channel.
///
/// A send to a disconnected client is dropped; the turn keeps running so the
/// commit still happens. A client that stops reading is treated the same way
/// once a send has waited `send_timeout` on a full channel.
#[derive(Clone)]
pub struct LiveChannel {
    tx: mpsc::Sender<LiveRecord>,
    send_timeout: Duration,
    stalled: Arc<AtomicBool>,
}

impl LiveChannel {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LiveRecord>) {
        Self::with_send_timeout(capacity, DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_send_timeout(
        capacity: usize,
        send_timeout: Duration,
    ) -> (Self, mpsc::Receiver<LiveRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        let channel = Self {
            tx,
            send_timeout,
            stalled: Arc::new(AtomicBool::new(false)),
        };
        (channel, rx)
    }

    pub async fn send(&self, record: LiveRecord) {
        if self.stalled.load(Ordering::Relaxed) {
            return;
        }
        match self.tx.send_timeout(record, self.send_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Closed(_)) => {
                tracing::trace!("Live channel closed, record dropped");
            }
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!("Live channel reader stalled, dropping further records");
                self.stalled.store(true, Ordering::Relaxed);
            }
        }
    }
}
