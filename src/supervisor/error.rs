//! Supervisor client error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SourceError {
    pub kind: SourceErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Connection or transport failure
    Network,
    /// Non-success HTTP status
    Status,
    /// Response could not be understood
    Protocol,
    /// The supervisor reported a failure inside the run
    Remote,
    /// Checkpoint storage failed before the run started
    Checkpoint,
}

impl SourceError {
    pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Network, message)
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self::new(
            SourceErrorKind::Status,
            format!("supervisor returned HTTP {status}: {}", body.trim()),
        )
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Protocol, message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Remote, message)
    }

    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Checkpoint, message)
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::protocol(e.to_string())
        } else {
            Self::network(e.to_string())
        }
    }
}
