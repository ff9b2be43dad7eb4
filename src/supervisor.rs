//! Supervisor event source
//!
//! A turn talks to the multi-agent supervisor through [`EventSource`]: one
//! streaming call yielding [`AgentEvent`]s, and one blocking call used for
//! the fallback answer. Both calls in a turn share one [`RunConfig`].

mod checkpoint;
mod error;
mod event;
mod http;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore};
pub use error::SourceError;
pub use event::{AgentEvent, RawEvent};
pub use http::HttpSupervisor;

pub(crate) use event::content_text;

use crate::images::{inline_reference, ImageStore};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{json, Value};

pub type EventStream = BoxStream<'static, Result<AgentEvent, SourceError>>;

/// The user's side of a turn as sent to the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnInput {
    pub question: String,
    /// Image reference, already inlined as a `data:` URL when local
    pub image: Option<String>,
}

impl TurnInput {
    pub async fn prepare(question: &str, image: Option<&str>, images: &dyn ImageStore) -> Self {
        let image = match image {
            Some(reference) => Some(inline_reference(images, reference).await),
            None => None,
        };
        Self {
            question: question.to_string(),
            image,
        }
    }

    /// Human message: plain text, or text plus an image part when attached
    pub fn human_message(&self) -> Value {
        let content = match &self.image {
            Some(url) => json!([
                {"type": "text", "text": self.question},
                {"type": "image_url", "image_url": {"url": url, "detail": "auto"}},
            ]),
            None => json!(self.question),
        };
        json!({"role": "user", "content": content})
    }
}

/// Per-turn run configuration: the thread plus the checkpoint snapshot taken
/// when the turn started
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub thread_id: String,
    pub checkpoint: Option<Value>,
}

impl RunConfig {
    pub async fn load(thread_id: &str, checkpoints: &dyn CheckpointStore) -> Result<Self, SourceError> {
        let checkpoint = checkpoints
            .load(thread_id)
            .await
            .map_err(SourceError::checkpoint)?;
        Ok(Self {
            thread_id: thread_id.to_string(),
            checkpoint,
        })
    }
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Start a streaming run
    async fn stream(&self, input: &TurnInput, config: &RunConfig) -> Result<EventStream, SourceError>;

    /// Run to completion and return the final message text
    async fn invoke(&self, input: &TurnInput, config: &RunConfig) -> Result<String, SourceError>;
}
