//! Chat turns
//!
//! A turn takes one question through the supervisor and ends with exactly
//! one committed user/assistant exchange, or with an error and nothing
//! written. Streaming turns run on their own task so a client disconnect
//! does not cancel the commit.

pub mod interpreter;
pub mod live;
pub mod marker;
pub mod notices;
pub mod steps;
pub mod tracker;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub mod testing;

pub use interpreter::TurnInterpreter;
pub use live::{LiveChannel, LiveRecord};
pub use notices::Notices;
pub use tracker::ResponderRegistry;

use crate::db::{Database, Message, NewMessage};
use crate::images::ImageStore;
use crate::supervisor::{CheckpointStore, EventSource, RunConfig, SourceError, TurnInput};
use async_trait::async_trait;
use futures::StreamExt;
use marker::{persist_payload, split_marker, strip_marker};
use steps::StepEntry;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("Failed to save conversation: {0}")]
    Commit(String),
}

/// Persistence for finished turns
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Write both messages of a turn atomically
    async fn commit_turn(
        &self,
        thread_id: &str,
        user: &NewMessage,
        assistant: &NewMessage,
    ) -> Result<(Message, Message), String>;
}

#[async_trait]
impl TurnStore for Database {
    async fn commit_turn(
        &self,
        thread_id: &str,
        user: &NewMessage,
        assistant: &NewMessage,
    ) -> Result<(Message, Message), String> {
        Database::commit_turn(self, thread_id, user, assistant).map_err(|e| e.to_string())
    }
}

/// Everything a turn needs, shared across requests
pub struct TurnServices {
    pub source: Arc<dyn EventSource>,
    pub images: Arc<dyn ImageStore>,
    pub store: Arc<dyn TurnStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub responders: ResponderRegistry,
    pub notices: Notices,
}

/// One question asked in a thread whose ownership was already checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub thread_id: String,
    pub question: String,
    /// Attachment reference exactly as the client sent it
    pub image: Option<String>,
}

/// The two messages written by a successful turn
#[derive(Debug, Clone)]
pub struct CommittedTurn {
    pub user: Message,
    pub assistant: Message,
}

async fn prepare(services: &TurnServices, turn: &Turn) -> Result<(TurnInput, RunConfig), TurnError> {
    let input = TurnInput::prepare(&turn.question, turn.image.as_deref(), services.images.as_ref()).await;
    let config = RunConfig::load(&turn.thread_id, services.checkpoints.as_ref()).await?;
    Ok((input, config))
}

async fn commit(
    services: &TurnServices,
    turn: &Turn,
    answer: String,
    steps: Vec<StepEntry>,
    image: Option<String>,
) -> Result<CommittedTurn, TurnError> {
    let user = NewMessage::user(turn.question.as_str(), turn.image.clone());
    let assistant = NewMessage::assistant(answer, steps, image);
    let (user, assistant) = services
        .store
        .commit_turn(&turn.thread_id, &user, &assistant)
        .await
        .map_err(TurnError::Commit)?;
    Ok(CommittedTurn { user, assistant })
}

/// Drive one streaming turn to its commit. The caller decides what to emit
/// on the live channel once this returns.
pub async fn run_turn(
    services: &TurnServices,
    turn: &Turn,
    live: &LiveChannel,
) -> Result<CommittedTurn, TurnError> {
    let mut interpreter = TurnInterpreter::new(
        &services.responders,
        &services.notices,
        services.images.as_ref(),
        live.clone(),
    );
    interpreter.open().await;

    let (input, config) = prepare(services, turn).await?;
    let mut events = services.source.stream(&input, &config).await?;
    while let Some(event) = events.next().await {
        interpreter.handle(event?).await;
    }
    drop(events);

    interpreter.finish(services.source.as_ref(), &input, &config).await?;
    let outcome = interpreter.into_outcome();
    tracing::debug!(
        thread_id = %turn.thread_id,
        steps = outcome.steps.len(),
        image = outcome.image.is_some(),
        fallback = outcome.used_fallback,
        "Turn interpreted"
    );

    commit(services, turn, outcome.answer, outcome.steps, outcome.image).await
}

/// Run a streaming turn on its own task. The live channel ends with the
/// done sentinel after a successful commit, or with an error record.
pub fn spawn_turn(services: Arc<TurnServices>, turn: Turn, live: LiveChannel) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(thread_id = %turn.thread_id, "Turn started");
        match run_turn(&services, &turn, &live).await {
            Ok(committed) => {
                tracing::info!(
                    thread_id = %turn.thread_id,
                    user_sequence_id = committed.user.sequence_id,
                    assistant_sequence_id = committed.assistant.sequence_id,
                    "Turn committed"
                );
                live.send(LiveRecord::Done).await;
            }
            Err(e) => {
                tracing::error!(thread_id = %turn.thread_id, error = %e, "Turn failed");
                live.send(LiveRecord::Error(e.to_string())).await;
            }
        }
    })
}

/// Non-streaming turn: one blocking supervisor call, no step log
pub async fn answer_once(services: &TurnServices, turn: &Turn) -> Result<CommittedTurn, TurnError> {
    let (input, config) = prepare(services, turn).await?;
    let answer = services.source.invoke(&input, &config).await?;

    let (answer, image) = match split_marker(&answer) {
        Some(split) => {
            let image = match persist_payload(services.images.as_ref(), split.payload).await {
                Ok(reference) => Some(reference),
                Err(e) => {
                    tracing::warn!(thread_id = %turn.thread_id, error = %e, "Failed to process generated image");
                    None
                }
            };
            (strip_marker(&answer).to_string(), image)
        }
        None => (answer, None),
    };

    commit(services, turn, answer, Vec::new(), image).await
}
