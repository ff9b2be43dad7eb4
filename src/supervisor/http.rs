//! HTTP client for a remote supervisor graph
//!
//! Streaming runs are consumed as server-sent events. Each SSE record's
//! `event` field selects how its data is handled: `checkpoint` updates the
//! stored conversation state, `error` aborts the turn, `end` is ignored, and
//! everything else must be a raw `{event, name, data}` supervisor event.

use super::{
    content_text, AgentEvent, CheckpointStore, EventSource, EventStream, RawEvent, RunConfig,
    SourceError, TurnInput,
};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Final state returned by a blocking run
#[derive(Debug, Deserialize)]
struct RunResult {
    #[serde(default)]
    messages: Vec<Value>,
    #[serde(default)]
    checkpoint: Option<Value>,
}

pub struct HttpSupervisor {
    client: Client,
    base_url: String,
    assistant_id: String,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl HttpSupervisor {
    pub fn new(
        base_url: &str,
        assistant_id: &str,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self, SourceError> {
        // No overall timeout: a streaming run lasts as long as the graph does
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            assistant_id: assistant_id.to_string(),
            checkpoints,
        })
    }

    fn run_url(&self, thread_id: &str, action: &str) -> String {
        format!("{}/threads/{thread_id}/runs/{action}", self.base_url)
    }

    fn run_body(&self, input: &TurnInput, config: &RunConfig) -> Value {
        json!({
            "assistant_id": self.assistant_id,
            "input": { "messages": [input.human_message()] },
            "checkpoint": config.checkpoint,
        })
    }
}

async fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SourceError::status(status.as_u16(), &body))
}

async fn store_checkpoint(checkpoints: &dyn CheckpointStore, thread_id: &str, state: &Value) {
    if let Err(e) = checkpoints.save(thread_id, state).await {
        tracing::warn!(thread_id = %thread_id, error = %e, "Failed to store checkpoint");
    }
}

/// Interpret one SSE record. `None` means the record produces no event.
///
/// Checkpoint records are stored as soon as they arrive. They track the
/// supervisor's own graph state and are not rolled back when the turn later
/// fails to stream or commit.
async fn interpret_record(
    kind: &str,
    data: &str,
    checkpoints: &dyn CheckpointStore,
    thread_id: &str,
) -> Option<Result<AgentEvent, SourceError>> {
    match kind {
        "checkpoint" => {
            match serde_json::from_str::<Value>(data) {
                Ok(mut value) => {
                    let state = value.get_mut("checkpoint").map_or(Value::Null, Value::take);
                    store_checkpoint(checkpoints, thread_id, &state).await;
                }
                Err(e) => tracing::warn!(error = %e, "Malformed checkpoint record"),
            }
            None
        }
        "error" => Some(Err(SourceError::remote(data))),
        "end" => None,
        _ => match serde_json::from_str::<RawEvent>(data) {
            Ok(raw) => raw.classify().map(Ok),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping unparseable supervisor event");
                None
            }
        },
    }
}

#[async_trait]
impl EventSource for HttpSupervisor {
    async fn stream(&self, input: &TurnInput, config: &RunConfig) -> Result<EventStream, SourceError> {
        tracing::debug!(thread_id = %config.thread_id, "Opening supervisor stream");
        let response = self
            .client
            .post(self.run_url(&config.thread_id, "stream"))
            .header(ACCEPT, "text/event-stream")
            .json(&self.run_body(input, config))
            .send()
            .await?;
        let response = check_status(response).await?;

        let checkpoints = Arc::clone(&self.checkpoints);
        let thread_id = config.thread_id.clone();
        let events = response.bytes_stream().eventsource().filter_map(move |record| {
            let checkpoints = Arc::clone(&checkpoints);
            let thread_id = thread_id.clone();
            async move {
                match record {
                    Ok(record) => {
                        interpret_record(&record.event, &record.data, checkpoints.as_ref(), &thread_id)
                            .await
                    }
                    Err(e) => Some(Err(SourceError::network(e.to_string()))),
                }
            }
        });

        Ok(Box::pin(events))
    }

    async fn invoke(&self, input: &TurnInput, config: &RunConfig) -> Result<String, SourceError> {
        tracing::debug!(thread_id = %config.thread_id, "Invoking supervisor");
        let response = self
            .client
            .post(self.run_url(&config.thread_id, "wait"))
            .json(&self.run_body(input, config))
            .send()
            .await?;
        let result: RunResult = check_status(response).await?.json().await?;

        if let Some(state) = &result.checkpoint {
            store_checkpoint(self.checkpoints.as_ref(), &config.thread_id, state).await;
        }

        result
            .messages
            .last()
            .map(|message| content_text(message).unwrap_or_default())
            .ok_or_else(|| SourceError::protocol("supervisor run returned no messages"))
    }
}
