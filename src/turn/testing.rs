//! Test doubles for turn processing

use super::{LiveChannel, LiveRecord, Notices, ResponderRegistry, Turn, TurnServices, TurnStore};
use crate::db::{Message, NewMessage};
use crate::images::{ImageError, ImageStore};
use crate::supervisor::{
    AgentEvent, EventSource, EventStream, MemoryCheckpointStore, RunConfig, SourceError, TurnInput,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn phase(origin: &str) -> AgentEvent {
    AgentEvent::PhaseStart {
        origin: origin.to_string(),
    }
}

pub fn tool_start(tool: &str) -> AgentEvent {
    AgentEvent::ToolStart {
        tool: tool.to_string(),
    }
}

pub fn tool_end(tool: &str, output: &str) -> AgentEvent {
    AgentEvent::ToolEnd {
        tool: tool.to_string(),
        output: output.to_string(),
    }
}

pub fn token(origin: &str, text: &str) -> AgentEvent {
    AgentEvent::TokenChunk {
        origin: origin.to_string(),
        text: text.to_string(),
    }
}

/// Event source replaying a fixed script
pub struct ScriptedSource {
    events: Vec<Result<AgentEvent, SourceError>>,
    open_error: Option<SourceError>,
    fallback: Result<String, SourceError>,
    stream_calls: AtomicUsize,
    invoke_calls: AtomicUsize,
    inputs: Mutex<Vec<TurnInput>>,
}

impl ScriptedSource {
    pub fn new(events: Vec<AgentEvent>) -> Self {
        Self {
            events: events.into_iter().map(Ok).collect(),
            open_error: None,
            fallback: Ok(String::new()),
            stream_calls: AtomicUsize::new(0),
            invoke_calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, answer: &str) -> Self {
        self.fallback = Ok(answer.to_string());
        self
    }

    pub fn with_fallback_error(mut self, error: SourceError) -> Self {
        self.fallback = Err(error);
        self
    }

    /// Fail the stream after the scripted events
    pub fn with_stream_error(mut self, error: SourceError) -> Self {
        self.events.push(Err(error));
        self
    }

    /// Fail before any event is produced
    pub fn with_open_error(mut self, error: SourceError) -> Self {
        self.open_error = Some(error);
        self
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn invoke_calls(&self) -> usize {
        self.invoke_calls.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<TurnInput> {
        self.inputs.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn stream(&self, input: &TurnInput, _config: &RunConfig) -> Result<EventStream, SourceError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.clone());
        if let Some(e) = &self.open_error {
            return Err(e.clone());
        }
        Ok(Box::pin(futures::stream::iter(self.events.clone())))
    }

    async fn invoke(&self, input: &TurnInput, _config: &RunConfig) -> Result<String, SourceError> {
        self.invoke_calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.clone());
        self.fallback.clone()
    }
}

/// In-memory image store with predictable references
#[derive(Default)]
pub struct MemoryImageStore {
    images: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<(String, Vec<u8>)> {
        self.images.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn save(&self, bytes: &[u8], extension: &str) -> Result<String, ImageError> {
        let mut images = self.images.lock().unwrap();
        let reference = format!("/images/mem-{}.{extension}", images.len());
        images.push((reference.clone(), bytes.to_vec()));
        Ok(reference)
    }

    async fn load(&self, reference: &str) -> Result<Vec<u8>, ImageError> {
        self.images
            .lock()
            .unwrap()
            .iter()
            .find(|(r, _)| r == reference)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| ImageError::InvalidReference(reference.to_string()))
    }
}

/// Store whose commits always fail
pub struct FailingStore;

#[async_trait]
impl TurnStore for FailingStore {
    async fn commit_turn(
        &self,
        _thread_id: &str,
        _user: &NewMessage,
        _assistant: &NewMessage,
    ) -> Result<(Message, Message), String> {
        Err("disk full".to_string())
    }
}

pub fn services_with_images(
    source: Arc<dyn EventSource>,
    store: Arc<dyn TurnStore>,
    images: Arc<dyn ImageStore>,
) -> Arc<TurnServices> {
    Arc::new(TurnServices {
        source,
        images,
        store,
        checkpoints: Arc::new(MemoryCheckpointStore::new()),
        responders: ResponderRegistry::default(),
        notices: Notices::default(),
    })
}

pub fn services_with(source: Arc<dyn EventSource>, store: Arc<dyn TurnStore>) -> Arc<TurnServices> {
    services_with_images(source, store, Arc::new(MemoryImageStore::new()))
}

/// Run a spawned turn and collect everything it emitted
pub async fn collect_turn(services: Arc<TurnServices>, turn: Turn) -> Vec<LiveRecord> {
    let (live, mut rx) = LiveChannel::new(16);
    let handle = super::spawn_turn(services, turn, live);

    let mut records = Vec::new();
    while let Some(record) = rx.recv().await {
        records.push(record);
    }
    handle.await.unwrap();
    records
}
