//! Conversation-state checkpoints keyed by thread id

use crate::db::Database;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Storage for the supervisor's per-thread conversation state
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, thread_id: &str) -> Result<Option<Value>, String>;
    async fn save(&self, thread_id: &str, state: &Value) -> Result<(), String>;
}

#[async_trait]
impl CheckpointStore for Database {
    async fn load(&self, thread_id: &str) -> Result<Option<Value>, String> {
        self.load_checkpoint(thread_id).map_err(|e| e.to_string())
    }

    async fn save(&self, thread_id: &str, state: &Value) -> Result<(), String> {
        self.save_checkpoint(thread_id, state).map_err(|e| e.to_string())
    }
}

/// Process-local checkpoints, lost on restart
#[derive(Default)]
pub struct MemoryCheckpointStore {
    states: Mutex<HashMap<String, Value>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<Value>, String> {
        Ok(self.states.lock().unwrap().get(thread_id).cloned())
    }

    async fn save(&self, thread_id: &str, state: &Value) -> Result<(), String> {
        self.states
            .lock()
            .unwrap()
            .insert(thread_id.to_string(), state.clone());
        Ok(())
    }
}
