//! Step log: the ordered record of progress announcements made during a turn

use super::live::{LiveChannel, LiveRecord};
use serde::{Deserialize, Serialize};

/// Kind of progress entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// A phase or intent ("searching...", "consolidating...")
    Step,
    /// An outcome ("search complete", "chart generated")
    Observation,
}

/// One persisted progress entry, stored as `{"type": ..., "content": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEntry {
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub content: String,
}

impl StepEntry {
    pub fn step(content: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Step,
            content: content.into(),
        }
    }

    pub fn observation(content: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Observation,
            content: content.into(),
        }
    }

    fn live_record(&self) -> LiveRecord {
        match self.kind {
            StepKind::Step => LiveRecord::Step(self.content.clone()),
            StepKind::Observation => LiveRecord::Observation(self.content.clone()),
        }
    }
}

/// Accumulates entries for the turn and mirrors each one to the live channel.
///
/// Appending and emitting happen in the same call, so the persisted log and
/// the live announcements cannot drift apart.
pub struct StepLog {
    entries: Vec<StepEntry>,
    live: LiveChannel,
}

impl StepLog {
    pub fn new(live: LiveChannel) -> Self {
        Self {
            entries: Vec::new(),
            live,
        }
    }

    pub async fn announce(&mut self, entry: StepEntry) {
        let record = entry.live_record();
        self.entries.push(entry);
        self.live.send(record).await;
    }

    pub async fn step(&mut self, content: impl Into<String>) {
        self.announce(StepEntry::step(content)).await;
    }

    pub async fn observation(&mut self, content: impl Into<String>) {
        self.announce(StepEntry::observation(content)).await;
    }

    #[allow(dead_code)] // Used in tests
    pub fn entries(&self) -> &[StepEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<StepEntry> {
        self.entries
    }
}
