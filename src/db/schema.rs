//! Database schema and types

pub use crate::turn::steps::StepEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS threads (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_threads_user ON threads(user_id, created_at);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL,
    sequence_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    steps TEXT,
    created_at TEXT NOT NULL,

    FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id, sequence_id);

CREATE TABLE IF NOT EXISTS message_images (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    url TEXT NOT NULL,

    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_message_images_message ON message_images(message_id);

CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Columns added after the first release. `ALTER TABLE` fails harmlessly
/// when the column already exists.
pub const MIGRATION_ADD_COLUMNS: &[&str] = &["ALTER TABLE messages ADD COLUMN steps TEXT"];

/// Title given to freshly created threads
pub const DEFAULT_THREAD_TITLE: &str = "New chat";

/// Title used when a rename request carries no usable text
pub const UNTITLED_THREAD_TITLE: &str = "Untitled";

pub const MAX_TITLE_CHARS: usize = 50;

/// Conversation container owned by one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "user" => Role::User,
            _ => Role::Assistant,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored message with its attachment and step log resolved
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub message_id: String,
    pub thread_id: String,
    pub sequence_id: i64,
    pub role: Role,
    pub content: String,
    pub image: Option<String>,
    pub steps: Vec<StepEntry>,
    pub created_at: DateTime<Utc>,
}

/// Message about to be written as part of a turn commit
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    /// Attachment reference, stored verbatim
    pub image: Option<String>,
    /// `None` leaves the column NULL (user messages)
    pub steps: Option<Vec<StepEntry>>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>, image: Option<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image,
            steps: None,
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        steps: Vec<StepEntry>,
        image: Option<String>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            image,
            steps: Some(steps),
        }
    }
}

/// Normalize a user-supplied thread title
pub fn normalize_title(title: Option<&str>) -> String {
    let trimmed = title.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return UNTITLED_THREAD_TITLE.to_string();
    }
    trimmed.chars().take(MAX_TITLE_CHARS).collect()
}
