//! API request and response types

use crate::db::{Message, Role, StepEntry, Thread};
use crate::turn::Turn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user: String,
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Response for thread creation
#[derive(Debug, Serialize)]
pub struct CreateThreadResponse {
    pub thread_id: String,
    pub title: String,
}

/// Thread as listed for its owner
#[derive(Debug, Serialize)]
pub struct ThreadSummary {
    pub id: String,
    pub title: String,
}

impl From<Thread> for ThreadSummary {
    fn from(thread: Thread) -> Self {
        Self {
            id: thread.id,
            title: thread.title,
        }
    }
}

/// Request to rename a thread
#[derive(Debug, Default, Deserialize)]
pub struct RenameRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RenameResponse {
    pub ok: bool,
    pub title: String,
}

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

/// Stored message as returned to clients
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub role: Role,
    pub content: String,
    pub image: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub steps: Vec<StepEntry>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            role: message.role,
            content: message.content,
            image: message.image,
            timestamp: message.created_at,
            steps: message.steps,
        }
    }
}

/// A question for the supervisor, streamed or not
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub thread_id: String,
    pub question: String,
    /// Uploaded image path or external URL
    #[serde(default)]
    pub image: Option<String>,
}

impl ChatRequest {
    pub fn into_turn(self) -> Turn {
        Turn {
            thread_id: self.thread_id,
            question: self.question,
            image: self.image,
        }
    }
}

/// Non-streaming chat answer
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub role: Role,
    pub content: String,
    pub image: Option<String>,
}

impl From<Message> for ChatResponse {
    fn from(message: Message) -> Self {
        Self {
            role: message.role,
            content: message.content,
            image: message.image,
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
