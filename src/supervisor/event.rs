//! Supervisor events
//!
//! The supervisor streams raw `{event, name, data}` records. Only four kinds
//! matter to a turn; everything else is dropped at classification.

use serde::Deserialize;
use serde_json::Value;

/// A raw event as emitted by the supervisor framework
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub event: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

/// Event kinds the turn interpreter understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// A named unit of work began
    PhaseStart { origin: String },
    ToolStart { tool: String },
    ToolEnd { tool: String, output: String },
    /// Incremental text from a language model
    TokenChunk { origin: String, text: String },
}

impl RawEvent {
    pub fn classify(self) -> Option<AgentEvent> {
        match self.event.as_str() {
            "on_chain_start" => Some(AgentEvent::PhaseStart { origin: self.name }),
            "on_tool_start" => Some(AgentEvent::ToolStart { tool: self.name }),
            "on_tool_end" => {
                let output = self.data.get("output").map(tool_output_text).unwrap_or_default();
                Some(AgentEvent::ToolEnd {
                    tool: self.name,
                    output,
                })
            }
            "on_chat_model_stream" => {
                let text = self.data.get("chunk").and_then(content_text)?;
                Some(AgentEvent::TokenChunk {
                    origin: self.name,
                    text,
                })
            }
            _ => None,
        }
    }
}

/// Text of a message-like value: a bare string, an object with string
/// `content`, or `content` given as a list of text parts.
pub(crate) fn content_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => match map.get("content")? {
            Value::String(s) => Some(s.clone()),
            Value::Array(parts) => Some(
                parts
                    .iter()
                    .filter_map(|part| match part {
                        Value::String(s) => Some(s.as_str()),
                        Value::Object(p) => p.get("text").and_then(Value::as_str),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        },
        _ => None,
    }
}

/// Tool outputs are coerced to text: message content when present,
/// otherwise the value's own rendering.
fn tool_output_text(output: &Value) -> String {
    match output {
        Value::Null => String::new(),
        other => content_text(other).unwrap_or_else(|| other.to_string()),
    }
}
