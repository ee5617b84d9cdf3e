//! Chat message types and streaming event payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A complete chat message, either produced locally or synthesized from a
/// terminal chat event. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ChatMessage {
    /// Synthesize a message with a fresh id and the current time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            model: None,
        }
    }
}

/// Lifecycle tag of a `chat` event within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatState {
    /// Incremental stream text for the in-flight response
    Delta,
    /// The run completed; text is the full response
    Final,
    /// The run failed
    Error,
    /// The run was cancelled with no message
    Aborted,
    /// Forward-compatibility catch-all; broadcast but never synthesized
    #[serde(other)]
    Unknown,
}

/// Raw payload of a `chat` event frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEventPayload {
    pub state: ChatState,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// What chat-event subscribers receive. Ephemeral: emitted and forgotten.
#[derive(Debug, Clone)]
pub struct ChatStreamEvent {
    pub state: ChatState,
    pub run_id: Option<String>,
    pub stream: Option<String>,
    pub error: Option<String>,
}

/// Flatten a message's content into plain text.
///
/// Policy: a string content is used verbatim; an array of typed parts keeps
/// only `{type:"text"}` parts joined by newlines; otherwise a top-level `text`
/// field is used; otherwise empty.
pub fn message_text(message: &Value) -> String {
    flatten_content(message.get("content"), message.get("text"))
}

/// Same flattening applied to a bare content value (history entries).
pub fn flatten_content(content: Option<&Value>, text_fallback: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => text_fallback
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

/// Map one raw `chat.history` entry into a [`ChatMessage`].
///
/// Missing roles default to assistant, missing timestamps to now; structured
/// content goes through the same text flattening as live events.
pub fn history_message(raw: &Value) -> ChatMessage {
    let role = raw
        .get("role")
        .cloned()
        .and_then(|r| serde_json::from_value(r).ok())
        .unwrap_or(Role::Assistant);
    let timestamp = raw
        .get("time")
        .and_then(Value::as_str)
        .and_then(|t| t.parse::<DateTime<Utc>>().ok())
        .unwrap_or_else(Utc::now);
    ChatMessage {
        id: uuid::Uuid::new_v4().to_string(),
        role,
        content: flatten_content(raw.get("content"), raw.get("text")),
        timestamp,
        model: raw
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}
