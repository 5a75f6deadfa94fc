//! Core data models used throughout Efiko.
//!
//! These types represent the turns, chunks, and search hits that flow
//! through a chat turn, plus the JSON shapes of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message exchanged in a conversation. Fields are private so a turn
/// cannot change after it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A chunk of extracted document text. `hash` is the hex SHA-256 of `text`.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A single web-search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

/// A document chunk returned from a similarity lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Position of the chunk within its document.
    pub chunk_index: i64,
    pub text: String,
    pub score: f32,
}

/// Request body for `POST /chat`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    pub content: String,
    #[serde(default)]
    pub conversation_history: Vec<Turn>,
    #[serde(default)]
    pub vectorstore_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// Response body for `POST /chat`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponse {
    pub content: String,
    pub timestamp: String,
    pub chat_id: String,
}

/// Response body for `POST /documents/upload`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub vectorstore_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::from_str::<Role>("\"assistant\"").unwrap(),
            Role::Assistant
        );
    }

    #[test]
    fn turn_without_timestamp_deserializes() {
        let turn: Turn = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(turn.role(), Role::User);
        assert_eq!(turn.content(), "hi");
    }

    #[test]
    fn chat_message_optional_fields_default() {
        let msg: ChatMessage = serde_json::from_str(r#"{"content":"hello"}"#).unwrap();
        assert!(msg.conversation_history.is_empty());
        assert!(msg.vectorstore_id.is_none());
        assert!(msg.chat_id.is_none());
    }
}
