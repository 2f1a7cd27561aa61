use chrono::{DateTime, Utc};

use crate::content::{MessagePart, Role};
use crate::errors::PersistenceError;

/// Message to be stored.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMessage {
    pub chat_id: uuid::Uuid,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    pub attachments: Vec<serde_json::Value>,
}

impl NewMessage {
    /// Finished assistant reply: one text part, no attachments.
    pub fn assistant_text(chat_id: uuid::Uuid, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            role: Role::Assistant,
            parts: vec![MessagePart::text(text)],
            attachments: Vec::new(),
        }
    }
}

/// A stored message.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MessageRecord {
    pub id: uuid::Uuid,
    pub chat_id: uuid::Uuid,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    pub attachments: Vec<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(MessagePart::as_text).collect()
    }
}

/// Durable-storage boundary that records finished replies.
///
/// The stream coordinator calls `add_message` at most once per stream and
/// exactly once when a reply completes, then `touch_chat` to bump the chat's
/// recency. Implementations should hold a pooled connection only for the
/// duration of each call.
#[async_trait::async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Stores a message and returns the stored record.
    async fn add_message(&self, message: NewMessage) -> Result<MessageRecord, PersistenceError>;

    /// Updates the chat's `updated_at` timestamp.
    async fn touch_chat(&self, chat_id: uuid::Uuid) -> Result<(), PersistenceError>;
}
