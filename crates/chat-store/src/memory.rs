use std::collections::HashMap;

use chat_stream::{MessageRecord, NewMessage, PersistenceError, PersistenceSink};
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::types::{
    ChatRecord, DocumentKind, DocumentRecord, NewChat, NewDocument, NewSuggestion,
    SuggestionRecord,
};
use crate::{ChatRepository, DocumentRepository};

#[derive(Default)]
struct Inner {
    chats: HashMap<uuid::Uuid, ChatRecord>,
    /// Insertion order doubles as creation order.
    messages: Vec<MessageRecord>,
    documents: HashMap<uuid::Uuid, DocumentRecord>,
    /// Insertion order doubles as creation order.
    suggestions: Vec<SuggestionRecord>,
    clock: Option<DateTime<Utc>>,
}

impl Inner {
    /// Wall-clock time, forced strictly past every earlier tick so recency
    /// ordering never ties.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.clock {
            Some(last) if now <= last => last + TimeDelta::milliseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }
}

/// Process-local chat store for tests and one-shot CLI runs.
#[derive(Default)]
pub struct MemoryChatStore {
    inner: Mutex<Inner>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceSink for MemoryChatStore {
    async fn add_message(&self, message: NewMessage) -> Result<MessageRecord, PersistenceError> {
        let mut inner = self.inner.lock().await;
        if !inner.chats.contains_key(&message.chat_id) {
            return Err(StoreError::ChatNotFound(message.chat_id).into());
        }
        let record = MessageRecord {
            id: uuid::Uuid::new_v4(),
            chat_id: message.chat_id,
            role: message.role,
            parts: message.parts,
            attachments: message.attachments,
            created_at: inner.tick(),
        };
        inner.messages.push(record.clone());
        Ok(record)
    }

    async fn touch_chat(&self, chat_id: uuid::Uuid) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().await;
        if !inner.chats.contains_key(&chat_id) {
            return Err(PersistenceError::NotFound(chat_id));
        }
        let now = inner.tick();
        if let Some(chat) = inner.chats.get_mut(&chat_id) {
            chat.updated_at = now;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChatRepository for MemoryChatStore {
    async fn create_chat(&self, input: NewChat) -> StoreResult<ChatRecord> {
        let mut inner = self.inner.lock().await;
        let now = inner.tick();
        let record = ChatRecord {
            id: uuid::Uuid::new_v4(),
            user_id: input.user_id,
            title: input.title,
            visibility: input.visibility,
            created_at: now,
            updated_at: now,
        };
        inner.chats.insert(record.id, record.clone());
        Ok(record)
    }

    async fn chat(&self, chat_id: uuid::Uuid, user_id: &str) -> StoreResult<Option<ChatRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .chats
            .get(&chat_id)
            .filter(|chat| chat.user_id == user_id)
            .cloned())
    }

    async fn chats_for_user(&self, user_id: &str, limit: usize) -> StoreResult<Vec<ChatRecord>> {
        let inner = self.inner.lock().await;
        let mut chats: Vec<ChatRecord> = inner
            .chats
            .values()
            .filter(|chat| chat.user_id == user_id)
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        chats.truncate(limit);
        Ok(chats)
    }

    async fn delete_chat(&self, chat_id: uuid::Uuid, user_id: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let owned = inner
            .chats
            .get(&chat_id)
            .is_some_and(|chat| chat.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        inner.chats.remove(&chat_id);
        inner.messages.retain(|message| message.chat_id != chat_id);
        Ok(true)
    }

    async fn messages(&self, chat_id: uuid::Uuid, limit: usize) -> StoreResult<Vec<MessageRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .messages
            .iter()
            .filter(|message| message.chat_id == chat_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl DocumentRepository for MemoryChatStore {
    async fn create_document(&self, input: NewDocument) -> StoreResult<DocumentRecord> {
        let mut inner = self.inner.lock().await;
        let now = inner.tick();
        let record = DocumentRecord {
            id: uuid::Uuid::new_v4(),
            user_id: input.user_id,
            title: input.title,
            content: input.content,
            kind: input.kind,
            created_at: now,
            updated_at: now,
        };
        inner.documents.insert(record.id, record.clone());
        Ok(record)
    }

    async fn document(
        &self,
        document_id: uuid::Uuid,
        user_id: &str,
    ) -> StoreResult<Option<DocumentRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .documents
            .get(&document_id)
            .filter(|document| document.user_id == user_id)
            .cloned())
    }

    async fn documents_for_user(
        &self,
        user_id: &str,
        kind: Option<DocumentKind>,
        limit: usize,
    ) -> StoreResult<Vec<DocumentRecord>> {
        let inner = self.inner.lock().await;
        let mut documents: Vec<DocumentRecord> = inner
            .documents
            .values()
            .filter(|document| document.user_id == user_id)
            .filter(|document| kind.is_none_or(|kind| document.kind == kind))
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        documents.truncate(limit);
        Ok(documents)
    }

    async fn update_document(
        &self,
        document_id: uuid::Uuid,
        user_id: &str,
        content: String,
    ) -> StoreResult<Option<DocumentRecord>> {
        let mut inner = self.inner.lock().await;
        let owned = inner
            .documents
            .get(&document_id)
            .is_some_and(|document| document.user_id == user_id);
        if !owned {
            return Ok(None);
        }
        let now = inner.tick();
        Ok(inner.documents.get_mut(&document_id).map(|document| {
            document.content = content;
            document.updated_at = now;
            document.clone()
        }))
    }

    async fn delete_document(&self, document_id: uuid::Uuid, user_id: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let owned = inner
            .documents
            .get(&document_id)
            .is_some_and(|document| document.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        inner.documents.remove(&document_id);
        inner
            .suggestions
            .retain(|suggestion| suggestion.document_id != document_id);
        Ok(true)
    }

    async fn add_suggestion(&self, input: NewSuggestion) -> StoreResult<SuggestionRecord> {
        let mut inner = self.inner.lock().await;
        if !inner.documents.contains_key(&input.document_id) {
            return Err(StoreError::DocumentNotFound(input.document_id));
        }
        let record = SuggestionRecord {
            id: uuid::Uuid::new_v4(),
            document_id: input.document_id,
            user_id: input.user_id,
            original_text: input.original_text,
            suggested_text: input.suggested_text,
            description: input.description,
            is_resolved: false,
            created_at: inner.tick(),
        };
        inner.suggestions.push(record.clone());
        Ok(record)
    }

    async fn suggestions(
        &self,
        document_id: uuid::Uuid,
        include_resolved: bool,
    ) -> StoreResult<Vec<SuggestionRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .suggestions
            .iter()
            .rev()
            .filter(|suggestion| suggestion.document_id == document_id)
            .filter(|suggestion| include_resolved || !suggestion.is_resolved)
            .cloned()
            .collect())
    }

    async fn resolve_suggestion(
        &self,
        suggestion_id: uuid::Uuid,
        user_id: &str,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let Inner {
            documents,
            suggestions,
            ..
        } = &mut *inner;
        let suggestion = suggestions.iter_mut().find(|suggestion| {
            suggestion.id == suggestion_id
                && documents
                    .get(&suggestion.document_id)
                    .is_some_and(|document| document.user_id == user_id)
        });
        Ok(match suggestion {
            Some(suggestion) => {
                suggestion.is_resolved = true;
                true
            }
            None => false,
        })
    }
}
