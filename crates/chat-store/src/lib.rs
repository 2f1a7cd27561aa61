//! Chat, message and document storage.
//!
//! Both stores implement [`chat_stream::PersistenceSink`], so they can back a
//! stream coordinator directly, plus [`ChatRepository`] for the chat CRUD the
//! HTTP layer needs and [`DocumentRepository`] for documents and their edit
//! suggestions.

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryChatStore;
pub use sqlite::SqliteChatStore;
pub use types::{
    CHAT_LIST_LIMIT, ChatRecord, DOCUMENT_LIST_LIMIT, DocumentKind, DocumentRecord,
    MESSAGE_HISTORY_LIMIT, NewChat, NewDocument, NewSuggestion, SuggestionRecord, TITLE_MAX_CHARS,
    Visibility, title_from_text,
};

use chat_stream::{MessageRecord, PersistenceSink};

/// Chat CRUD on top of the persistence contract.
///
/// Reads and deletes are scoped to the owning user; a chat owned by someone
/// else behaves as if it did not exist.
#[async_trait::async_trait]
pub trait ChatRepository: PersistenceSink {
    async fn create_chat(&self, input: NewChat) -> StoreResult<ChatRecord>;

    async fn chat(&self, chat_id: uuid::Uuid, user_id: &str) -> StoreResult<Option<ChatRecord>>;

    /// Most recently updated first.
    async fn chats_for_user(&self, user_id: &str, limit: usize) -> StoreResult<Vec<ChatRecord>>;

    /// Deletes a chat and its messages. Returns `false` when nothing matched.
    async fn delete_chat(&self, chat_id: uuid::Uuid, user_id: &str) -> StoreResult<bool>;

    /// Oldest first.
    async fn messages(&self, chat_id: uuid::Uuid, limit: usize) -> StoreResult<Vec<MessageRecord>>;
}

/// Documents and their edit suggestions, scoped to the owning user like
/// chats.
#[async_trait::async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn create_document(&self, input: NewDocument) -> StoreResult<DocumentRecord>;

    async fn document(
        &self,
        document_id: uuid::Uuid,
        user_id: &str,
    ) -> StoreResult<Option<DocumentRecord>>;

    /// Most recently updated first, optionally only one kind.
    async fn documents_for_user(
        &self,
        user_id: &str,
        kind: Option<DocumentKind>,
        limit: usize,
    ) -> StoreResult<Vec<DocumentRecord>>;

    /// Replaces the content. `None` when the document does not exist for
    /// `user_id`.
    async fn update_document(
        &self,
        document_id: uuid::Uuid,
        user_id: &str,
        content: String,
    ) -> StoreResult<Option<DocumentRecord>>;

    /// Deletes a document and its suggestions.
    async fn delete_document(&self, document_id: uuid::Uuid, user_id: &str) -> StoreResult<bool>;

    /// Fails with [`StoreError::DocumentNotFound`] for an unknown document.
    async fn add_suggestion(&self, input: NewSuggestion) -> StoreResult<SuggestionRecord>;

    /// Newest first. Resolved suggestions are skipped unless asked for.
    async fn suggestions(
        &self,
        document_id: uuid::Uuid,
        include_resolved: bool,
    ) -> StoreResult<Vec<SuggestionRecord>>;

    /// Marks a suggestion resolved. Only the owner of its document may do
    /// so; `false` when nothing matched.
    async fn resolve_suggestion(&self, suggestion_id: uuid::Uuid, user_id: &str)
    -> StoreResult<bool>;
}
