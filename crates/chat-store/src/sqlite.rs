use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chat_stream::{
    MessagePart, MessageRecord, NewMessage, PersistenceError, PersistenceSink, Role,
};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::types::{
    ChatRecord, DocumentKind, DocumentRecord, NewChat, NewDocument, NewSuggestion,
    SuggestionRecord, Visibility,
};
use crate::{ChatRepository, DocumentRepository};

const DOCUMENT_COLUMNS: &str = "id, user_id, title, content, kind, created_at, updated_at";
const SUGGESTION_COLUMNS: &str =
    "id, document_id, user_id, original_text, suggested_text, description, is_resolved, created_at";

/// SQLite-backed chat store over a connection pool.
///
/// Each operation checks a connection out of the pool for the duration of
/// one statement (or a short sequence of them) and returns it afterwards.
#[derive(Clone, Debug)]
pub struct SqliteChatStore {
    pool: SqlitePool,
}

impl SqliteChatStore {
    /// Opens (creating if needed) the database at `database_location`, which
    /// may be a `sqlite:` URL or a plain file path, and applies migrations.
    pub async fn open(database_location: &str) -> StoreResult<Self> {
        ensure_database_directory(database_location)?;
        let database_url = normalize_database_url(database_location);
        let connect_error = |source: sqlx::Error| StoreError::Connect {
            database_url: database_url.clone(),
            source,
        };

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(connect_error)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5_000));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(connect_error)?;
        debug!(%database_url, "sqlite chat store opened");
        Self::from_pool(pool).await
    }

    /// Private in-memory database, kept alive on a single pooled connection.
    pub async fn in_memory() -> StoreResult<Self> {
        let database_url = "sqlite::memory:";
        let connect_error = |source: sqlx::Error| StoreError::Connect {
            database_url: database_url.to_string(),
            source,
        };
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(connect_error)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(connect_error)?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_message(&self, message: NewMessage) -> StoreResult<MessageRecord> {
        let chat_id = message.chat_id.to_string();
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chats WHERE id = ?")
            .bind(&chat_id)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::query("message-add-check-chat"))?;
        if exists == 0 {
            return Err(StoreError::ChatNotFound(message.chat_id));
        }

        let id = uuid::Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO messages (id, chat_id, role, parts, attachments, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&chat_id)
        .bind(message.role.as_str())
        .bind(serde_json::to_string(&message.parts)?)
        .bind(serde_json::to_string(&message.attachments)?)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("message-add-insert"))?;

        Ok(MessageRecord {
            id,
            chat_id: message.chat_id,
            role: message.role,
            parts: message.parts,
            attachments: message.attachments,
            created_at: from_millis("messages.created_at", now.timestamp_millis())?,
        })
    }

    async fn bump_chat(&self, chat_id: uuid::Uuid) -> StoreResult<()> {
        let result = sqlx::query("UPDATE chats SET updated_at = MAX(?, updated_at + 1) WHERE id = ?")
            .bind(Utc::now().timestamp_millis())
            .bind(chat_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StoreError::query("chat-touch"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ChatNotFound(chat_id));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PersistenceSink for SqliteChatStore {
    async fn add_message(&self, message: NewMessage) -> Result<MessageRecord, PersistenceError> {
        Ok(self.insert_message(message).await?)
    }

    async fn touch_chat(&self, chat_id: uuid::Uuid) -> Result<(), PersistenceError> {
        Ok(self.bump_chat(chat_id).await?)
    }
}

#[async_trait::async_trait]
impl ChatRepository for SqliteChatStore {
    async fn create_chat(&self, input: NewChat) -> StoreResult<ChatRecord> {
        let id = uuid::Uuid::new_v4();
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO chats (id, user_id, title, visibility, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(input.user_id.as_str())
        .bind(input.title.as_str())
        .bind(input.visibility.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("chat-create"))?;

        let created_at = from_millis("chats.created_at", now)?;
        Ok(ChatRecord {
            id,
            user_id: input.user_id,
            title: input.title,
            visibility: input.visibility,
            created_at,
            updated_at: created_at,
        })
    }

    async fn chat(&self, chat_id: uuid::Uuid, user_id: &str) -> StoreResult<Option<ChatRecord>> {
        let row = sqlx::query_as::<_, ChatRow>(
            "SELECT id, user_id, title, visibility, created_at, updated_at FROM chats WHERE id = ? AND user_id = ?",
        )
        .bind(chat_id.to_string())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::query("chat-get"))?;
        row.map(chat_row_to_record).transpose()
    }

    async fn chats_for_user(&self, user_id: &str, limit: usize) -> StoreResult<Vec<ChatRecord>> {
        let rows = sqlx::query_as::<_, ChatRow>(
            "SELECT id, user_id, title, visibility, created_at, updated_at FROM chats WHERE user_id = ? ORDER BY updated_at DESC, rowid DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query("chat-list"))?;
        rows.into_iter().map(chat_row_to_record).collect()
    }

    async fn delete_chat(&self, chat_id: uuid::Uuid, user_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM chats WHERE id = ? AND user_id = ?")
            .bind(chat_id.to_string())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::query("chat-delete"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn messages(&self, chat_id: uuid::Uuid, limit: usize) -> StoreResult<Vec<MessageRecord>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, chat_id, role, parts, attachments, created_at FROM messages WHERE chat_id = ? ORDER BY created_at ASC, rowid ASC LIMIT ?",
        )
        .bind(chat_id.to_string())
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query("message-list"))?;
        rows.into_iter().map(message_row_to_record).collect()
    }
}

#[async_trait::async_trait]
impl DocumentRepository for SqliteChatStore {
    async fn create_document(&self, input: NewDocument) -> StoreResult<DocumentRecord> {
        let id = uuid::Uuid::new_v4();
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO documents (id, user_id, title, content, kind, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(input.user_id.as_str())
        .bind(input.title.as_str())
        .bind(input.content.as_str())
        .bind(input.kind.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("document-create"))?;

        let created_at = from_millis("documents.created_at", now)?;
        Ok(DocumentRecord {
            id,
            user_id: input.user_id,
            title: input.title,
            content: input.content,
            kind: input.kind,
            created_at,
            updated_at: created_at,
        })
    }

    async fn document(
        &self,
        document_id: uuid::Uuid,
        user_id: &str,
    ) -> StoreResult<Option<DocumentRecord>> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ? AND user_id = ?"
        ))
        .bind(document_id.to_string())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::query("document-get"))?;
        row.map(document_row_to_record).transpose()
    }

    async fn documents_for_user(
        &self,
        user_id: &str,
        kind: Option<DocumentKind>,
        limit: usize,
    ) -> StoreResult<Vec<DocumentRecord>> {
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE user_id = ? AND (? IS NULL OR kind = ?) ORDER BY updated_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(user_id)
        .bind(kind.map(|kind| kind.as_str()))
        .bind(kind.map(|kind| kind.as_str()))
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query("document-list"))?;
        rows.into_iter().map(document_row_to_record).collect()
    }

    async fn update_document(
        &self,
        document_id: uuid::Uuid,
        user_id: &str,
        content: String,
    ) -> StoreResult<Option<DocumentRecord>> {
        let result = sqlx::query(
            "UPDATE documents SET content = ?, updated_at = MAX(?, updated_at + 1) WHERE id = ? AND user_id = ?",
        )
        .bind(content.as_str())
        .bind(Utc::now().timestamp_millis())
        .bind(document_id.to_string())
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("document-update"))?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.document(document_id, user_id).await
    }

    async fn delete_document(&self, document_id: uuid::Uuid, user_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ? AND user_id = ?")
            .bind(document_id.to_string())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::query("document-delete"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_suggestion(&self, input: NewSuggestion) -> StoreResult<SuggestionRecord> {
        let document_id = input.document_id.to_string();
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents WHERE id = ?")
            .bind(&document_id)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::query("suggestion-add-check-document"))?;
        if exists == 0 {
            return Err(StoreError::DocumentNotFound(input.document_id));
        }

        let id = uuid::Uuid::new_v4();
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO suggestions (id, document_id, user_id, original_text, suggested_text, description, is_resolved, created_at) VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(id.to_string())
        .bind(&document_id)
        .bind(input.user_id.as_str())
        .bind(input.original_text.as_str())
        .bind(input.suggested_text.as_str())
        .bind(input.description.as_deref())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("suggestion-add-insert"))?;

        Ok(SuggestionRecord {
            id,
            document_id: input.document_id,
            user_id: input.user_id,
            original_text: input.original_text,
            suggested_text: input.suggested_text,
            description: input.description,
            is_resolved: false,
            created_at: from_millis("suggestions.created_at", now)?,
        })
    }

    async fn suggestions(
        &self,
        document_id: uuid::Uuid,
        include_resolved: bool,
    ) -> StoreResult<Vec<SuggestionRecord>> {
        let rows = sqlx::query_as::<_, SuggestionRow>(&format!(
            "SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE document_id = ? AND (? OR is_resolved = 0) ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(document_id.to_string())
        .bind(i64::from(include_resolved))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query("suggestion-list"))?;
        rows.into_iter().map(suggestion_row_to_record).collect()
    }

    async fn resolve_suggestion(
        &self,
        suggestion_id: uuid::Uuid,
        user_id: &str,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE suggestions SET is_resolved = 1 WHERE id = ? AND document_id IN (SELECT id FROM documents WHERE user_id = ?)",
        )
        .bind(suggestion_id.to_string())
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("suggestion-resolve"))?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, FromRow)]
struct ChatRow {
    id: String,
    user_id: String,
    title: String,
    visibility: String,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: String,
    chat_id: String,
    role: String,
    parts: String,
    attachments: String,
    created_at: i64,
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: String,
    user_id: String,
    title: String,
    content: String,
    kind: String,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, FromRow)]
struct SuggestionRow {
    id: String,
    document_id: String,
    user_id: String,
    original_text: String,
    suggested_text: String,
    description: Option<String>,
    is_resolved: i64,
    created_at: i64,
}

fn chat_row_to_record(row: ChatRow) -> StoreResult<ChatRecord> {
    Ok(ChatRecord {
        id: parse_uuid("chats.id", &row.id)?,
        user_id: row.user_id,
        title: row.title,
        visibility: Visibility::from_str(&row.visibility)
            .map_err(|_| StoreError::invalid("chats.visibility", row.visibility.clone()))?,
        created_at: from_millis("chats.created_at", row.created_at)?,
        updated_at: from_millis("chats.updated_at", row.updated_at)?,
    })
}

fn message_row_to_record(row: MessageRow) -> StoreResult<MessageRecord> {
    let parts: Vec<MessagePart> = serde_json::from_str(&row.parts)?;
    let attachments: Vec<serde_json::Value> = serde_json::from_str(&row.attachments)?;
    Ok(MessageRecord {
        id: parse_uuid("messages.id", &row.id)?,
        chat_id: parse_uuid("messages.chat_id", &row.chat_id)?,
        role: Role::from_str(&row.role)
            .map_err(|_| StoreError::invalid("messages.role", row.role.clone()))?,
        parts,
        attachments,
        created_at: from_millis("messages.created_at", row.created_at)?,
    })
}

fn document_row_to_record(row: DocumentRow) -> StoreResult<DocumentRecord> {
    Ok(DocumentRecord {
        id: parse_uuid("documents.id", &row.id)?,
        user_id: row.user_id,
        title: row.title,
        content: row.content,
        kind: DocumentKind::from_str(&row.kind)
            .map_err(|_| StoreError::invalid("documents.kind", row.kind.clone()))?,
        created_at: from_millis("documents.created_at", row.created_at)?,
        updated_at: from_millis("documents.updated_at", row.updated_at)?,
    })
}

fn suggestion_row_to_record(row: SuggestionRow) -> StoreResult<SuggestionRecord> {
    Ok(SuggestionRecord {
        id: parse_uuid("suggestions.id", &row.id)?,
        document_id: parse_uuid("suggestions.document_id", &row.document_id)?,
        user_id: row.user_id,
        original_text: row.original_text,
        suggested_text: row.suggested_text,
        description: row.description,
        is_resolved: row.is_resolved != 0,
        created_at: from_millis("suggestions.created_at", row.created_at)?,
    })
}

fn parse_uuid(field: &'static str, raw: &str) -> StoreResult<uuid::Uuid> {
    uuid::Uuid::parse_str(raw).map_err(|_| StoreError::invalid(field, raw))
}

fn from_millis(field: &'static str, millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StoreError::invalid(field, millis.to_string()))
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn ensure_database_directory(database_location: &str) -> StoreResult<()> {
    let path = database_location
        .strip_prefix("sqlite://")
        .or_else(|| database_location.strip_prefix("sqlite:"))
        .unwrap_or(database_location);
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDirectory {
            path: parent.display().to_string(),
            source,
        })?;
    }
    Ok(())
}

fn normalize_database_url(database_location: &str) -> String {
    if database_location.starts_with("sqlite:") {
        return database_location.to_string();
    }
    if database_location == ":memory:" {
        return "sqlite::memory:".to_string();
    }
    format!("sqlite://{database_location}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CHAT_LIST_LIMIT, DOCUMENT_LIST_LIMIT, MESSAGE_HISTORY_LIMIT};

    async fn store() -> SqliteChatStore {
        SqliteChatStore::in_memory().await.expect("in-memory store")
    }

    async fn pause() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[tokio::test]
    async fn create_and_get_respects_ownership() {
        let store = store().await;
        let chat = store
            .create_chat(NewChat::from_opening_text("alice", "Hello there"))
            .await
            .expect("create");

        let found = store.chat(chat.id, "alice").await.expect("get");
        assert_eq!(found.as_ref().map(|c| c.title.as_str()), Some("Hello there"));
        assert_eq!(found.map(|c| c.visibility), Some(Visibility::Private));
        assert!(store.chat(chat.id, "bob").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn messages_round_trip_in_creation_order() {
        let store = store().await;
        let chat = store
            .create_chat(NewChat::from_opening_text("alice", "hi"))
            .await
            .expect("create");

        store
            .add_message(NewMessage {
                chat_id: chat.id,
                role: Role::User,
                parts: vec![MessagePart::text("hi")],
                attachments: vec![serde_json::json!({"url": "file.png"})],
            })
            .await
            .expect("user message");
        let reply = store
            .add_message(NewMessage::assistant_text(chat.id, "Hello!"))
            .await
            .expect("assistant message");

        let messages = store
            .messages(chat.id, MESSAGE_HISTORY_LIMIT)
            .await
            .expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].attachments.len(), 1);
        assert_eq!(messages[1], reply);
        assert_eq!(messages[1].text(), "Hello!");
    }

    #[tokio::test]
    async fn add_message_to_missing_chat_is_not_found() {
        let store = store().await;
        let missing = uuid::Uuid::new_v4();
        let err = store
            .add_message(NewMessage::assistant_text(missing, "x"))
            .await
            .expect_err("missing chat");
        assert_eq!(err, PersistenceError::NotFound(missing));
        assert_eq!(
            store.touch_chat(missing).await,
            Err(PersistenceError::NotFound(missing))
        );
    }

    #[tokio::test]
    async fn touch_moves_chat_to_front_of_history() {
        let store = store().await;
        let first = store
            .create_chat(NewChat::from_opening_text("alice", "first"))
            .await
            .expect("first");
        pause().await;
        let second = store
            .create_chat(NewChat::from_opening_text("alice", "second"))
            .await
            .expect("second");
        store
            .create_chat(NewChat::from_opening_text("bob", "other user"))
            .await
            .expect("bob");

        let listed = store.chats_for_user("alice", CHAT_LIST_LIMIT).await.expect("list");
        assert_eq!(listed.iter().map(|c| c.id).collect::<Vec<_>>(), [second.id, first.id]);

        pause().await;
        store.touch_chat(first.id).await.expect("touch");
        let listed = store.chats_for_user("alice", 1).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, first.id);
        assert!(listed[0].updated_at > listed[0].created_at);
    }

    #[tokio::test]
    async fn delete_cascades_and_checks_owner() {
        let store = store().await;
        let chat = store
            .create_chat(NewChat::from_opening_text("alice", "bye"))
            .await
            .expect("create");
        store
            .add_message(NewMessage::assistant_text(chat.id, "x"))
            .await
            .expect("message");

        assert!(!store.delete_chat(chat.id, "bob").await.expect("delete other"));
        assert!(store.delete_chat(chat.id, "alice").await.expect("delete"));
        assert!(store.chat(chat.id, "alice").await.expect("get").is_none());
        assert!(store.messages(chat.id, 10).await.expect("messages").is_empty());
    }

    fn new_document(user_id: &str, kind: DocumentKind) -> NewDocument {
        NewDocument {
            user_id: user_id.into(),
            title: "Draft".into(),
            content: "v1".into(),
            kind,
        }
    }

    #[tokio::test]
    async fn documents_are_owner_scoped_and_filtered_by_kind() {
        let store = store().await;
        let text = store
            .create_document(new_document("alice", DocumentKind::Text))
            .await
            .expect("text");
        pause().await;
        let sheet = store
            .create_document(new_document("alice", DocumentKind::Sheet))
            .await
            .expect("sheet");

        assert!(store.document(text.id, "bob").await.expect("get").is_none());
        assert_eq!(
            store.document(text.id, "alice").await.expect("get"),
            Some(text.clone())
        );

        pause().await;
        let updated = store
            .update_document(text.id, "alice", "v2".into())
            .await
            .expect("update")
            .expect("owned");
        assert_eq!(updated.content, "v2");
        assert!(updated.updated_at > updated.created_at);
        assert!(
            store
                .update_document(text.id, "bob", "x".into())
                .await
                .expect("update")
                .is_none()
        );

        let all = store
            .documents_for_user("alice", None, DOCUMENT_LIST_LIMIT)
            .await
            .expect("list");
        assert_eq!(all.iter().map(|d| d.id).collect::<Vec<_>>(), [text.id, sheet.id]);
        let sheets = store
            .documents_for_user("alice", Some(DocumentKind::Sheet), DOCUMENT_LIST_LIMIT)
            .await
            .expect("list");
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].kind, DocumentKind::Sheet);
    }

    #[tokio::test]
    async fn suggestions_resolve_and_cascade_with_their_document() {
        let store = store().await;
        let document = store
            .create_document(new_document("alice", DocumentKind::Text))
            .await
            .expect("document");
        let suggestion = |text: &str| NewSuggestion {
            document_id: document.id,
            user_id: "alice".into(),
            original_text: "v1".into(),
            suggested_text: text.into(),
            description: Some("tighten wording".into()),
        };
        let first = store.add_suggestion(suggestion("first")).await.expect("first");
        pause().await;
        let second = store.add_suggestion(suggestion("second")).await.expect("second");

        let missing = uuid::Uuid::new_v4();
        let err = store
            .add_suggestion(NewSuggestion {
                document_id: missing,
                ..suggestion("x")
            })
            .await
            .expect_err("missing document");
        assert!(matches!(err, StoreError::DocumentNotFound(id) if id == missing));

        assert!(!store.resolve_suggestion(first.id, "bob").await.expect("resolve"));
        assert!(store.resolve_suggestion(first.id, "alice").await.expect("resolve"));
        let open = store.suggestions(document.id, false).await.expect("open");
        assert_eq!(open, [second.clone()]);
        let all = store.suggestions(document.id, true).await.expect("all");
        assert_eq!(all.iter().map(|s| s.id).collect::<Vec<_>>(), [second.id, first.id]);
        assert!(all[1].is_resolved);
        assert_eq!(all[1].description.as_deref(), Some("tighten wording"));

        assert!(store.delete_document(document.id, "alice").await.expect("delete"));
        assert!(store.suggestions(document.id, true).await.expect("all").is_empty());
    }

    #[test]
    fn database_urls_are_normalized() {
        assert_eq!(normalize_database_url("data/chat.db"), "sqlite://data/chat.db");
        assert_eq!(normalize_database_url(":memory:"), "sqlite::memory:");
        assert_eq!(normalize_database_url("sqlite://x.db"), "sqlite://x.db");
    }
}
