use chat_stream::PersistenceError;

/// Errors raised by chat storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("chat {0} was not found")]
    ChatNotFound(uuid::Uuid),
    #[error("document {0} was not found")]
    DocumentNotFound(uuid::Uuid),
    #[error("stored {field} value {raw:?} is invalid")]
    InvalidRow { field: &'static str, raw: String },
    #[error("failed to encode message content: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to create sqlite directory at {path}: {source}")]
    CreateDirectory {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to connect sqlite database {database_url}: {source}")]
    Connect {
        database_url: String,
        source: sqlx::Error,
    },
    #[error("failed to run sqlite migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("sqlite query failed at {stage}: {source}")]
    Query {
        stage: &'static str,
        source: sqlx::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn query(stage: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Query { stage, source }
    }

    pub(crate) fn invalid(field: &'static str, raw: impl Into<String>) -> Self {
        Self::InvalidRow {
            field,
            raw: raw.into(),
        }
    }
}

impl From<StoreError> for PersistenceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ChatNotFound(id) => Self::NotFound(id),
            StoreError::Serialization(e) => Self::Serialization(e.to_string()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}
