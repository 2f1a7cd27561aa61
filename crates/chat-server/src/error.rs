use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chat_store::StoreError;
use chat_stream::{PersistenceError, ServiceError, StreamFailure};
use serde_json::json;
use tracing::error;

/// Failure of an HTTP request before any reply bytes were streamed.
///
/// Rendered as `{"error": "...", "code": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    NotFound(String),
    /// Details are logged, never sent to the client.
    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => chat_stream::errors::GENERIC_ERROR_CODE,
        }
    }

    pub fn chat_not_found() -> Self {
        Self::NotFound("Chat not found".into())
    }

    pub fn document_not_found() -> Self {
        Self::NotFound("Document not found".into())
    }

    pub fn suggestion_not_found() -> Self {
        Self::NotFound("Suggestion not found".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!(error = %detail, "request failed");
        }
        let body = Json(json!({ "error": self.to_string(), "code": self.code() }));
        (self.status(), body).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(_) | ServiceError::UnknownModel(_) => {
                Self::BadRequest(err.to_string())
            }
            ServiceError::Config(_)
            | ServiceError::BackendNotFound { .. }
            | ServiceError::Runtime(_)
            | ServiceError::Protocol(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ChatNotFound(_) => Self::chat_not_found(),
            StoreError::DocumentNotFound(_) => Self::document_not_found(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(_) => Self::chat_not_found(),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Process-level failure of `serve` or `ask`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("reply failed: {0}")]
    Reply(StreamFailure),
}
