use crate::model::BackendId;

/// Error code carried by every `error` event; streams do not differentiate
/// failure kinds on the wire.
pub const GENERIC_ERROR_CODE: &str = "internal_error";

/// Errors raised by a generation source, before or during a stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Backend answered with an application-level failure (HTTP status, model missing, etc.).
    #[error("backend error ({backend}): {message}")]
    Backend {
        backend: BackendId,
        message: String,
        status_code: Option<u16>,
    },
    /// Transport or stream I/O failed.
    #[error("transport error ({backend}): {message}")]
    Transport { backend: BackendId, message: String },
    /// Backend response shape was invalid.
    #[error("protocol error ({backend}): {message}")]
    Protocol { backend: BackendId, message: String },
}

impl SourceError {
    /// Creates a backend-level error.
    pub fn backend(
        backend: impl Into<BackendId>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Creates a transport-level error.
    pub fn transport(backend: impl Into<BackendId>, message: impl Into<String>) -> Self {
        Self::Transport {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(backend: impl Into<BackendId>, message: impl Into<String>) -> Self {
        Self::Protocol {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Returns the backend associated with this error.
    pub fn backend_id(&self) -> &BackendId {
        match self {
            Self::Backend { backend, .. }
            | Self::Transport { backend, .. }
            | Self::Protocol { backend, .. } => backend,
        }
    }

    /// Returns the bare failure description, without the backend prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Backend { message, .. }
            | Self::Transport { message, .. }
            | Self::Protocol { message, .. } => message,
        }
    }
}

/// Terminal failure of a started stream, delivered as the `error` event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamFailure {
    /// The generation source failed before or during the stream.
    #[error("{0}")]
    Source(String),
    /// No fragment arrived within the configured fragment timeout.
    #[error("timed out waiting for the next fragment")]
    Timeout,
}

impl StreamFailure {
    /// Wire code for this failure.
    pub fn code(&self) -> &'static str {
        GENERIC_ERROR_CODE
    }
}

impl From<&SourceError> for StreamFailure {
    fn from(err: &SourceError) -> Self {
        Self::Source(err.message().to_string())
    }
}

/// Errors reported by a persistence sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    /// The durable store could not be reached or rejected the write.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// The chat the message belongs to does not exist.
    #[error("chat not found: {0}")]
    NotFound(uuid::Uuid),
    /// Message content could not be encoded for storage.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors raised before a stream starts. These are the only failures that
/// surface as transport-level error responses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Invalid registry/backend configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid request input.
    #[error("validation error: {0}")]
    Validation(String),
    /// Requested model is not in the catalog.
    #[error("unknown model: {0}")]
    UnknownModel(String),
    /// Catalog names a backend that was never registered.
    #[error("backend not registered: {backend}")]
    BackendNotFound { backend: BackendId },
    /// The per-stream execution context could not be created.
    #[error("runtime error: {0}")]
    Runtime(String),
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ServiceError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
