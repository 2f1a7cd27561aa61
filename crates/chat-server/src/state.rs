use std::sync::Arc;

use chat_store::{ChatRepository, DocumentRepository};
use chat_stream::StreamCoordinator;

/// Application state shared across all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: StreamCoordinator,
    pub store: Arc<dyn ChatRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    /// Reported by the health endpoint.
    pub ollama_host: Option<String>,
}

impl AppState {
    /// Wires a coordinator that persists replies into `store`.
    pub fn new(
        registry: Arc<chat_stream::SourceRegistry>,
        store: Arc<dyn ChatRepository>,
        documents: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self {
            coordinator: StreamCoordinator::new(registry, store.clone()),
            store,
            documents,
            ollama_host: None,
        }
    }

    pub fn with_stream_options(mut self, options: chat_stream::StreamOptions) -> Self {
        self.coordinator = self.coordinator.with_options(options);
        self
    }

    pub fn with_ollama_host(mut self, host: impl Into<String>) -> Self {
        self.ollama_host = Some(host.into());
        self
    }
}
