//! Ollama integration: local models streamed from `/api/generate`.
mod adapter;
pub(crate) mod codec;
mod config;

pub use adapter::OllamaSource;
pub use config::OllamaClientConfig;

/// Backend id under which [`OllamaSource`] registers.
pub const OLLAMA_BACKEND: &str = "ollama";
