use std::fmt;
use std::time::Duration;

/// Stable identifier for a generation backend (for example `ollama`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BackendId(pub String);

impl BackendId {
    /// Creates a backend id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the backend id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BackendId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Catalog entry describing one selectable model.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    /// Backend-specific model name (for example `phi3:mini`).
    pub id: String,
    pub name: String,
    pub description: String,
    pub size: String,
    pub capabilities: Vec<String>,
    /// Backend that serves this model.
    pub backend: BackendId,
}

impl ModelInfo {
    /// Creates a catalog entry with no description, size or capabilities.
    pub fn new(
        backend: impl Into<BackendId>,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            size: String::new(),
            capabilities: Vec::new(),
            backend: backend.into(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    pub fn capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }
}

/// Ordered set of models a registry can serve, plus the default choice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelCatalog {
    models: Vec<ModelInfo>,
    default_model: Option<String>,
}

impl ModelCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock local-model catalog served by an Ollama backend.
    pub fn ollama_defaults() -> Self {
        let backend = crate::vendors::ollama::OLLAMA_BACKEND;
        Self::new()
            .with_model(
                ModelInfo::new(backend, "phi3:mini", "Phi-3 Mini")
                    .description("Fast 3.8B model for testing and quick responses")
                    .size("3.8B")
                    .capabilities(["chat", "text"]),
            )
            .with_model(
                ModelInfo::new(backend, "llama3.2:3b", "Llama 3.2 3B")
                    .description("Efficient 3B model with good performance")
                    .size("3B")
                    .capabilities(["chat", "text"]),
            )
            .with_model(
                ModelInfo::new(backend, "llama3.2:11b-vision", "Llama 3.2 Vision 11B")
                    .description("Multimodal model with vision and text capabilities")
                    .size("11B")
                    .capabilities(["chat", "text", "vision"]),
            )
            .with_model(
                ModelInfo::new(backend, "qwen2.5:7b", "Qwen 2.5 7B")
                    .description("Multilingual model with strong reasoning")
                    .size("7B")
                    .capabilities(["chat", "text", "multilingual"]),
            )
            .with_model(
                ModelInfo::new(backend, "mixtral:8x7b", "Mixtral 8x7B")
                    .description("Powerful mixture-of-experts model")
                    .size("47B")
                    .capabilities(["chat", "text", "reasoning"]),
            )
            .with_default("phi3:mini")
    }

    /// Adds (or replaces) a model entry.
    pub fn with_model(mut self, model: ModelInfo) -> Self {
        self.models.retain(|existing| existing.id != model.id);
        self.models.push(model);
        self
    }

    /// Sets the model used when a request does not name one.
    pub fn with_default(mut self, model_id: impl Into<String>) -> Self {
        self.default_model = Some(model_id.into());
        self
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|model| model.id == model_id)
    }

    pub fn models(&self) -> &[ModelInfo] {
        &self.models
    }

    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }
}

/// Per-stream delivery options.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct StreamOptions {
    /// Bounded buffer between the worker and the consumer, in wire units.
    pub channel_capacity: usize,
    /// Longest wait for the next fragment before the stream fails.
    pub fragment_timeout: Option<Duration>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            channel_capacity: 1,
            fragment_timeout: None,
        }
    }
}
