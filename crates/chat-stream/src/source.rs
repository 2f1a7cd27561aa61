use std::pin::Pin;

use crate::content::ChatMessage;
use crate::errors::SourceError;
use crate::model::BackendId;

/// Lazy, finite sequence of generated text fragments.
///
/// Dropping the stream releases whatever the source holds for it (HTTP
/// response, session, ...).
pub type FragmentStream =
    Pin<Box<dyn futures::Stream<Item = Result<String, SourceError>> + Send + 'static>>;

/// Input handed to a generation source. Immutable once a stream starts.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    /// Model identifier (for example `phi3:mini`).
    pub model: String,
    /// Full prior conversation, oldest first.
    pub history: Vec<ChatMessage>,
    /// Optional system directive prepended to the conversation.
    pub system_prompt: Option<String>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, history: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            history,
            system_prompt: None,
        }
    }

    pub fn system_prompt(mut self, text: impl Into<String>) -> Self {
        self.system_prompt = Some(text.into());
        self
    }
}

/// Contract implemented by every generation backend.
#[async_trait::async_trait]
pub trait GenerationSource: Send + Sync {
    /// Stable backend id.
    fn id(&self) -> BackendId;

    /// Starts generating a reply for `request`.
    ///
    /// Errors returned here, and errors yielded by the stream, both end the
    /// reply with an `error` event.
    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, SourceError>;
}
