//! OpenAI integration over the streaming Responses API.
mod adapter;
mod config;
mod options;
pub(crate) mod transport;

pub use adapter::OpenAiSource;
pub use config::OpenAiClientConfig;
pub use options::{OpenAiReasoningEffort, OpenAiRequestOptions};

use crate::model::ModelInfo;

/// Backend id under which [`OpenAiSource`] registers.
pub const OPENAI_BACKEND: &str = "openai";

/// Hosted models offered when the OpenAI backend is configured.
pub fn openai_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::new(OPENAI_BACKEND, "gpt-5-nano", "GPT-5 nano")
            .description("Hosted low-latency model")
            .capabilities(["chat", "text"]),
        ModelInfo::new(OPENAI_BACKEND, "gpt-4o-mini", "GPT-4o mini")
            .description("Hosted multimodal model")
            .capabilities(["chat", "text", "vision"]),
    ]
}
