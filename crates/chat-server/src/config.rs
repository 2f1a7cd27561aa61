//! Command line and environment configuration.
//!
//! Every option can be given as a flag or through the environment; a `.env`
//! file next to the binary's manifest or in the working directory is loaded
//! first by [`load_dotenv`].

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chat_stream::vendors::ollama::{OLLAMA_BACKEND, OllamaClientConfig, OllamaSource};
use chat_stream::vendors::openai::{
    OpenAiClientConfig, OpenAiReasoningEffort, OpenAiRequestOptions, OpenAiSource, openai_models,
};
use chat_stream::{ModelCatalog, ModelInfo, ServiceError, SourceRegistry, StreamOptions};
use clap::{Args, Parser, Subcommand};

/// Loads `.env` files into the process environment. Missing files are fine.
pub fn load_dotenv() {
    let _ = dotenvy::from_path(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/.env")));
    dotenvy::dotenv().ok();
}

#[derive(Debug, Parser)]
#[command(name = "chat-server")]
#[command(version, about = "Streams chat replies from local and hosted models")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server.
    Serve(ServerConfig),
    /// Stream one reply to stdout.
    Ask(AskConfig),
}

/// Settings for `chat-server serve`.
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[arg(long, env = "CHAT_BIND_ADDR", default_value = "0.0.0.0:5001")]
    pub bind_addr: SocketAddr,

    /// SQLite location, either a `sqlite:` URL or a file path.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://data/chat.db")]
    pub database_url: String,

    /// Allowed CORS origins, comma separated. Empty or `*` allows any origin.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    #[command(flatten)]
    pub backend: BackendConfig,
}

/// Settings for `chat-server ask`.
#[derive(Debug, Clone, Args)]
pub struct AskConfig {
    /// Prompt sent as the user message.
    #[arg(required = true, num_args = 1..)]
    pub prompt: Vec<String>,

    /// Model id; defaults to the catalog default.
    #[arg(long, short)]
    pub model: Option<String>,

    /// Optional system prompt.
    #[arg(long, short)]
    pub system: Option<String>,

    /// Print only the reply text instead of raw event frames.
    #[arg(long)]
    pub text: bool,

    #[command(flatten)]
    pub backend: BackendConfig,
}

impl AskConfig {
    pub fn prompt_text(&self) -> String {
        self.prompt.join(" ")
    }
}

/// Generation backends and stream tuning shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct BackendConfig {
    /// Base URL of the Ollama server.
    #[arg(long, env = "OLLAMA_HOST", default_value = "http://localhost:11434")]
    pub ollama_host: String,

    /// Model used when a request does not name one.
    #[arg(long, env = "OLLAMA_DEFAULT_MODEL", default_value = "phi3:mini")]
    pub default_model: String,

    /// Registers the OpenAI backend when set.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible endpoint, e.g. a proxy.
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    /// Sampling temperature for OpenAI requests.
    #[arg(long, env = "OPENAI_TEMPERATURE")]
    pub openai_temperature: Option<f32>,

    /// Reasoning effort for OpenAI models that support it: low, medium or high.
    #[arg(long, env = "OPENAI_REASONING_EFFORT")]
    pub openai_reasoning_effort: Option<OpenAiReasoningEffort>,

    /// Let OpenAI store responses server-side.
    #[arg(long, env = "OPENAI_STORE")]
    pub openai_store: Option<bool>,

    /// Frames buffered between a stream worker and its consumer.
    #[arg(long, env = "CHAT_STREAM_BUFFER", default_value = "1")]
    pub stream_buffer: NonZeroUsize,

    /// Fail a stream when no fragment arrives for this many seconds.
    #[arg(long, env = "CHAT_FRAGMENT_TIMEOUT_SECS")]
    pub fragment_timeout_secs: Option<u64>,
}

impl BackendConfig {
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            channel_capacity: self.stream_buffer.get(),
            fragment_timeout: self
                .fragment_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    fn openai_api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Request options applied to every OpenAI stream.
    pub fn openai_options(&self) -> OpenAiRequestOptions {
        OpenAiRequestOptions {
            store: self.openai_store,
            reasoning_effort: self.openai_reasoning_effort,
            temperature: self.openai_temperature,
        }
    }

    /// Builds the registry: Ollama always, OpenAI when a key is configured.
    ///
    /// A default model missing from the stock catalog is assumed to be a
    /// locally pulled Ollama model and is added to it.
    pub fn build_registry(&self) -> Result<SourceRegistry, ServiceError> {
        let default_model = self.default_model.trim();
        if default_model.is_empty() {
            return Err(ServiceError::Config("default model must not be empty".into()));
        }

        let ollama = OllamaSource::new(OllamaClientConfig::new(self.ollama_host.trim()))?;
        let mut catalog = ModelCatalog::ollama_defaults();
        let mut builder = SourceRegistry::builder().register_source(Arc::new(ollama));

        if let Some(api_key) = self.openai_api_key() {
            let mut client = OpenAiClientConfig::new(api_key);
            if let Some(base_url) = self
                .openai_base_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
            {
                client = client.base_url(base_url);
            }
            let openai = OpenAiSource::new(client)?.with_options(self.openai_options());
            builder = builder.register_source(Arc::new(openai));
            for model in openai_models() {
                catalog = catalog.with_model(model);
            }
        }
        if catalog.get(default_model).is_none() {
            catalog = catalog.with_model(
                ModelInfo::new(OLLAMA_BACKEND, default_model, default_model)
                    .capabilities(["chat", "text"]),
            );
        }

        builder.catalog(catalog.with_default(default_model)).build()
    }
}
