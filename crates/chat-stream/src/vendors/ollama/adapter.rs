use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::errors::{ServiceError, SourceError};
use crate::model::BackendId;
use crate::source::{FragmentStream, GenerationRequest, GenerationSource};

use super::OLLAMA_BACKEND;
use super::codec::{LineDecoder, build_request_body, error_message, parse_line};
use super::config::OllamaClientConfig;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Generation source backed by a local Ollama server.
pub struct OllamaSource {
    client: reqwest::Client,
    config: OllamaClientConfig,
}

impl OllamaSource {
    pub fn new(config: OllamaClientConfig) -> Result<Self, ServiceError> {
        let config = config.validated()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ServiceError::Config(format!("failed to build Ollama client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a source using `OLLAMA_HOST`.
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::new(OllamaClientConfig::from_env()?)
    }

    pub fn config(&self) -> &OllamaClientConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl GenerationSource for OllamaSource {
    fn id(&self) -> BackendId {
        BackendId::new(OLLAMA_BACKEND)
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, SourceError> {
        let body = build_request_body(request, self.config.temperature);
        debug!(model = %request.model, history_len = request.history.len(), "starting Ollama generate stream");

        let response = self
            .client
            .post(self.config.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                SourceError::transport(OLLAMA_BACKEND, format!("Ollama request failed: {e}"))
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let message = error_message(&body)
                .unwrap_or_else(|| format!("Ollama generate failed with status {status}: {body}"));
            return Err(SourceError::backend(
                OLLAMA_BACKEND,
                message,
                Some(status.as_u16()),
            ));
        }

        let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
        Ok(Box::pin(fragment_stream(bytes_stream)))
    }
}

/// Decodes NDJSON chunks into text fragments. Stops reading, and drops the
/// response, as soon as a `done` line arrives.
fn fragment_stream(
    bytes_stream: ByteStream,
) -> impl futures::Stream<Item = Result<String, SourceError>> + Send + 'static {
    struct State {
        bytes_stream: Option<ByteStream>,
        decoder: LineDecoder,
        pending: VecDeque<String>,
        failure: Option<SourceError>,
    }

    stream::try_unfold(
        State {
            bytes_stream: Some(bytes_stream),
            decoder: LineDecoder::default(),
            pending: VecDeque::new(),
            failure: None,
        },
        |mut state| async move {
            loop {
                if let Some(fragment) = state.pending.pop_front() {
                    return Ok(Some((fragment, state)));
                }
                if let Some(err) = state.failure.take() {
                    return Err(err);
                }
                let Some(bytes_stream) = state.bytes_stream.as_mut() else {
                    return Ok(None);
                };

                let lines = match bytes_stream.next().await {
                    Some(Ok(chunk)) => state.decoder.push_chunk(&chunk),
                    Some(Err(e)) => {
                        return Err(SourceError::transport(
                            OLLAMA_BACKEND,
                            format!("Ollama streaming read failed: {e}"),
                        ));
                    }
                    None => {
                        state.bytes_stream = None;
                        state.decoder.finish().into_iter().collect()
                    }
                };
                for line in lines {
                    let chunk = match parse_line(&line) {
                        Ok(chunk) => chunk,
                        Err(err) => {
                            state.failure = Some(err);
                            state.bytes_stream = None;
                            break;
                        }
                    };
                    if !chunk.response.is_empty() {
                        state.pending.push_back(chunk.response);
                    }
                    if chunk.done {
                        state.bytes_stream = None;
                        break;
                    }
                }
            }
        },
    )
}
