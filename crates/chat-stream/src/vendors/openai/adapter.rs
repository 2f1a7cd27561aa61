use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::content::Role;
use crate::errors::{ServiceError, SourceError};
use crate::model::BackendId;
use crate::source::{FragmentStream, GenerationRequest, GenerationSource};
use crate::sse::SseDecoder;

use super::OPENAI_BACKEND;
use super::config::OpenAiClientConfig;
use super::options::OpenAiRequestOptions;
use super::transport::{ResponseFrame, map_openai_frame};

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Generation source for OpenAI's Responses API (streaming).
pub struct OpenAiSource {
    client: reqwest::Client,
    config: OpenAiClientConfig,
    options: OpenAiRequestOptions,
}

impl OpenAiSource {
    pub fn new(config: OpenAiClientConfig) -> Result<Self, ServiceError> {
        if config.api_key.trim().is_empty() {
            return Err(ServiceError::Config(
                "OpenAI client config api_key must not be empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ServiceError::Config(format!("failed to build OpenAI client: {e}")))?;
        Ok(Self {
            client,
            config,
            options: OpenAiRequestOptions::default(),
        })
    }

    /// Creates a source using `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::new(OpenAiClientConfig::from_env()?)
    }

    pub fn with_options(mut self, options: OpenAiRequestOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait::async_trait]
impl GenerationSource for OpenAiSource {
    fn id(&self) -> BackendId {
        BackendId::new(OPENAI_BACKEND)
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, SourceError> {
        let body = build_request_body(request, &self.options);
        debug!(model = %request.model, history_len = request.history.len(), "starting OpenAI responses stream");

        let response = self
            .client
            .post(self.config.responses_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                SourceError::transport(OPENAI_BACKEND, format!("OpenAI request failed: {e}"))
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SourceError::backend(
                OPENAI_BACKEND,
                format!("OpenAI responses request failed with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }

        let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
        Ok(Box::pin(fragment_stream(bytes_stream)))
    }
}

/// Maps the conversation onto Responses API input items.
pub(crate) fn build_request_body(
    request: &GenerationRequest,
    options: &OpenAiRequestOptions,
) -> serde_json::Value {
    let mut input = Vec::with_capacity(request.history.len() + 1);
    if let Some(system_prompt) = request.system_prompt.as_deref() {
        input.push(serde_json::json!({ "role": "system", "content": system_prompt }));
    }
    for message in &request.history {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => continue,
        };
        let content = message.text_content();
        if content.is_empty() {
            continue;
        }
        input.push(serde_json::json!({ "role": role, "content": content }));
    }

    let mut body = serde_json::json!({
        "model": request.model,
        "input": input,
        "stream": true,
        "store": options.store.unwrap_or(false),
    });
    if let Some(effort) = options.reasoning_effort {
        body["reasoning"] = serde_json::json!({ "effort": effort });
    }
    if let Some(temperature) = options.temperature {
        body["temperature"] = serde_json::json!(temperature);
    }
    body
}

fn fragment_stream(
    bytes_stream: ByteStream,
) -> impl futures::Stream<Item = Result<String, SourceError>> + Send + 'static {
    struct State {
        bytes_stream: Option<ByteStream>,
        decoder: SseDecoder,
        pending: VecDeque<String>,
        failure: Option<SourceError>,
    }

    stream::try_unfold(
        State {
            bytes_stream: Some(bytes_stream),
            decoder: SseDecoder::default(),
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

                match bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        for frame in state.decoder.push_chunk(&chunk) {
                            match map_openai_frame(&frame) {
                                Ok(ResponseFrame::Delta(text)) if !text.is_empty() => {
                                    state.pending.push_back(text);
                                }
                                Ok(ResponseFrame::Completed) => {
                                    state.bytes_stream = None;
                                    break;
                                }
                                Ok(ResponseFrame::Delta(_) | ResponseFrame::Ignored) => {}
                                Err(err) => {
                                    // Deltas decoded ahead of the failure are still delivered.
                                    state.failure = Some(err);
                                    state.bytes_stream = None;
                                    break;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Err(SourceError::transport(
                            OPENAI_BACKEND,
                            format!("OpenAI streaming read failed: {e}"),
                        ));
                    }
                    None => state.bytes_stream = None,
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ChatMessage;
    use crate::vendors::openai::OpenAiReasoningEffort;

    fn request() -> GenerationRequest {
        GenerationRequest::new(
            "gpt-5-nano",
            vec![
                ChatMessage::text(Role::User, "Hi"),
                ChatMessage::text(Role::Assistant, "Hello!"),
                ChatMessage::text(Role::Tool, "skipped"),
                ChatMessage::text(Role::User, "Weather?"),
            ],
        )
        .system_prompt("sys")
    }

    #[test]
    fn history_becomes_input_items() {
        let body = build_request_body(&request(), &OpenAiRequestOptions::default());
        assert_eq!(body["stream"], true);
        assert_eq!(body["store"], false);
        let input = body["input"].as_array().expect("input");
        let roles: Vec<&str> = input.iter().filter_map(|i| i["role"].as_str()).collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(input[3]["content"], "Weather?");
        assert!(body.get("reasoning").is_none());
    }

    #[test]
    fn options_are_applied() {
        let body = build_request_body(
            &request(),
            &OpenAiRequestOptions::default()
                .store(true)
                .reasoning_effort(OpenAiReasoningEffort::Low),
        );
        assert_eq!(body["store"], true);
        assert_eq!(body["reasoning"]["effort"], "low");
    }

    #[tokio::test]
    async fn decodes_deltas_until_completed() {
        let chunks: Vec<Result<bytes::Bytes, reqwest::Error>> = vec![
            Ok(bytes::Bytes::from_static(
                b"event: response.created\ndata: {\"type\":\"response.created\"}\n\ndata: {\"type\":\"response.output_text.delta\",\"delta\":\"Hel",
            )),
            Ok(bytes::Bytes::from_static(
                b"\"}\n\ndata: {\"type\":\"response.output_text.delta\",\"delta\":\"lo\"}\n\ndata: {\"type\":\"response.completed\"}\n\n",
            )),
        ];
        let items: Vec<Result<String, SourceError>> =
            fragment_stream(Box::pin(stream::iter(chunks))).collect().await;
        assert_eq!(items, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
    }

    #[tokio::test]
    async fn failed_frame_ends_with_error() {
        let chunks: Vec<Result<bytes::Bytes, reqwest::Error>> = vec![Ok(bytes::Bytes::from_static(
            b"data: {\"type\":\"response.output_text.delta\",\"delta\":\"Par\"}\n\ndata: {\"type\":\"response.failed\",\"error\":{\"message\":\"timeout\"}}\n\n",
        ))];
        let items: Vec<Result<String, SourceError>> =
            fragment_stream(Box::pin(stream::iter(chunks))).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("Par".to_string()));
        assert_eq!(items[1].clone().expect_err("error").message(), "timeout");
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(OpenAiSource::new(OpenAiClientConfig::new("  ")).is_err());
    }
}
