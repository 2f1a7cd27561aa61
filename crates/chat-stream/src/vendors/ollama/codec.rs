use serde::Deserialize;

use crate::content::Role;
use crate::errors::SourceError;
use crate::source::GenerationRequest;

use super::OLLAMA_BACKEND;

/// Flattens the conversation into a single completion prompt.
///
/// Blocks are separated by a blank line and the prompt always ends with an
/// open `Assistant:` turn. System and tool messages in the history, and
/// messages without text, are left out.
pub(crate) fn render_prompt(request: &GenerationRequest) -> String {
    let mut blocks = Vec::with_capacity(request.history.len() + 2);
    if let Some(system_prompt) = request.system_prompt.as_deref() {
        blocks.push(format!("System: {system_prompt}\n"));
    }
    for message in &request.history {
        let content = message.text_content();
        if content.is_empty() {
            continue;
        }
        match message.role {
            Role::User => blocks.push(format!("User: {content}")),
            Role::Assistant => blocks.push(format!("Assistant: {content}")),
            Role::System | Role::Tool => {}
        }
    }
    blocks.push("Assistant:".to_string());
    blocks.join("\n\n")
}

pub(crate) fn build_request_body(
    request: &GenerationRequest,
    temperature: f32,
) -> serde_json::Value {
    serde_json::json!({
        "model": request.model,
        "prompt": render_prompt(request),
        "stream": true,
        "options": { "temperature": temperature },
    })
}

/// One line of the `/api/generate` stream.
#[derive(Debug, Deserialize, PartialEq)]
pub(crate) struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Splits a byte stream into complete lines.
#[derive(Default)]
pub(crate) struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=idx).collect();
            let line = String::from_utf8_lossy(&line).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Returns a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&std::mem::take(&mut self.buf))
            .trim()
            .to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Parses one NDJSON line. An `error` field becomes a backend error.
pub(crate) fn parse_line(line: &str) -> Result<GenerateChunk, SourceError> {
    let chunk: GenerateChunk = serde_json::from_str(line).map_err(|e| {
        SourceError::protocol(OLLAMA_BACKEND, format!("invalid Ollama stream line: {e}"))
    })?;
    if let Some(message) = chunk.error.as_deref() {
        return Err(SourceError::backend(OLLAMA_BACKEND, message, None));
    }
    Ok(chunk)
}

/// Extracts the `error` message from a non-success response body.
pub(crate) fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("error")?
        .as_str()
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ChatMessage;

    #[test]
    fn prompt_has_system_line_turns_and_open_assistant() {
        let request = GenerationRequest::new(
            "phi3:mini",
            vec![
                ChatMessage::text(Role::User, "Hi"),
                ChatMessage::text(Role::Assistant, "Hello!"),
                ChatMessage::text(Role::Tool, "ignored"),
                ChatMessage::text(Role::User, ""),
                ChatMessage::text(Role::User, "How are you?"),
            ],
        )
        .system_prompt("Be brief.");

        assert_eq!(
            render_prompt(&request),
            "System: Be brief.\n\n\nUser: Hi\n\nAssistant: Hello!\n\nUser: How are you?\n\nAssistant:"
        );
    }

    #[test]
    fn request_body_streams_with_temperature() {
        let request = GenerationRequest::new("phi3:mini", vec![ChatMessage::text(Role::User, "x")]);
        let body = build_request_body(&request, 0.7);
        assert_eq!(body["model"], "phi3:mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["prompt"], "User: x\n\nAssistant:");
        let temperature = body["options"]["temperature"].as_f64().expect("temperature");
        assert!((temperature - 0.7).abs() < 1e-6);
    }

    #[test]
    fn line_decoder_reassembles_split_lines() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push_chunk(b"{\"response\":\"He").is_empty());
        let lines = decoder.push_chunk(b"l\"}\n\n{\"response\":\"lo\"}\n{\"done\"");
        assert_eq!(lines, ["{\"response\":\"Hel\"}", "{\"response\":\"lo\"}"]);
        assert_eq!(decoder.finish().as_deref(), Some("{\"done\""));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn parses_fragments_done_and_errors() {
        let chunk = parse_line(r#"{"model":"phi3:mini","response":"Hi","done":false}"#)
            .expect("fragment");
        assert_eq!(chunk.response, "Hi");
        assert!(!chunk.done);

        let done = parse_line(r#"{"response":"","done":true,"eval_count":12}"#).expect("done");
        assert!(done.done);

        let err = parse_line(r#"{"error":"model 'nope' not found"}"#).expect_err("error line");
        assert_eq!(err.message(), "model 'nope' not found");

        assert!(matches!(
            parse_line("not json"),
            Err(SourceError::Protocol { .. })
        ));
    }

    #[test]
    fn error_message_reads_json_bodies_only() {
        assert_eq!(
            error_message(r#"{"error":"model not found"}"#).as_deref(),
            Some("model not found")
        );
        assert_eq!(error_message("bad gateway"), None);
    }
}
