use crate::errors::SourceError;
use crate::sse::SseFrame;

use super::OPENAI_BACKEND;

/// What one Responses API frame means for the reply text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResponseFrame {
    Delta(String),
    Completed,
    Ignored,
}

pub(crate) fn map_openai_frame(frame: &SseFrame) -> Result<ResponseFrame, SourceError> {
    let data = frame.data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(ResponseFrame::Ignored);
    }
    let value: serde_json::Value = frame.json().map_err(|e| {
        SourceError::protocol(OPENAI_BACKEND, format!("invalid SSE JSON frame: {e}"))
    })?;
    map_openai_json(&value)
}

pub(crate) fn map_openai_json(value: &serde_json::Value) -> Result<ResponseFrame, SourceError> {
    let Some(event_type) = value.get("type").and_then(|v| v.as_str()) else {
        return Ok(ResponseFrame::Ignored);
    };
    match event_type {
        "response.output_text.delta" => Ok(value
            .get("delta")
            .and_then(|v| v.as_str())
            .map(|delta| ResponseFrame::Delta(delta.to_string()))
            .unwrap_or(ResponseFrame::Ignored)),
        "response.completed" => Ok(ResponseFrame::Completed),
        "response.error" | "response.failed" | "error" => {
            let message = value
                .get("error")
                .and_then(|e| e.get("message"))
                .or_else(|| {
                    value
                        .get("response")
                        .and_then(|r| r.get("error"))
                        .and_then(|e| e.get("message"))
                })
                .or_else(|| value.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("OpenAI stream error");
            Err(SourceError::backend(OPENAI_BACKEND, message, None))
        }
        _ => Ok(ResponseFrame::Ignored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: &str) -> SseFrame {
        SseFrame {
            event: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn maps_delta_and_completed() {
        let delta = map_openai_frame(&frame(
            r#"{"type":"response.output_text.delta","delta":"Hi"}"#,
        ))
        .expect("delta");
        assert_eq!(delta, ResponseFrame::Delta("Hi".into()));

        let done = map_openai_frame(&frame(
            r#"{"type":"response.completed","response":{"status":"completed","output":[]}}"#,
        ))
        .expect("completed");
        assert_eq!(done, ResponseFrame::Completed);
    }

    #[test]
    fn unrelated_and_done_frames_are_ignored() {
        assert_eq!(
            map_openai_frame(&frame(r#"{"type":"response.created"}"#)).expect("created"),
            ResponseFrame::Ignored
        );
        assert_eq!(
            map_openai_frame(&frame("[DONE]")).expect("done marker"),
            ResponseFrame::Ignored
        );
    }

    #[test]
    fn failed_response_becomes_backend_error() {
        let err = map_openai_frame(&frame(
            r#"{"type":"response.failed","response":{"error":{"message":"quota exceeded"}}}"#,
        ))
        .expect_err("failed");
        assert!(matches!(err, SourceError::Backend { .. }));
        assert_eq!(err.message(), "quota exceeded");
    }

    #[test]
    fn malformed_json_is_a_protocol_error() {
        let err = map_openai_frame(&frame("{oops")).expect_err("malformed");
        assert!(matches!(err, SourceError::Protocol { .. }));
    }
}
