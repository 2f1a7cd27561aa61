//! Server-sent-event framing for stream events.
//!
//! Every frame is `event: <channel>\ndata: <json>\n\n`. `serde_json` escapes
//! newlines inside strings, so the payload always fits on one `data:` line
//! and the blank line is an unambiguous frame boundary.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::errors::GENERIC_ERROR_CODE;
use crate::event::{Channel, StreamEvent};

/// One encoded, self-terminating frame.
#[derive(Clone, PartialEq, Eq)]
pub struct WireUnit(Bytes);

impl WireUnit {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Frame text; frames are always built from UTF-8 strings.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl fmt::Debug for WireUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WireUnit").field(&self.as_str()).finish()
    }
}

impl fmt::Display for WireUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<WireUnit> for Bytes {
    fn from(unit: WireUnit) -> Self {
        unit.0
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum Payload<'a> {
    MessageStart {
        id: String,
        chat_id: String,
    },
    TextDelta {
        content: &'a str,
    },
    MessageFinish {
        id: String,
    },
    Error {
        error: &'a str,
        code: &'a str,
    },
    ToolCall {
        tool: &'a str,
        input: &'a serde_json::Value,
    },
    ToolResult {
        tool: &'a str,
        output: &'a serde_json::Value,
    },
}

#[derive(Serialize)]
struct DataPayload<'a> {
    #[serde(rename = "type")]
    kind: String,
    data: &'a serde_json::Value,
}

/// Encodes `event` as one frame on `channel`.
///
/// Never fails: a payload that cannot be serialized is replaced by an
/// error payload describing why.
pub fn encode(event: &StreamEvent, channel: Channel) -> WireUnit {
    let json = payload_json(event).unwrap_or_else(|err| fallback_json(&err.to_string()));
    WireUnit(Bytes::from(format!("event: {channel}\ndata: {json}\n\n")))
}

/// Encodes `event` on its default channel.
pub fn encode_event(event: &StreamEvent) -> WireUnit {
    encode(event, event.channel())
}

fn payload_json(event: &StreamEvent) -> Result<String, serde_json::Error> {
    let payload = match event {
        StreamEvent::MessageStart {
            message_id,
            chat_id,
        } => Payload::MessageStart {
            id: message_id.to_string(),
            chat_id: chat_id.to_string(),
        },
        StreamEvent::TextDelta { content } => Payload::TextDelta { content },
        StreamEvent::MessageFinish { message_id } => Payload::MessageFinish {
            id: message_id.to_string(),
        },
        StreamEvent::Error { message, code } => Payload::Error {
            error: message,
            code,
        },
        StreamEvent::ToolCall { tool, input } => Payload::ToolCall { tool, input },
        StreamEvent::ToolResult { tool, output } => Payload::ToolResult { tool, output },
        StreamEvent::Data { kind, data } => {
            return serde_json::to_string(&DataPayload {
                kind: format!("data-{kind}"),
                data,
            });
        }
    };
    serde_json::to_string(&payload)
}

fn fallback_json(reason: &str) -> String {
    let message = serde_json::Value::String(format!("unencodable event: {reason}"));
    format!(r#"{{"type":"error","error":{message},"code":"{GENERIC_ERROR_CODE}"}}"#)
}
