use std::fmt;

use crate::errors::{GENERIC_ERROR_CODE, StreamFailure};

/// Logical partition label a client uses to demultiplex frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Lifecycle and content events.
    Message,
    /// Terminal failures.
    Error,
    /// Tool call/result envelopes.
    Tool,
    /// Custom data payloads.
    Data,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Error => "error",
            Self::Tool => "tool",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed outbound events of one reply stream.
///
/// A stream carries exactly one `MessageStart`, then any number of
/// `TextDelta`s, then exactly one of `MessageFinish` or `Error`.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    MessageStart {
        message_id: uuid::Uuid,
        chat_id: uuid::Uuid,
    },
    TextDelta {
        content: String,
    },
    MessageFinish {
        message_id: uuid::Uuid,
    },
    Error {
        message: String,
        code: String,
    },
    ToolCall {
        tool: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool: String,
        output: serde_json::Value,
    },
    Data {
        kind: String,
        data: serde_json::Value,
    },
}

impl StreamEvent {
    /// Error event with the generic error code.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: GENERIC_ERROR_CODE.to_string(),
        }
    }

    /// Channel this event is sent on unless the caller picks another.
    pub fn channel(&self) -> Channel {
        match self {
            Self::MessageStart { .. } | Self::TextDelta { .. } | Self::MessageFinish { .. } => {
                Channel::Message
            }
            Self::Error { .. } => Channel::Error,
            Self::ToolCall { .. } | Self::ToolResult { .. } => Channel::Tool,
            Self::Data { .. } => Channel::Data,
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MessageFinish { .. } | Self::Error { .. })
    }
}

impl From<&StreamFailure> for StreamEvent {
    fn from(failure: &StreamFailure) -> Self {
        Self::Error {
            message: failure.to_string(),
            code: failure.code().to_string(),
        }
    }
}
