use std::fmt;
use std::str::FromStr;

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System directive.
    System,
    /// End-user input.
    User,
    /// Model-generated reply.
    Assistant,
    /// Tool output fed back into the conversation.
    Tool,
}

impl Role {
    /// Returns the lowercase wire name for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// One content part of a message, e.g. `{"type":"text","text":"hi"}`.
///
/// Parts of kinds other than `text` are carried through untouched so the
/// stored history round-trips whatever the client sent.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MessagePart {
    /// Part kind (`text`, `file`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Text payload for `text` parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Any additional fields of non-text parts.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MessagePart {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
            extra: serde_json::Map::new(),
        }
    }

    /// Returns the text when this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        if self.kind == "text" {
            self.text.as_deref()
        } else {
            None
        }
    }
}

/// A single message in a conversation history.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<MessagePart>,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
}

impl ChatMessage {
    /// Creates a message with a single text part and no attachments.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![MessagePart::text(text)],
            attachments: Vec::new(),
        }
    }

    /// Concatenates all text parts in order and ignores non-text parts.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let Some(text) = part.as_text() {
                out.push_str(text);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_concatenates_text_parts_only() {
        let message = ChatMessage {
            role: Role::User,
            parts: vec![
                MessagePart::text("hello"),
                serde_json::from_value(serde_json::json!({"type":"file","url":"a.png"}))
                    .expect("file part"),
                MessagePart::text(" world"),
            ],
            attachments: Vec::new(),
        };
        assert_eq!(message.text_content(), "hello world");
    }

    #[test]
    fn non_text_parts_keep_their_fields() {
        let raw = serde_json::json!({"type":"file","url":"a.png","mediaType":"image/png"});
        let part: MessagePart = serde_json::from_value(raw.clone()).expect("part");
        assert_eq!(part.as_text(), None);
        assert_eq!(serde_json::to_value(&part).expect("serialize"), raw);
    }

    #[test]
    fn role_parses_lowercase_names() {
        assert_eq!("assistant".parse::<Role>(), Ok(Role::Assistant));
        assert!("robot".parse::<Role>().is_err());
    }
}
