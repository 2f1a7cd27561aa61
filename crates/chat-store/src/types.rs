use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// Chats listed per user.
pub const CHAT_LIST_LIMIT: usize = 50;
/// Messages loaded as conversation history.
pub const MESSAGE_HISTORY_LIMIT: usize = 100;
/// Longest chat title, in characters.
pub const TITLE_MAX_CHARS: usize = 60;
/// Documents listed per user unless the caller asks for fewer.
pub const DOCUMENT_LIST_LIMIT: usize = 50;

/// Who can read a chat.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            other => Err(format!("unknown visibility: {other}")),
        }
    }
}

/// Input for creating a chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewChat {
    pub user_id: String,
    pub title: String,
    pub visibility: Visibility,
}

impl NewChat {
    /// Private chat titled after the opening user text.
    pub fn from_opening_text(user_id: impl Into<String>, text: &str) -> Self {
        Self {
            user_id: user_id.into(),
            title: title_from_text(text),
            visibility: Visibility::Private,
        }
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

/// A stored chat.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatRecord {
    pub id: uuid::Uuid,
    pub user_id: String,
    pub title: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a document holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    #[default]
    Text,
    Code,
    Image,
    Sheet,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [Self::Text, Self::Code, Self::Image, Self::Sheet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Code => "code",
            Self::Image => "image",
            Self::Sheet => "sheet",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(DocumentKind::as_str).collect();
                format!("Invalid kind. Must be one of: {}", names.join(", "))
            })
    }
}

/// Input for creating a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewDocument {
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub kind: DocumentKind,
}

/// A stored document (artifact).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DocumentRecord {
    pub id: uuid::Uuid,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub kind: DocumentKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for an edit suggestion on a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSuggestion {
    pub document_id: uuid::Uuid,
    pub user_id: String,
    pub original_text: String,
    pub suggested_text: String,
    pub description: Option<String>,
}

/// A stored edit suggestion.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SuggestionRecord {
    pub id: uuid::Uuid,
    pub document_id: uuid::Uuid,
    pub user_id: String,
    pub original_text: String,
    pub suggested_text: String,
    pub description: Option<String>,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// Derives a chat title: whitespace collapsed, cut to [`TITLE_MAX_CHARS`]
/// with a trailing ellipsis.
pub fn title_from_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "New chat".to_string();
    }
    if collapsed.chars().count() <= TITLE_MAX_CHARS {
        return collapsed;
    }
    let mut title: String = collapsed.chars().take(TITLE_MAX_CHARS - 3).collect();
    title.push_str("...");
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_titles_are_kept() {
        assert_eq!(title_from_text("  What is   Rust? "), "What is Rust?");
        assert_eq!(title_from_text(""), "New chat");
    }

    #[test]
    fn long_titles_are_cut_on_char_boundaries() {
        let title = title_from_text(&"é".repeat(100));
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn document_kinds_are_validated() {
        assert_eq!("sheet".parse::<DocumentKind>(), Ok(DocumentKind::Sheet));
        assert_eq!(
            "pdf".parse::<DocumentKind>(),
            Err("Invalid kind. Must be one of: text, code, image, sheet".to_string())
        );
        assert_eq!(DocumentKind::default().to_string(), "text");
    }

    #[test]
    fn visibility_round_trips_through_text() {
        assert_eq!("public".parse::<Visibility>(), Ok(Visibility::Public));
        assert!("secret".parse::<Visibility>().is_err());
        assert_eq!(Visibility::default().to_string(), "private");
    }
}
