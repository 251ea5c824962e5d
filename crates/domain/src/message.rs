use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::MessageId;

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Neutral,
    Positive,
    Negative,
}

/// One entry of a conversation.
///
/// Messages are immutable once appended; only the in-progress assistant message of a
/// streaming turn is rebuilt while deltas arrive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(with = "crate::timestamp::iso8601")]
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_turn: Option<bool>,
    /// Tool message whose citations back this assistant answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations_from: Option<MessageId>,
}

impl ChatMessage {
    pub fn new(id: MessageId, role: Role, content: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            date,
            feedback: None,
            context: None,
            end_turn: None,
            citations_from: None,
        }
    }

    /// Creates a user message with a fresh id.
    pub fn user(content: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self::new(MessageId::random(), Role::User, content, date)
    }

    /// Creates an error-role message with a fresh id.
    pub fn error(content: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self::new(MessageId::random(), Role::Error, content, date)
    }

    pub fn is_error(&self) -> bool {
        self.role == Role::Error
    }

    /// Citations carried by a tool message; any other role, or undecodable content, yields none.
    pub fn citations(&self) -> Vec<Citation> {
        if self.role != Role::Tool {
            return Vec::new();
        }

        serde_json::from_str::<ToolMessageContent>(&self.content)
            .map(|content| content.citations)
            .unwrap_or_default()
    }
}

/// Retrieval source backing part of an assistant answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filepath: Option<String>,
    #[serde(default)]
    pub chunk_id: Option<String>,
}

impl Citation {
    /// Whether the source can be opened directly; blob-storage links are not browsable.
    pub fn is_viewable(&self) -> bool {
        self.url
            .as_deref()
            .is_some_and(|url| !url.is_empty() && !url.contains("blob.core"))
    }
}

/// JSON payload of a tool-role message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMessageContent {
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub intent: String,
}
