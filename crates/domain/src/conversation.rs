use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ConversationId, MessageId};
use super::message::{ChatMessage, Citation, Role};

/// Default title used when a conversation has no usable first question.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// One chat session: ordered messages plus history metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    #[serde(with = "crate::timestamp::iso8601")]
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(id: ConversationId, title: impl Into<String>, date: DateTime<Utc>) -> Self {
        let mut title = title.into();
        if title.trim().is_empty() {
            title = DEFAULT_CONVERSATION_TITLE.to_string();
        }

        Self {
            id,
            title,
            date,
            messages: Vec::new(),
        }
    }

    /// Starts a locally-minted conversation whose title is the opening question.
    pub fn from_first_message(first: ChatMessage) -> Self {
        let mut conversation = Self::new(ConversationId::random(), first.content.clone(), first.date);
        conversation.messages.push(first);
        conversation
    }

    pub fn latest_assistant_message(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
    }

    /// Messages sent back to the model; error-role entries are local-only.
    pub fn request_messages(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|message| !message.is_error())
            .cloned()
            .collect()
    }

    /// Citations attached to one assistant answer through its explicit tool-message link.
    pub fn citations_for(&self, assistant_id: &MessageId) -> Vec<Citation> {
        let Some(tool_id) = self
            .messages
            .iter()
            .find(|message| message.role == Role::Assistant && &message.id == assistant_id)
            .and_then(|message| message.citations_from.as_ref())
        else {
            return Vec::new();
        };

        self.messages
            .iter()
            .find(|message| message.role == Role::Tool && &message.id == tool_id)
            .map(ChatMessage::citations)
            .unwrap_or_default()
    }
}
