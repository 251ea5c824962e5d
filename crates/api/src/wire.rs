use chrono::{DateTime, Utc};
use docdraft_domain::{ChatMessage, Conversation, ConversationId, Feedback, MessageId, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /conversation` and `POST /history/generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub messages: Vec<ChatMessage>,
}

impl ConversationRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            conversation_id: None,
            messages,
        }
    }

    pub fn for_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }
}

/// One decoded object of a streamed completion body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultFrame {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub choices: Vec<FrameChoice>,
    #[serde(default)]
    pub history_metadata: Option<HistoryMetadata>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FrameChoice {
    #[serde(default)]
    pub messages: Vec<FrameMessage>,
}

/// Message fragment as sent by the server; its id and date are replaced on receipt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FrameMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub end_turn: Option<bool>,
}

impl FrameMessage {
    pub fn into_chat_message(self, id: MessageId, received_at: DateTime<Utc>) -> ChatMessage {
        let mut message = ChatMessage::new(id, self.role, self.content, received_at);
        message.context = self.context;
        message.end_turn = self.end_turn;
        message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryMetadata {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub date: Option<String>,
}

impl HistoryMetadata {
    /// Server date of the conversation, or `fallback` when absent or unreadable.
    pub fn date_or(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.date
            .as_deref()
            .and_then(|raw| docdraft_domain::parse_timestamp(raw).ok())
            .unwrap_or(fallback)
    }
}

impl ResultFrame {
    /// Messages of the first choice; later choices are ignored.
    pub fn messages(&self) -> &[FrameMessage] {
        self.choices
            .first()
            .map(|choice| choice.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn into_messages(self) -> Vec<FrameMessage> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.messages)
            .unwrap_or_default()
    }

    /// Whether the first message of the first choice carries any content.
    pub fn has_leading_content(&self) -> bool {
        self.messages()
            .first()
            .is_some_and(|message| !message.content.is_empty())
    }

    pub fn has_assistant_fragment(&self) -> bool {
        self.messages()
            .iter()
            .any(|message| message.role == Role::Assistant)
    }

    /// Remote error text: a bare string, or the `message` of an error object.
    pub fn error_message(&self) -> Option<String> {
        error_text(self.error.as_ref()?)
    }
}

/// Normalizes an `error` payload that may be a string or an object with `message`.
pub fn error_text(error: &Value) -> Option<String> {
    match error {
        Value::Null => None,
        Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Object(fields) => match fields.get("message") {
            Some(Value::String(message)) => Some(message.clone()),
            _ => Some(error.to_string()),
        },
        other => Some(other.to_string()),
    }
}

/// Error body returned alongside a non-success status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<Value>,
}

impl ErrorBody {
    pub fn message(&self) -> Option<String> {
        self.error.as_ref().and_then(error_text)
    }
}

/// Row of `GET /history/list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryListEntry {
    pub id: ConversationId,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<String>,
}

impl HistoryListEntry {
    /// Listed conversations arrive without messages; unreadable dates sort as the epoch.
    pub fn into_conversation(self) -> Conversation {
        let date = self
            .created_at
            .as_deref()
            .or(self.updated_at.as_deref())
            .and_then(|raw| docdraft_domain::parse_timestamp(raw).ok())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Conversation::new(self.id, self.title, date)
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ConversationIdBody<'a> {
    pub conversation_id: &'a ConversationId,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RenameBody<'a> {
    pub conversation_id: &'a ConversationId,
    pub title: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct UpdateBody<'a> {
    pub conversation_id: &'a ConversationId,
    pub messages: &'a [ChatMessage],
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HistoryReadResponse {
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

/// Message as stored by the history service.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StoredMessage {
    pub id: MessageId,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub feedback: Option<Feedback>,
    #[serde(default)]
    pub context: Option<String>,
}

impl StoredMessage {
    pub fn into_chat_message(self) -> ChatMessage {
        let date = self
            .created_at
            .as_deref()
            .and_then(|raw| docdraft_domain::parse_timestamp(raw).ok())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let mut message = ChatMessage::new(self.id, self.role, self.content, date);
        message.feedback = self.feedback;
        message.context = self.context;
        message
    }
}

/// Availability of the remote history store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HistoryHealth {
    #[default]
    Unknown,
    Working,
    NotConfigured,
    NotWorking(String),
}

impl HistoryHealth {
    pub fn is_working(&self) -> bool {
        matches!(self, Self::Working)
    }

    /// Maps the `/history/ensure` error text to a health state.
    pub(crate) fn from_error_text(text: &str) -> Self {
        if text.to_lowercase().contains("not configured") {
            Self::NotConfigured
        } else {
            Self::NotWorking(text.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserClaim {
    pub typ: String,
    #[serde(default)]
    pub val: String,
}

/// One claim set of `GET /user/info`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_claims: Vec<UserClaim>,
}

/// Value of the first `name` claim across all claim sets, or an empty string.
pub fn display_name(infos: &[UserInfo]) -> String {
    infos
        .iter()
        .flat_map(|info| info.user_claims.iter())
        .find(|claim| claim.typ == "name")
        .map(|claim| claim.val.clone())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SectionGenerateBody<'a> {
    pub section_title: &'a str,
    pub section_description: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SectionGenerateResponse {
    #[serde(default)]
    pub section_content: String,
}

/// Citation drill-through payload of `GET /document/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct DocumentContent {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub full_content: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn frame_error_accepts_string_or_object() {
        let plain: ResultFrame = serde_json::from_value(json!({"error": "boom"})).unwrap();
        let nested: ResultFrame =
            serde_json::from_value(json!({"error": {"message": "rate limited", "code": 429}})).unwrap();
        let none: ResultFrame = serde_json::from_value(json!({"id": "1", "error": null})).unwrap();

        assert_eq!(plain.error_message().as_deref(), Some("boom"));
        assert_eq!(nested.error_message().as_deref(), Some("rate limited"));
        assert_eq!(none.error_message(), None);
    }

    #[test]
    fn leading_content_checks_first_message_only() {
        let frame: ResultFrame = serde_json::from_value(json!({
            "id": "1",
            "choices": [{"messages": [
                {"role": "tool", "content": ""},
                {"role": "assistant", "content": "hi"}
            ]}]
        }))
        .unwrap();

        assert!(!frame.has_leading_content());
        assert!(frame.has_assistant_fragment());
    }

    #[test]
    fn display_name_uses_first_name_claim() {
        let infos: Vec<UserInfo> = serde_json::from_value(json!([
            {"user_claims": [{"typ": "email", "val": "a@b.c"}]},
            {"user_claims": [{"typ": "name", "val": "Ada"}, {"typ": "name", "val": "Other"}]}
        ]))
        .unwrap();

        assert_eq!(display_name(&infos), "Ada");
        assert_eq!(display_name(&[]), "");
    }

    #[test]
    fn listed_entry_without_date_falls_back_to_epoch() {
        let entry: HistoryListEntry =
            serde_json::from_value(json!({"id": "c1", "title": ""})).unwrap();
        let conversation = entry.into_conversation();
        assert_eq!(conversation.date, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(conversation.title, docdraft_domain::DEFAULT_CONVERSATION_TITLE);
    }

    #[test]
    fn ensure_error_text_maps_to_health() {
        assert_eq!(
            HistoryHealth::from_error_text("CosmosDB is not configured"),
            HistoryHealth::NotConfigured
        );
        assert_eq!(
            HistoryHealth::from_error_text("Invalid credentials"),
            HistoryHealth::NotWorking("Invalid credentials".to_string())
        );
    }
}
