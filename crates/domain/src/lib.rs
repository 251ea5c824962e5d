//! Conversation, draft and history-grouping model shared by the chat client crates.

pub mod conversation;
pub mod draft;
pub mod error;
pub mod history;
pub mod ids;
pub mod message;
pub mod template;
pub mod timestamp;

pub use conversation::{Conversation, DEFAULT_CONVERSATION_TITLE};
pub use draft::{
    DRAFT_TITLE_PLACEHOLDER, DraftedDocument, ExportOutline, ExportParagraph,
    SECTION_CONTENT_LIMIT, Section, Truncation, clamp_content,
};
pub use error::{DomainError, DomainResult};
pub use history::{
    GroupingPolicy, HistoryBucket, HistoryGroup, RelativeWindow, group_conversations,
    group_conversations_with, matches_title_query, merge_page,
};
pub use ids::{ConversationId, MessageId};
pub use message::{ChatMessage, Citation, Feedback, Role, ToolMessageContent};
pub use template::{
    JSON_PARSE_ERROR_TEXT, JSON_STRUCTURE_ERROR_TEXT, TemplateError, TemplateOutline,
    TemplateResult, clean_template_json, compile_template, outline_reply_text,
};
pub use timestamp::{format_timestamp, parse_timestamp};
