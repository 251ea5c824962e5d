use chrono::{DateTime, Utc};
use docdraft_api::{HistoryMetadata, ResultFrame};
use docdraft_domain::{ChatMessage, MessageId, Role};
use snafu::Snafu;

/// Fixed text of the error appended when a persisted turn returns an empty first message.
pub const NO_CONTENT_ERROR_TEXT: &str = "No content in messages object.";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TurnError {
    #[snafu(display("{}", NO_CONTENT_ERROR_TEXT))]
    NoContent { stage: &'static str },
}

pub type TurnResult<T> = Result<T, TurnError>;

/// What the conversation view shows for the turn in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDisplay {
    /// Request sent, no assistant text yet; the loading indicator is visible.
    Waiting,
    Streaming,
    Finished,
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEnd {
    Completed,
    Failed,
    Cancelled,
}

/// Folds the result frames of one turn into the conversation's message list.
///
/// The assistant message is rebuilt from the concatenated content of every assistant fragment;
/// the tool message carrying citations precedes it and is linked from it by id.
#[derive(Debug, Clone)]
pub struct TurnReconciler {
    prior: Vec<ChatMessage>,
    user_message: ChatMessage,
    require_content: bool,
    assistant: Option<ChatMessage>,
    assistant_content: String,
    tool: Option<ChatMessage>,
    error: Option<ChatMessage>,
    history_metadata: Option<HistoryMetadata>,
    display: TurnDisplay,
    end: Option<TurnEnd>,
}

impl TurnReconciler {
    /// `prior` holds the conversation's messages before `user_message` was asked.
    pub fn new(prior: Vec<ChatMessage>, user_message: ChatMessage) -> Self {
        Self {
            prior,
            user_message,
            require_content: false,
            assistant: None,
            assistant_content: String::new(),
            tool: None,
            error: None,
            history_metadata: None,
            display: TurnDisplay::Waiting,
            end: None,
        }
    }

    /// Rejects frames whose first message is empty; used when the turn is persisted.
    pub fn require_content(mut self, require_content: bool) -> Self {
        self.require_content = require_content;
        self
    }

    pub fn apply_frame(&mut self, frame: ResultFrame, received_at: DateTime<Utc>) -> TurnResult<()> {
        if self.end.is_some() {
            return Ok(());
        }
        // The server id is kept even when the frame itself is rejected.
        if self.history_metadata.is_none() {
            self.history_metadata = frame.history_metadata.clone();
        }

        if self.require_content && !frame.has_leading_content() {
            return NoContentSnafu {
                stage: "reconcile-frame",
            }
            .fail();
        }

        let frame_id = MessageId::new(frame.id.clone());
        for fragment in frame.into_messages() {
            let message = fragment.into_chat_message(frame_id.clone(), received_at);
            match message.role {
                Role::Assistant => self.apply_assistant(message, received_at),
                Role::Tool => self.tool = Some(message),
                role => {
                    tracing::trace!(role = ?role, "ignoring frame message with unexpected role");
                }
            }
        }

        if let (Some(assistant), Some(tool)) = (self.assistant.as_mut(), self.tool.as_ref()) {
            assistant.citations_from = Some(tool.id.clone());
        }

        Ok(())
    }

    fn apply_assistant(&mut self, mut message: ChatMessage, received_at: DateTime<Utc>) {
        self.assistant_content.push_str(&message.content);
        message.content = self.assistant_content.clone();

        if self.tool.is_none()
            && let Some(context) = message.context.as_deref().filter(|context| !context.is_empty())
        {
            self.tool = Some(ChatMessage::new(
                MessageId::random(),
                Role::Tool,
                context,
                received_at,
            ));
        }

        self.assistant = Some(message);
        self.display = TurnDisplay::Streaming;
    }

    /// Ends the turn with an error-role message; messages reconciled so far are kept.
    pub fn fail(&mut self, text: impl Into<String>, at: DateTime<Utc>) {
        if self.end.is_some() {
            return;
        }
        self.error = Some(ChatMessage::error(text, at));
        self.display = TurnDisplay::Finished;
        self.end = Some(TurnEnd::Failed);
    }

    /// Ends the turn as aborted: partial content stays, no error message is added.
    pub fn cancel(&mut self) {
        if self.end.is_some() {
            return;
        }
        self.display = TurnDisplay::Finished;
        self.end = Some(TurnEnd::Cancelled);
    }

    pub fn complete(&mut self) {
        if self.end.is_some() {
            return;
        }
        self.display = TurnDisplay::Finished;
        self.end = Some(TurnEnd::Completed);
    }

    pub fn display(&self) -> TurnDisplay {
        self.display
    }

    pub fn end(&self) -> Option<TurnEnd> {
        self.end
    }

    pub fn history_metadata(&self) -> Option<&HistoryMetadata> {
        self.history_metadata.as_ref()
    }

    pub fn assistant_message(&self) -> Option<&ChatMessage> {
        self.assistant.as_ref()
    }

    pub fn error_message(&self) -> Option<&ChatMessage> {
        self.error.as_ref()
    }

    /// `[...prior, user, tool?, assistant?, error?]`
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.prior.len() + 4);
        messages.extend(self.prior.iter().cloned());
        messages.push(self.user_message.clone());
        // A tool message without an answer has nothing to attach to.
        if self.assistant.is_some() {
            messages.extend(self.tool.iter().cloned());
        }
        messages.extend(self.assistant.iter().cloned());
        messages.extend(self.error.iter().cloned());
        messages
    }
}
