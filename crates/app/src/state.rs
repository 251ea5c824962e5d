use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use docdraft_api::HistoryHealth;
use docdraft_domain::{
    ChatMessage, Conversation, ConversationId, DraftedDocument, Feedback, MessageId, Role,
    Section, clamp_content, matches_title_query, merge_page, outline_reply_text,
};

/// Which chat view is active; each keeps its own "current conversation" mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatMode {
    #[default]
    Browse,
    Generate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryLoadingState {
    #[default]
    NotStarted,
    Loading,
    Success,
    Fail,
}

/// Dismissible error naming the failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBanner {
    pub title: String,
    pub subtitle: String,
}

impl ErrorBanner {
    pub fn new(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: subtitle.into(),
        }
    }
}

/// Process-wide client state. Only [`AppState::apply`] produces new values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    pub mode: ChatMode,
    pub current_chat: Option<Conversation>,
    pub browse_chat: Option<Conversation>,
    pub generate_chat: Option<Conversation>,
    pub chat_history: Vec<Conversation>,
    pub history_query: Option<String>,
    pub filtered_chat_history: Option<Vec<Conversation>>,
    pub drafted_document: Option<DraftedDocument>,
    pub history_health: HistoryHealth,
    pub history_loading: HistoryLoadingState,
    pub is_history_panel_open: bool,
    pub is_generating: bool,
    pub is_request_initiated: bool,
    pub user_display_name: String,
    pub auth_required: bool,
    pub error_banner: Option<ErrorBanner>,
}

/// Every state transition the client knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetMode(ChatMode),
    /// Makes a freshly asked conversation current.
    StartConversation(Conversation),
    AppendMessages {
        conversation_id: ConversationId,
        messages: Vec<ChatMessage>,
    },
    ReplaceCurrentChat(Option<Conversation>),
    /// Inserts at the front, or replaces the entry with the same id.
    UpsertHistoryEntry(Conversation),
    SetHistory(Vec<Conversation>),
    AppendHistoryPage(Vec<Conversation>),
    DeleteChatEntry(ConversationId),
    DeleteChatHistory,
    DeleteCurrentChatMessages(ConversationId),
    RenameConversation {
        conversation_id: ConversationId,
        title: String,
    },
    FilterChatHistory(Option<String>),
    SetFeedback {
        message_id: MessageId,
        feedback: Feedback,
    },
    SetDraft(Option<DraftedDocument>),
    UpdateDraftTitle(String),
    UpdateSection {
        index: usize,
        section: Section,
    },
    ReplaceSections(Vec<Section>),
    ToggleHistoryPanel,
    SetGenerating(bool),
    SetRequestInitiated(bool),
    SetHistoryHealth(HistoryHealth),
    SetHistoryLoading(HistoryLoadingState),
    SetUserInfo {
        display_name: String,
        auth_required: bool,
    },
    ShowError(ErrorBanner),
    DismissError,
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetMode(_) => "set-mode",
            Self::StartConversation(_) => "start-conversation",
            Self::AppendMessages { .. } => "append-messages",
            Self::ReplaceCurrentChat(_) => "replace-current-chat",
            Self::UpsertHistoryEntry(_) => "upsert-history-entry",
            Self::SetHistory(_) => "set-history",
            Self::AppendHistoryPage(_) => "append-history-page",
            Self::DeleteChatEntry(_) => "delete-chat-entry",
            Self::DeleteChatHistory => "delete-chat-history",
            Self::DeleteCurrentChatMessages(_) => "delete-current-chat-messages",
            Self::RenameConversation { .. } => "rename-conversation",
            Self::FilterChatHistory(_) => "filter-chat-history",
            Self::SetFeedback { .. } => "set-feedback",
            Self::SetDraft(_) => "set-draft",
            Self::UpdateDraftTitle(_) => "update-draft-title",
            Self::UpdateSection { .. } => "update-section",
            Self::ReplaceSections(_) => "replace-sections",
            Self::ToggleHistoryPanel => "toggle-history-panel",
            Self::SetGenerating(_) => "set-generating",
            Self::SetRequestInitiated(_) => "set-request-initiated",
            Self::SetHistoryHealth(_) => "set-history-health",
            Self::SetHistoryLoading(_) => "set-history-loading",
            Self::SetUserInfo { .. } => "set-user-info",
            Self::ShowError(_) => "show-error",
            Self::DismissError => "dismiss-error",
        }
    }
}

impl AppState {
    /// Pure transition function; unknown ids and out-of-range indexes leave the state as is.
    pub fn apply(mut self, action: Action) -> Self {
        match action {
            Action::SetMode(mode) => {
                self.mode = mode;
                self.current_chat = self.mirror().clone();
            }
            Action::StartConversation(conversation) => {
                self.is_request_initiated = true;
                self.set_current(Some(conversation));
            }
            Action::AppendMessages {
                conversation_id,
                messages,
            } => {
                self.update_conversation(&conversation_id, |conversation| {
                    conversation.messages.extend(messages.iter().cloned());
                });
            }
            Action::ReplaceCurrentChat(conversation) => self.set_current(conversation),
            Action::UpsertHistoryEntry(conversation) => {
                match self
                    .chat_history
                    .iter_mut()
                    .find(|entry| entry.id == conversation.id)
                {
                    Some(entry) => *entry = conversation,
                    None => self.chat_history.insert(0, conversation),
                }
                self.refilter();
            }
            Action::SetHistory(conversations) => {
                self.chat_history = conversations;
                self.refilter();
            }
            Action::AppendHistoryPage(page) => {
                merge_page(&mut self.chat_history, page);
                self.refilter();
            }
            Action::DeleteChatEntry(conversation_id) => {
                self.chat_history.retain(|entry| entry.id != conversation_id);
                self.clear_pointers_to(&conversation_id);
                self.refilter();
            }
            Action::DeleteChatHistory => {
                self.chat_history.clear();
                self.current_chat = None;
                self.browse_chat = None;
                self.generate_chat = None;
                self.refilter();
            }
            Action::DeleteCurrentChatMessages(conversation_id) => {
                self.update_conversation(&conversation_id, |conversation| {
                    conversation.messages.clear();
                });
            }
            Action::RenameConversation {
                conversation_id,
                title,
            } => {
                let title = title.trim().to_string();
                let unchanged = self
                    .chat_history
                    .iter()
                    .chain(self.current_chat.iter())
                    .find(|entry| entry.id == conversation_id)
                    .is_none_or(|entry| entry.title == title);
                if !title.is_empty() && !unchanged {
                    self.update_conversation(&conversation_id, |conversation| {
                        conversation.title = title.clone();
                    });
                }
            }
            Action::FilterChatHistory(query) => {
                self.history_query = query
                    .map(|query| query.trim().to_string())
                    .filter(|query| !query.is_empty());
                self.refilter();
            }
            Action::SetFeedback {
                message_id,
                feedback,
            } => {
                let apply_feedback = |conversation: &mut Conversation| {
                    for message in &mut conversation.messages {
                        if message.id == message_id && message.role == Role::Assistant {
                            message.feedback = Some(feedback);
                        }
                    }
                };
                for conversation in self.conversations_mut() {
                    apply_feedback(conversation);
                }
            }
            Action::SetDraft(document) => self.drafted_document = document,
            Action::UpdateDraftTitle(title) => {
                if let Some(document) = self.drafted_document.as_mut() {
                    document.title = title;
                }
            }
            Action::UpdateSection { index, mut section } => {
                if let Some(slot) = self
                    .drafted_document
                    .as_mut()
                    .and_then(|document| document.sections.get_mut(index))
                {
                    section.content = clamp_content(section.content).0;
                    *slot = section;
                }
            }
            Action::ReplaceSections(sections) => {
                if let Some(document) = self.drafted_document.as_mut() {
                    document.sections = sections
                        .into_iter()
                        .map(|mut section| {
                            section.content = clamp_content(section.content).0;
                            section
                        })
                        .collect();
                }
            }
            Action::ToggleHistoryPanel => self.is_history_panel_open = !self.is_history_panel_open,
            Action::SetGenerating(is_generating) => self.is_generating = is_generating,
            Action::SetRequestInitiated(initiated) => self.is_request_initiated = initiated,
            Action::SetHistoryHealth(health) => self.history_health = health,
            Action::SetHistoryLoading(loading) => self.history_loading = loading,
            Action::SetUserInfo {
                display_name,
                auth_required,
            } => {
                self.user_display_name = display_name;
                self.auth_required = auth_required;
            }
            Action::ShowError(banner) => self.error_banner = Some(banner),
            Action::DismissError => self.error_banner = None,
        }

        self
    }

    /// Conversations to list: the filtered view when a query is active.
    pub fn visible_history(&self) -> &[Conversation] {
        self.filtered_chat_history
            .as_deref()
            .unwrap_or(&self.chat_history)
    }

    pub fn find_history_entry(&self, conversation_id: &ConversationId) -> Option<&Conversation> {
        self.chat_history
            .iter()
            .find(|entry| &entry.id == conversation_id)
    }

    /// Chat-visible text of a message; in generate mode assistant replies render as outlines.
    pub fn display_text(&self, message: &ChatMessage) -> String {
        if self.mode != ChatMode::Generate || message.role != Role::Assistant {
            return message.content.clone();
        }

        outline_reply_text(&message.content).unwrap_or_else(|_| message.content.clone())
    }

    fn mirror(&self) -> &Option<Conversation> {
        match self.mode {
            ChatMode::Browse => &self.browse_chat,
            ChatMode::Generate => &self.generate_chat,
        }
    }

    fn mirror_mut(&mut self) -> &mut Option<Conversation> {
        match self.mode {
            ChatMode::Browse => &mut self.browse_chat,
            ChatMode::Generate => &mut self.generate_chat,
        }
    }

    fn set_current(&mut self, conversation: Option<Conversation>) {
        *self.mirror_mut() = conversation.clone();
        self.current_chat = conversation;
    }

    fn clear_pointers_to(&mut self, conversation_id: &ConversationId) {
        for slot in [
            &mut self.current_chat,
            &mut self.browse_chat,
            &mut self.generate_chat,
        ] {
            if slot
                .as_ref()
                .is_some_and(|conversation| &conversation.id == conversation_id)
            {
                *slot = None;
            }
        }
    }

    fn conversations_mut(&mut self) -> impl Iterator<Item = &mut Conversation> {
        self.chat_history
            .iter_mut()
            .chain(self.current_chat.iter_mut())
            .chain(self.browse_chat.iter_mut())
            .chain(self.generate_chat.iter_mut())
    }

    fn update_conversation(
        &mut self,
        conversation_id: &ConversationId,
        mut update: impl FnMut(&mut Conversation),
    ) {
        for conversation in self.conversations_mut() {
            if &conversation.id == conversation_id {
                update(conversation);
            }
        }
        self.refilter();
    }

    fn refilter(&mut self) {
        self.filtered_chat_history = self.history_query.as_deref().map(|query| {
            self.chat_history
                .iter()
                .filter(|conversation| matches_title_query(conversation, query))
                .cloned()
                .collect()
        });
    }
}

/// Shared handle to the single [`AppState`]; dispatches are applied one at a time.
pub struct AppStore {
    state: ArcSwap<AppState>,
    dispatch_lock: Mutex<()>,
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new(AppState::default())
    }
}

impl AppStore {
    pub fn new(initial: AppState) -> Self {
        Self {
            state: ArcSwap::from_pointee(initial),
            dispatch_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<AppState> {
        self.state.load_full()
    }

    /// Applies `action` and returns the resulting state.
    pub fn dispatch(&self, action: Action) -> Arc<AppState> {
        let _guard = self
            .dispatch_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let kind = action.kind();
        let next = Arc::new(self.state.load().as_ref().clone().apply(action));
        self.state.store(Arc::clone(&next));
        tracing::trace!(action = kind, "dispatched");
        next
    }
}
