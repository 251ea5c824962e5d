use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use docdraft_api::{
    ApiError, Collaborator, ConversationRequest, DEFAULT_ERROR_TEXT, DocumentContent, FrameEvent,
    HistoryHealth, StreamCanceller, display_name, parse_error_message,
};
use docdraft_domain::{
    ChatMessage, Conversation, ConversationId, DraftedDocument, Feedback, MessageId,
    compile_template,
};
use snafu::{IntoError, ResultExt, ensure};

use super::error::{
    ConversationNotFoundSnafu, DestructiveInFlightSnafu, EmptyQuestionSnafu,
    HistoryUnavailableSnafu, NoCurrentConversationSnafu, RemoteSnafu, SessionError,
    SessionResult, TemplateSnafu, TurnInFlightSnafu,
};
use super::pager::HistoryPager;
use super::reconcile::{TurnEnd, TurnReconciler};
use super::state::{Action, AppState, AppStore, ChatMode, ErrorBanner};

/// Appended when the history service refuses to start a persisted turn.
pub const GENERATE_REJECTED_TEXT: &str =
    "There was an error generating a response. Template history can't be saved at this time.";
/// Appended when a finished turn could not be saved.
pub const SAVE_FAILED_TEXT: &str = "An error occurred. Answers can't be saved at this time. If the problem persists, please contact the site administrator.";
pub const RETRY_HINT_TEXT: &str =
    "Please try again. If the problem persists, please contact the site administrator.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub history_enabled: bool,
    pub auth_enabled: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            history_enabled: true,
            auth_enabled: false,
        }
    }
}

/// Result of one asked question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSummary {
    pub conversation_id: ConversationId,
    pub end: TurnEnd,
    pub no_content: bool,
    /// `None` when the turn was not eligible for saving.
    pub saved: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed,
    Unchanged,
}

/// Drives chat turns and history operations against the collaborator, funnelling every state
/// change through the [`AppStore`].
pub struct ChatSession {
    collaborator: Arc<dyn Collaborator>,
    store: Arc<AppStore>,
    options: SessionOptions,
    in_flight: Mutex<Vec<(u64, StreamCanceller)>>,
    next_turn: AtomicU64,
    turn_lock: tokio::sync::Mutex<()>,
    destructive_lock: tokio::sync::Mutex<()>,
    pager: tokio::sync::Mutex<HistoryPager>,
}

impl ChatSession {
    pub fn new(
        collaborator: Arc<dyn Collaborator>,
        store: Arc<AppStore>,
        options: SessionOptions,
    ) -> Self {
        Self {
            collaborator,
            store,
            options,
            in_flight: Mutex::new(Vec::new()),
            next_turn: AtomicU64::new(0),
            turn_lock: tokio::sync::Mutex::new(()),
            destructive_lock: tokio::sync::Mutex::new(()),
            pager: tokio::sync::Mutex::new(HistoryPager::new()),
        }
    }

    pub fn store(&self) -> &Arc<AppStore> {
        &self.store
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// Sends `question` in the current conversation, or starts a new one, and streams the answer.
    ///
    /// Only one turn runs at a time; a second call fails until the first ends or is stopped.
    pub async fn ask(&self, question: &str) -> SessionResult<TurnSummary> {
        let question = question.trim();
        ensure!(!question.is_empty(), EmptyQuestionSnafu { stage: "ask" });
        let Ok(_turn) = self.turn_lock.try_lock() else {
            return TurnInFlightSnafu { stage: "ask" }.fail();
        };

        let snapshot = self.store.snapshot();
        let persisted = snapshot.history_health.is_working();
        let user_message = ChatMessage::user(question, Utc::now());

        let (conversation, continued) = match snapshot.current_chat.clone() {
            Some(conversation) => {
                self.store.dispatch(Action::AppendMessages {
                    conversation_id: conversation.id.clone(),
                    messages: vec![user_message.clone()],
                });
                (conversation, true)
            }
            None => {
                let conversation = Conversation::from_first_message(user_message.clone());
                self.store
                    .dispatch(Action::StartConversation(conversation.clone()));
                (conversation, false)
            }
        };
        let prior = if continued {
            conversation.messages.clone()
        } else {
            Vec::new()
        };

        let mut outbound = prior
            .iter()
            .filter(|message| !message.is_error())
            .cloned()
            .collect::<Vec<_>>();
        outbound.push(user_message.clone());
        let listed = continued && snapshot.find_history_entry(&conversation.id).is_some();
        let mut request = ConversationRequest::new(outbound);
        if persisted && listed {
            request = request.for_conversation(conversation.id.clone());
        }

        tracing::info!(
            conversation_id = %conversation.id,
            continued,
            persisted,
            mode = ?snapshot.mode,
            "asking question"
        );
        self.store.dispatch(Action::SetGenerating(true));

        let mut handle = if persisted {
            self.collaborator.stream_history_generate(request)
        } else {
            self.collaborator.stream_conversation(request)
        };
        let turn_id = self.next_turn.fetch_add(1, Ordering::Relaxed);
        let tracked = match handle.stream.take_canceller() {
            Some(canceller) => {
                self.lock_in_flight().push((turn_id, canceller));
                true
            }
            None => false,
        };
        tokio::spawn(handle.worker);
        let mut stream = handle.stream;

        let mut reconciler = TurnReconciler::new(prior, user_message).require_content(persisted);
        let mut no_content = false;

        loop {
            let Some(event) = stream.recv().await else {
                tracing::info!(conversation_id = %conversation.id, "turn cancelled");
                reconciler.cancel();
                break;
            };
            // Events still buffered after a stop belong to a cancelled turn.
            if tracked && !self.is_in_flight(turn_id) {
                tracing::info!(conversation_id = %conversation.id, "turn stopped");
                reconciler.cancel();
                break;
            }

            match event {
                FrameEvent::Frame(frame) => {
                    if let Err(error) = reconciler.apply_frame(frame, Utc::now()) {
                        tracing::warn!(conversation_id = %conversation.id, error = %error, "turn returned no content");
                        no_content = true;
                        reconciler.fail(
                            parse_error_message(&format!("An error occurred. {error}")),
                            Utc::now(),
                        );
                        break;
                    }
                    self.publish(&conversation.id, turn_conversation(&conversation, &reconciler));
                }
                FrameEvent::Rejected { status, detail } => {
                    tracing::warn!(status, detail = ?detail, "completion request rejected");
                    let text = if persisted {
                        let detail = detail
                            .map(|detail| parse_error_message(&detail))
                            .unwrap_or_else(|| RETRY_HINT_TEXT.to_string());
                        format!("{GENERATE_REJECTED_TEXT} {detail}")
                    } else {
                        detail
                            .map(|detail| parse_error_message(&detail))
                            .unwrap_or_else(|| DEFAULT_ERROR_TEXT.to_string())
                    };
                    reconciler.fail(text, Utc::now());
                    break;
                }
                FrameEvent::Failed {
                    remote_message,
                    reason,
                } => {
                    tracing::warn!(reason = %reason, "completion stream failed");
                    let text = remote_message
                        .map(|message| parse_error_message(&message))
                        .unwrap_or_else(|| DEFAULT_ERROR_TEXT.to_string());
                    reconciler.fail(text, Utc::now());
                    break;
                }
                FrameEvent::Done => {
                    reconciler.complete();
                    break;
                }
            }
        }
        drop(stream);
        self.untrack(turn_id);

        let mut finished = turn_conversation(&conversation, &reconciler);
        if !listed && let Some(metadata) = reconciler.history_metadata() {
            finished.id = metadata.conversation_id.clone();
            if !metadata.title.trim().is_empty() {
                finished.title = metadata.title.clone();
            }
            finished.date = metadata.date_or(finished.date);
        }
        self.publish(&conversation.id, finished.clone());
        self.store.dispatch(Action::SetGenerating(false));

        let end = reconciler.end().unwrap_or(TurnEnd::Completed);
        let remote_id_known = listed || reconciler.history_metadata().is_some();
        let mut saved = None;
        if persisted && snapshot.mode == ChatMode::Generate && !no_content && remote_id_known {
            let outcome = self
                .collaborator
                .update_history(&finished.id, &finished.messages)
                .await;
            saved = Some(outcome.is_ok());
            if let Err(error) = outcome {
                tracing::warn!(conversation_id = %finished.id, error = %error, "failed to save conversation");
                let notice = ChatMessage::error(SAVE_FAILED_TEXT, Utc::now());
                finished.messages.push(notice.clone());
                self.store.dispatch(Action::AppendMessages {
                    conversation_id: finished.id.clone(),
                    messages: vec![notice],
                });
            }
        }
        // Persisted history only lists conversations the server has an id for.
        let listable = if persisted {
            remote_id_known
        } else {
            snapshot.mode == ChatMode::Generate
        };
        if listable {
            self.store
                .dispatch(Action::UpsertHistoryEntry(finished.clone()));
        }

        tracing::info!(
            conversation_id = %finished.id,
            end = ?end,
            message_count = finished.messages.len(),
            "turn finished"
        );
        Ok(TurnSummary {
            conversation_id: finished.id,
            end,
            no_content,
            saved,
        })
    }

    /// Cancels every in-flight stream. Returns how many were still running.
    pub fn stop_generating(&self) -> usize {
        let cancellers = std::mem::take(&mut *self.lock_in_flight());
        let stopped = cancellers
            .into_iter()
            .map(|(_, canceller)| canceller.cancel())
            .filter(|delivered| *delivered)
            .count();

        self.store.dispatch(Action::SetGenerating(false));
        tracing::info!(stopped, "stopped generating");
        stopped
    }

    pub fn new_chat(&self) {
        self.store.dispatch(Action::ReplaceCurrentChat(None));
    }

    pub fn switch_mode(&self, mode: ChatMode) -> Arc<AppState> {
        self.store.dispatch(Action::SetMode(mode))
    }

    pub fn filter_history(&self, query: Option<&str>) -> Arc<AppState> {
        self.store
            .dispatch(Action::FilterChatHistory(query.map(str::to_string)))
    }

    pub fn set_feedback(&self, message_id: MessageId, feedback: Feedback) {
        self.store.dispatch(Action::SetFeedback {
            message_id,
            feedback,
        });
    }

    pub fn dismiss_error(&self) {
        self.store.dispatch(Action::DismissError);
    }

    /// Makes a listed conversation current, loading its messages when the list row had none.
    pub async fn select_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> SessionResult<Conversation> {
        let snapshot = self.store.snapshot();
        let Some(mut conversation) = snapshot.find_history_entry(conversation_id).cloned() else {
            return ConversationNotFoundSnafu {
                stage: "select-conversation",
                conversation_id: conversation_id.to_string(),
            }
            .fail();
        };

        if conversation.messages.is_empty() && snapshot.history_health.is_working() {
            let messages = self
                .collaborator
                .read_history(conversation_id)
                .await
                .map_err(|error| {
                    self.remote_failed("load conversation", "Error loading conversation", error)
                })?;
            conversation.messages = messages;
            self.store
                .dispatch(Action::UpsertHistoryEntry(conversation.clone()));
        }

        self.store
            .dispatch(Action::ReplaceCurrentChat(Some(conversation.clone())));
        Ok(conversation)
    }

    pub async fn delete_conversation(&self, conversation_id: &ConversationId) -> SessionResult<()> {
        let operation = "delete conversation";
        let _guard = self.destructive_guard(operation)?;
        self.ensure_history(operation)?;

        self.collaborator
            .delete_history(conversation_id)
            .await
            .map_err(|error| self.remote_failed(operation, "Error deleting conversation", error))?;

        self.store
            .dispatch(Action::DeleteChatEntry(conversation_id.clone()));
        tracing::info!(conversation_id = %conversation_id, "deleted conversation");
        Ok(())
    }

    pub async fn clear_all_history(&self) -> SessionResult<()> {
        let operation = "clear history";
        let _guard = self.destructive_guard(operation)?;
        self.ensure_history(operation)?;

        self.collaborator
            .delete_all_history()
            .await
            .map_err(|error| {
                self.remote_failed(operation, "Error deleting all of chat history", error)
            })?;

        self.store.dispatch(Action::DeleteChatHistory);
        self.pager.lock().await.reset();
        tracing::info!("cleared chat history");
        Ok(())
    }

    /// Renames a conversation; blank or unchanged titles are ignored without a remote call.
    pub async fn rename_conversation(
        &self,
        conversation_id: &ConversationId,
        title: &str,
    ) -> SessionResult<RenameOutcome> {
        let title = title.trim();
        let snapshot = self.store.snapshot();
        let Some(existing) = snapshot
            .find_history_entry(conversation_id)
            .or(snapshot
                .current_chat
                .as_ref()
                .filter(|current| &current.id == conversation_id))
        else {
            return ConversationNotFoundSnafu {
                stage: "rename-conversation",
                conversation_id: conversation_id.to_string(),
            }
            .fail();
        };

        if title.is_empty() || existing.title == title {
            return Ok(RenameOutcome::Unchanged);
        }

        let operation = "rename conversation";
        let _guard = self.destructive_guard(operation)?;
        self.ensure_history(operation)?;

        self.collaborator
            .rename_history(conversation_id, title)
            .await
            .map_err(|error| self.remote_failed(operation, "Error renaming conversation", error))?;

        self.store.dispatch(Action::RenameConversation {
            conversation_id: conversation_id.clone(),
            title: title.to_string(),
        });
        Ok(RenameOutcome::Renamed)
    }

    /// Removes the messages of the current conversation, keeping the conversation itself.
    pub async fn clear_current_chat(&self) -> SessionResult<()> {
        let snapshot = self.store.snapshot();
        let Some(current) = snapshot.current_chat.as_ref() else {
            return NoCurrentConversationSnafu {
                stage: "clear-current-chat",
            }
            .fail();
        };

        let operation = "clear current chat";
        let _guard = self.destructive_guard(operation)?;
        self.ensure_history(operation)?;

        self.collaborator
            .clear_history_messages(&current.id)
            .await
            .map_err(|error| self.remote_failed(operation, "Error clearing current chat", error))?;

        let state = self
            .store
            .dispatch(Action::DeleteCurrentChatMessages(current.id.clone()));
        if state.mode == ChatMode::Generate
            && let Some(cleared) = state.current_chat.clone()
        {
            self.store.dispatch(Action::UpsertHistoryEntry(cleared));
        }
        Ok(())
    }

    pub async fn refresh_history_health(&self) -> HistoryHealth {
        let health = if self.options.history_enabled {
            self.collaborator.ensure_history().await
        } else {
            HistoryHealth::NotConfigured
        };

        self.store.dispatch(Action::SetHistoryHealth(health.clone()));
        if let HistoryHealth::NotWorking(reason) = &health {
            self.store.dispatch(Action::ShowError(ErrorBanner::new(
                "Template history is not enabled",
                format!("{reason}. Please contact the site administrator."),
            )));
        }

        tracing::info!(health = ?health, "history health refreshed");
        health
    }

    /// Loads the signed-in user's display name. Returns whether sign-in is required.
    pub async fn load_user_info(&self) -> bool {
        if !self.options.auth_enabled {
            self.store.dispatch(Action::SetUserInfo {
                display_name: String::new(),
                auth_required: false,
            });
            return false;
        }

        let infos = self.collaborator.user_info().await.unwrap_or_else(|error| {
            tracing::warn!(error = %error, "failed to load user info");
            Vec::new()
        });
        let auth_required = infos.is_empty();
        self.store.dispatch(Action::SetUserInfo {
            display_name: display_name(&infos),
            auth_required,
        });
        auth_required
    }

    pub async fn load_more_history(&self) -> SessionResult<usize> {
        self.ensure_history("load history")?;
        let mut pager = self.pager.lock().await;
        pager.load_more(self.collaborator.as_ref(), &self.store).await
    }

    /// Compiles the latest assistant reply of the current conversation into the draft.
    pub fn generate_document(&self) -> SessionResult<DraftedDocument> {
        let snapshot = self.store.snapshot();
        let Some(current) = snapshot.current_chat.as_ref() else {
            return NoCurrentConversationSnafu {
                stage: "generate-document",
            }
            .fail();
        };

        let content = current
            .latest_assistant_message()
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        let document = compile_template(content).context(TemplateSnafu {
            stage: "generate-document",
        })?;

        self.store.dispatch(Action::SetDraft(Some(document.clone())));
        tracing::info!(sections = document.sections.len(), "drafted document from template");
        Ok(document)
    }

    pub async fn load_document(&self, document_id: &str) -> SessionResult<DocumentContent> {
        self.collaborator
            .document(document_id)
            .await
            .context(RemoteSnafu {
                stage: "load-document",
                operation: "load document",
            })
    }

    fn publish(&self, turn_conversation_id: &ConversationId, conversation: Conversation) {
        let still_current = self
            .store
            .snapshot()
            .current_chat
            .as_ref()
            .is_some_and(|current| &current.id == turn_conversation_id);
        if still_current {
            self.store
                .dispatch(Action::ReplaceCurrentChat(Some(conversation)));
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Vec<(u64, StreamCanceller)>> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_in_flight(&self, turn_id: u64) -> bool {
        self.lock_in_flight().iter().any(|(id, _)| *id == turn_id)
    }

    fn untrack(&self, turn_id: u64) {
        self.lock_in_flight().retain(|(id, _)| *id != turn_id);
    }

    fn destructive_guard(
        &self,
        operation: &'static str,
    ) -> SessionResult<tokio::sync::MutexGuard<'_, ()>> {
        self.destructive_lock.try_lock().map_err(|_| {
            DestructiveInFlightSnafu {
                stage: "destructive-guard",
                operation,
            }
            .build()
        })
    }

    fn ensure_history(&self, operation: &'static str) -> SessionResult<()> {
        ensure!(
            self.store.snapshot().history_health.is_working(),
            HistoryUnavailableSnafu {
                stage: "ensure-history",
                operation,
            }
        );
        Ok(())
    }

    fn remote_failed(
        &self,
        operation: &'static str,
        banner_title: &'static str,
        error: ApiError,
    ) -> SessionError {
        tracing::warn!(operation, error = %error, "remote history call failed");
        self.store
            .dispatch(Action::ShowError(ErrorBanner::new(banner_title, RETRY_HINT_TEXT)));
        RemoteSnafu {
            stage: "remote-history",
            operation,
        }
        .into_error(error)
    }
}

fn turn_conversation(conversation: &Conversation, reconciler: &TurnReconciler) -> Conversation {
    let mut snapshot = conversation.clone();
    snapshot.messages = reconciler.messages();
    snapshot
}
