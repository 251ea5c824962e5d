#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use docdraft::{App, ClientSettings, SettingsStore};
use docdraft_api::{
    AccountBackend, ApiError, ApiResult, BoxFuture, ConversationBackend, ConversationRequest,
    DocumentContent, FrameEvent, FrameStreamHandle, HistoryBackend, HistoryHealth, ResultFrame,
    SectionBackend, StreamRoute, UserClaim, UserInfo, event_channel,
};
use docdraft_domain::{ChatMessage, Conversation, ConversationId};
use serde_json::json;
use tokio::sync::Notify;

/// Events one stream replays; `hold_open` keeps it alive until cancelled.
pub struct Script {
    pub events: Vec<FrameEvent>,
    pub hold_open: bool,
    /// Sent once the stream is cancelled, before it closes.
    pub after_cancel: Vec<FrameEvent>,
}

impl Script {
    pub fn answer(id: &str, deltas: &[&str]) -> Self {
        let mut events = deltas
            .iter()
            .map(|delta| FrameEvent::Frame(frame(id, delta)))
            .collect::<Vec<_>>();
        events.push(FrameEvent::Done);
        Self {
            events,
            hold_open: false,
            after_cancel: Vec::new(),
        }
    }

    pub fn partial(id: &str, deltas: &[&str]) -> Self {
        Self {
            events: deltas
                .iter()
                .map(|delta| FrameEvent::Frame(frame(id, delta)))
                .collect(),
            hold_open: true,
            after_cancel: Vec::new(),
        }
    }

    pub fn events(events: Vec<FrameEvent>) -> Self {
        Self {
            events,
            hold_open: false,
            after_cancel: Vec::new(),
        }
    }

    pub fn then_on_cancel(mut self, events: Vec<FrameEvent>) -> Self {
        self.after_cancel = events;
        self
    }
}

pub fn frame(id: &str, content: &str) -> ResultFrame {
    serde_json::from_value(json!({
        "id": id,
        "choices": [{"messages": [{"role": "assistant", "content": content}]}]
    }))
    .unwrap()
}

pub fn frame_with_metadata(id: &str, content: &str, conversation_id: &str, title: &str) -> ResultFrame {
    serde_json::from_value(json!({
        "id": id,
        "history_metadata": {
            "conversation_id": conversation_id,
            "title": title,
            "date": "2024-05-01T10:00:00Z"
        },
        "choices": [{"messages": [{"role": "assistant", "content": content}]}]
    }))
    .unwrap()
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap()
}

pub fn listed(id: &str, title: &str) -> Conversation {
    Conversation::new(ConversationId::new(id), title, at(1_700_000_000))
}

/// In-memory backend recording every call it receives.
#[derive(Default)]
pub struct FakeCollaborator {
    scripts: Mutex<VecDeque<Script>>,
    health: Mutex<HistoryHealth>,
    history: Mutex<Vec<Conversation>>,
    stored: Mutex<HashMap<String, Vec<ChatMessage>>>,
    failing: Mutex<HashSet<&'static str>>,
    calls: Mutex<Vec<String>>,
    requests: Mutex<Vec<(StreamRoute, ConversationRequest)>>,
    users: Mutex<Vec<UserInfo>>,
    section_reply: Mutex<Option<String>>,
    gated: Mutex<HashSet<&'static str>>,
    release: Notify,
}

impl FakeCollaborator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn set_health(&self, health: HistoryHealth) {
        *self.health.lock().unwrap() = health;
    }

    pub fn set_history(&self, history: Vec<Conversation>) {
        *self.history.lock().unwrap() = history;
    }

    pub fn store_messages(&self, conversation_id: &str, messages: Vec<ChatMessage>) {
        self.stored
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), messages);
    }

    pub fn stored_messages(&self, conversation_id: &str) -> Option<Vec<ChatMessage>> {
        self.stored.lock().unwrap().get(conversation_id).cloned()
    }

    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn set_users(&self, names: &[&str]) {
        *self.users.lock().unwrap() = names
            .iter()
            .map(|name| UserInfo {
                user_id: Some(format!("id-{name}")),
                user_claims: vec![UserClaim {
                    typ: "name".to_string(),
                    val: name.to_string(),
                }],
            })
            .collect();
    }

    pub fn set_section_reply(&self, reply: impl Into<String>) {
        *self.section_reply.lock().unwrap() = Some(reply.into());
    }

    /// Holds `operation` after it is recorded until [`Self::release`] is called.
    pub fn gate(&self, operation: &'static str) {
        self.gated.lock().unwrap().insert(operation);
    }

    pub fn release(&self) {
        self.gated.lock().unwrap().clear();
        self.release.notify_one();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<(StreamRoute, ConversationRequest)> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn pass_gate(&self, operation: &'static str) {
        let gated = self.gated.lock().unwrap().contains(operation);
        if gated {
            self.release.notified().await;
        }
    }

    fn outcome(&self, operation: &'static str, endpoint: &'static str) -> ApiResult<()> {
        if self.failing.lock().unwrap().contains(operation) {
            return Err(ApiError::Status {
                stage: "fake-collaborator",
                endpoint,
                status: 500,
                message: format!("{operation} unavailable"),
            });
        }
        Ok(())
    }

    fn stream(&self, route: StreamRoute, request: ConversationRequest) -> FrameStreamHandle {
        self.record(route.path().to_string());
        self.requests.lock().unwrap().push((route, request));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::events(vec![FrameEvent::Done]));

        let (event_tx, stream, cancel_rx) = event_channel(route);
        let worker = Box::pin(async move {
            for event in script.events {
                if event_tx.send(event).is_err() {
                    return;
                }
            }
            if script.hold_open {
                let _ = cancel_rx.await;
                for event in script.after_cancel {
                    if event_tx.send(event).is_err() {
                        return;
                    }
                }
            }
        });

        FrameStreamHandle { stream, worker }
    }
}

impl ConversationBackend for FakeCollaborator {
    fn stream_conversation(&self, request: ConversationRequest) -> FrameStreamHandle {
        self.stream(StreamRoute::Conversation, request)
    }

    fn stream_history_generate(&self, request: ConversationRequest) -> FrameStreamHandle {
        self.stream(StreamRoute::HistoryGenerate, request)
    }
}

impl HistoryBackend for FakeCollaborator {
    fn ensure_history<'a>(&'a self) -> BoxFuture<'a, HistoryHealth> {
        Box::pin(async move {
            self.record("ensure".to_string());
            self.health.lock().unwrap().clone()
        })
    }

    fn list_history<'a>(&'a self, offset: usize) -> BoxFuture<'a, ApiResult<Vec<Conversation>>> {
        Box::pin(async move {
            self.record(format!("list {offset}"));
            self.outcome("list", "/history/list")?;
            Ok(self
                .history
                .lock()
                .unwrap()
                .iter()
                .skip(offset)
                .take(docdraft::HISTORY_PAGE_SIZE)
                .cloned()
                .collect())
        })
    }

    fn read_history<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ApiResult<Vec<ChatMessage>>> {
        Box::pin(async move {
            self.record(format!("read {conversation_id}"));
            self.outcome("read", "/history/read")?;
            Ok(self
                .stored_messages(conversation_id.as_str())
                .unwrap_or_default())
        })
    }

    fn update_history<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        messages: &'a [ChatMessage],
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            self.record(format!("update {conversation_id}"));
            self.outcome("update", "/history/update")?;
            self.store_messages(conversation_id.as_str(), messages.to_vec());
            Ok(())
        })
    }

    fn clear_history_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            self.record(format!("clear {conversation_id}"));
            self.outcome("clear", "/history/clear")
        })
    }

    fn delete_history<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            self.record(format!("delete {conversation_id}"));
            self.pass_gate("delete").await;
            self.outcome("delete", "/history/delete")?;
            self.history
                .lock()
                .unwrap()
                .retain(|entry| &entry.id != conversation_id);
            Ok(())
        })
    }

    fn delete_all_history<'a>(&'a self) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            self.record("delete_all".to_string());
            self.outcome("delete_all", "/history/delete_all")?;
            self.history.lock().unwrap().clear();
            Ok(())
        })
    }

    fn rename_history<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        title: &'a str,
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            self.record(format!("rename {conversation_id} {title}"));
            self.outcome("rename", "/history/rename")
        })
    }
}

impl SectionBackend for FakeCollaborator {
    fn generate_section<'a>(
        &'a self,
        title: &'a str,
        description: &'a str,
    ) -> BoxFuture<'a, ApiResult<String>> {
        Box::pin(async move {
            self.record(format!("section {title}"));
            self.pass_gate("section").await;
            self.outcome("section", "/section/generate")?;
            Ok(self
                .section_reply
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| format!("{title}: {description}")))
        })
    }
}

impl AccountBackend for FakeCollaborator {
    fn user_info<'a>(&'a self) -> BoxFuture<'a, ApiResult<Vec<UserInfo>>> {
        Box::pin(async move {
            self.record("user_info".to_string());
            Ok(self.users.lock().unwrap().clone())
        })
    }

    fn document<'a>(&'a self, document_id: &'a str) -> BoxFuture<'a, ApiResult<DocumentContent>> {
        Box::pin(async move {
            self.record(format!("document {document_id}"));
            Ok(DocumentContent {
                content: format!("excerpt of {document_id}"),
                full_content: format!("full text of {document_id}"),
            })
        })
    }
}

/// App wired to `fake`, with settings read from an empty temporary directory.
pub fn app_with(fake: &Arc<FakeCollaborator>, settings: ClientSettings) -> (App, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(docdraft::settings::SETTINGS_FILE_NAME);
    std::fs::write(&path, serde_json::to_string(&settings).unwrap()).unwrap();

    let app = App::with_collaborator(SettingsStore::new(path), fake.clone());
    (app, dir)
}

pub fn history_settings() -> ClientSettings {
    ClientSettings::default()
}

pub fn local_settings() -> ClientSettings {
    ClientSettings {
        history_enabled: false,
        ..ClientSettings::default()
    }
}
