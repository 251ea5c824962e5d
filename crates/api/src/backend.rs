use std::future::Future;
use std::pin::Pin;

use docdraft_domain::{ChatMessage, Conversation, ConversationId};

use super::error::ApiResult;
use super::events::FrameStreamHandle;
use super::wire::{ConversationRequest, DocumentContent, HistoryHealth, UserInfo};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Streaming chat completion, with or without history persistence.
///
/// The returned worker must be spawned for frames to flow.
pub trait ConversationBackend: Send + Sync {
    fn stream_conversation(&self, request: ConversationRequest) -> FrameStreamHandle;
    fn stream_history_generate(&self, request: ConversationRequest) -> FrameStreamHandle;
}

/// Remote conversation store.
pub trait HistoryBackend: Send + Sync {
    /// Never fails; transport problems map to [`HistoryHealth::NotWorking`].
    fn ensure_history<'a>(&'a self) -> BoxFuture<'a, HistoryHealth>;
    fn list_history<'a>(&'a self, offset: usize) -> BoxFuture<'a, ApiResult<Vec<Conversation>>>;
    fn read_history<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ApiResult<Vec<ChatMessage>>>;
    fn update_history<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        messages: &'a [ChatMessage],
    ) -> BoxFuture<'a, ApiResult<()>>;
    fn clear_history_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ApiResult<()>>;
    fn delete_history<'a>(&'a self, conversation_id: &'a ConversationId)
    -> BoxFuture<'a, ApiResult<()>>;
    fn delete_all_history<'a>(&'a self) -> BoxFuture<'a, ApiResult<()>>;
    fn rename_history<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        title: &'a str,
    ) -> BoxFuture<'a, ApiResult<()>>;
}

pub trait SectionBackend: Send + Sync {
    fn generate_section<'a>(
        &'a self,
        title: &'a str,
        description: &'a str,
    ) -> BoxFuture<'a, ApiResult<String>>;
}

pub trait AccountBackend: Send + Sync {
    fn user_info<'a>(&'a self) -> BoxFuture<'a, ApiResult<Vec<UserInfo>>>;
    fn document<'a>(&'a self, document_id: &'a str) -> BoxFuture<'a, ApiResult<DocumentContent>>;
}

pub trait Collaborator: ConversationBackend + HistoryBackend + SectionBackend + AccountBackend {}

impl<T> Collaborator for T where
    T: ConversationBackend + HistoryBackend + SectionBackend + AccountBackend
{
}
