//! Client side of the document-chat backend: frame decoding, collaborator traits and the
//! reqwest implementation.

pub mod backend;
pub mod error;
pub mod events;
pub mod frames;
pub mod http;
pub mod remote_error;
pub mod wire;

pub use backend::{
    AccountBackend, BoxFuture, Collaborator, ConversationBackend, HistoryBackend, SectionBackend,
};
pub use error::{ApiError, ApiResult, FrameError, FrameResult};
pub use events::{
    FrameEvent, FrameEventStream, FrameStreamHandle, StreamCanceller, StreamRoute, StreamWorker,
    event_channel,
};
pub use frames::FrameParser;
pub use http::{DEFAULT_REQUEST_TIMEOUT, HttpCollaborator, HttpConfig};
pub use remote_error::{DEFAULT_ERROR_TEXT, parse_error_message};
pub use wire::{
    ConversationRequest, DocumentContent, FrameChoice, FrameMessage, HistoryHealth,
    HistoryListEntry, HistoryMetadata, ResultFrame, UserClaim, UserInfo, display_name,
};
