use docdraft_api::ApiError;
use docdraft_domain::TemplateError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("question is empty"))]
    EmptyQuestion { stage: &'static str },
    #[snafu(display("a response is still being generated; stop it before asking again"))]
    TurnInFlight { stage: &'static str },
    #[snafu(display("another {operation} request is still in progress"))]
    DestructiveInFlight {
        stage: &'static str,
        operation: &'static str,
    },
    #[snafu(display("no conversation is selected"))]
    NoCurrentConversation { stage: &'static str },
    #[snafu(display("conversation '{conversation_id}' is not in the history list"))]
    ConversationNotFound {
        stage: &'static str,
        conversation_id: String,
    },
    #[snafu(display("chat history is not available for {operation}"))]
    HistoryUnavailable {
        stage: &'static str,
        operation: &'static str,
    },
    #[snafu(display("{operation} failed: {source}"))]
    Remote {
        stage: &'static str,
        operation: &'static str,
        source: ApiError,
    },
    #[snafu(display("{source}"))]
    Template {
        stage: &'static str,
        source: TemplateError,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DraftError {
    #[snafu(display("no drafted document is open"))]
    NoDraft { stage: &'static str },
    #[snafu(display("section {index} does not exist (draft has {len} sections)"))]
    SectionOutOfRange {
        stage: &'static str,
        index: usize,
        len: usize,
    },
    #[snafu(display("section {index} needs a non-empty description to regenerate"))]
    EmptyDescription { stage: &'static str, index: usize },
    #[snafu(display("section {index} changed while its content was being generated"))]
    SectionChanged { stage: &'static str, index: usize },
    #[snafu(display("failed to generate section {index}: {source}"))]
    Generate {
        stage: &'static str,
        index: usize,
        source: ApiError,
    },
}

pub type DraftResult<T> = Result<T, DraftError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("failed to build the backend client: {source}"))]
    Collaborator {
        stage: &'static str,
        source: ApiError,
    },
}

pub type AppResult<T> = Result<T, AppError>;
