use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApiError {
    #[snafu(display("base URL '{base_url}' must start with http:// or https://"))]
    InvalidBaseUrl {
        stage: &'static str,
        base_url: String,
    },
    #[snafu(display("failed to build http client"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {endpoint} failed on `{stage}`, {source}"))]
    Transport {
        stage: &'static str,
        endpoint: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("{endpoint} returned status {status}: {message}"))]
    Status {
        stage: &'static str,
        endpoint: &'static str,
        status: u16,
        message: String,
    },
    #[snafu(display("failed to decode {endpoint} payload: {source}"))]
    Decode {
        stage: &'static str,
        endpoint: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("{endpoint} rejected the request: {details}"))]
    Rejected {
        stage: &'static str,
        endpoint: &'static str,
        details: String,
    },
}

impl ApiError {
    /// HTTP status reported by the collaborator, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FrameError {
    /// A frame parsed but carried an `error` field.
    #[snafu(display("{message}"))]
    Remote { stage: &'static str, message: String },
    #[snafu(display("frame is not a valid result object: {source}"))]
    Malformed {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("stream ended inside an incomplete frame ({pending_bytes} bytes pending)"))]
    Truncated {
        stage: &'static str,
        pending_bytes: usize,
    },
}

pub type FrameResult<T> = Result<T, FrameError>;
