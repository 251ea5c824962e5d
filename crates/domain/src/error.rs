use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DomainError {
    #[snafu(display("{id_type} must not be empty"))]
    EmptyId {
        stage: &'static str,
        id_type: &'static str,
    },
    #[snafu(display("timestamp '{raw}' is not ISO-8601"))]
    InvalidTimestamp { stage: &'static str, raw: String },
}

pub type DomainResult<T> = Result<T, DomainError>;
