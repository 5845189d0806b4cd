use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("Unsupported service: {0}")]
    UnsupportedService(String),

    #[error("Missing field '{field}' in {service} payload")]
    MissingField { service: String, field: String },

    #[error("Unknown sync type: {0}")]
    UnknownSyncType(String),

    #[error("Invalid {service} payload: {reason}")]
    InvalidPayload { service: String, reason: String },
}

pub type Result<T> = std::result::Result<T, MatchError>;
