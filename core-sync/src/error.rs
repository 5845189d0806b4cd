use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("{queue} queue is full")]
    QueueFull { queue: String },

    #[error("Invalid sync request: {0}")]
    InvalidRequest(String),

    #[error("Service not registered: {0}")]
    UnknownService(String),

    #[error("Invalid sync mode: {0}")]
    InvalidSyncMode(String),

    #[error("Scheduled sync requires a schedule")]
    MissingSchedule,

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Service {0} is already registered")]
    ServiceAlreadyRegistered(String),

    #[error("Service {0} not found")]
    ServiceNotFound(String),

    #[error("Missing capability: {0}")]
    CapabilityMissing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync engine is already running")]
    AlreadyRunning,

    #[error("Sync engine has stopped accepting jobs")]
    EngineStopped,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Sync result for job {job_id} not found")]
    ResultNotFound { job_id: String },

    #[error("Sync job {job_id} not found")]
    JobNotFound { job_id: String },

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("Invalid job status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<core_runtime::Error> for SyncError {
    fn from(err: core_runtime::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
