//! Error types for queue operations.

use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Redis/Valkey store failure
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] courier_redis::RedisError),

    /// Backing store failure outside Redis
    #[error("Store error: {0}")]
    Store(String),

    /// Job could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored job could not be decoded
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Job rejected before it reached the store
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// Two processors claimed the same job type
    #[error("Processor already registered for job type: {0}")]
    DuplicateProcessor(String),

    /// Worker pool started twice
    #[error("Worker pool already running")]
    WorkerAlreadyRunning,

    /// Worker pool stopped while not running
    #[error("Worker pool not running")]
    WorkerNotRunning,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure reported by a job processor.
///
/// Any processor failure is treated as transient and retried with backoff.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProcessError {
    message: String,
}

impl ProcessError {
    /// Failure with a human-readable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The cause, as recorded in the job's `errorMessage`.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ProcessError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProcessError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<QueueError> for ProcessError {
    fn from(err: QueueError) -> Self {
        Self::new(err.to_string())
    }
}
