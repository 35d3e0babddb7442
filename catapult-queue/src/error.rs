use catapult_lock::{LockError, StoreError};
use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for queue operations
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    /// Transient broker failure, retried on the next fetch cycle
    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Failed to decode payload of job {id}: {reason}")]
    PayloadDecode { id: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Queue name must not be empty")]
    EmptyQueueName,

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Broker has been closed")]
    Closed,
}

/// Handler outcome. Either variant nacks the job so the broker redelivers it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Retryable error, expected to succeed on redelivery
    #[error("Retryable error: {0}")]
    Retryable(String),

    /// Permanent error, redelivery is unlikely to help
    #[error("Permanent error: {0}")]
    Permanent(String),
}

impl JobError {
    /// Create a retryable error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "disque")]
impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        Self::Broker(err.to_string())
    }
}
