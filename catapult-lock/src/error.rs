use thiserror::Error;

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Result type for store primitives
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a [`LockStore`](crate::LockStore) implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Store command failed: {0}")]
    Command(String),

    #[error("Store has been closed")]
    Closed,
}

/// Lock service errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Expected contention outcome, the caller should back off
    #[error("Failed to acquire lock on '{key}' after {attempts} attempts")]
    AcquisitionExhausted { key: String, attempts: u32 },

    #[error("Lock extension failed: {0}")]
    ExtensionFailed(String),

    /// The store no longer holds our token, mutual exclusion may be broken
    #[error("Lock on '{0}' was lost during auto renewal")]
    LockLost(String),

    #[error("Lock on '{0}' is already held by this instance")]
    AlreadyHeld(String),

    #[error("Failed to generate lock token: {0}")]
    TokenGeneration(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LockError {
    /// Check if this error is plain contention rather than a fault
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::AcquisitionExhausted { .. })
    }

    /// Check if this error means exclusivity can no longer be assumed
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ExtensionFailed(_) | Self::LockLost(_))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            Self::Connection(err.to_string())
        } else {
            Self::Command(err.to_string())
        }
    }
}
