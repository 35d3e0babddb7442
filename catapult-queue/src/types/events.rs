use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;

/// Event protocol for structured observability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job was pushed to the broker
    Enqueued {
        job_id: JobId,
        queue: String,
        at: DateTime<Utc>,
    },

    /// Handler succeeded and the job was acknowledged
    Acked {
        job_id: JobId,
        queue: String,
        at: DateTime<Utc>,
    },

    /// Job was handed back to the broker for redelivery
    Nacked {
        job_id: JobId,
        queue: String,
        reason: String,
        at: DateTime<Utc>,
    },

    /// Another worker holds the job's lock
    Skipped {
        job_id: JobId,
        queue: String,
        at: DateTime<Utc>,
    },

    /// Renewal lost the job's lock while the handler ran
    LockLost {
        job_id: JobId,
        queue: String,
        at: DateTime<Utc>,
    },

    /// Job was deleted through the producer API
    Removed {
        job_id: JobId,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Acked { .. } => "acked",
            Self::Nacked { .. } => "nacked",
            Self::Skipped { .. } => "skipped",
            Self::LockLost { .. } => "lock_lost",
            Self::Removed { .. } => "removed",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Enqueued { job_id, .. }
            | Self::Acked { job_id, .. }
            | Self::Nacked { job_id, .. }
            | Self::Skipped { job_id, .. }
            | Self::LockLost { job_id, .. }
            | Self::Removed { job_id, .. } => job_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Enqueued { at, .. }
            | Self::Acked { at, .. }
            | Self::Nacked { at, .. }
            | Self::Skipped { at, .. }
            | Self::LockLost { at, .. }
            | Self::Removed { at, .. } => at,
        }
    }
}
