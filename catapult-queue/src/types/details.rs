use serde::{Deserialize, Serialize};

use super::JobId;

/// Job as reported by the broker, before the payload is decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetails {
    /// Broker-assigned identifier
    pub id: JobId,

    /// Queue the job was pushed to
    pub queue: String,

    /// Serialized [`JobPayload`](super::JobPayload)
    pub body: String,

    /// Times the job was negatively acknowledged
    pub nacks: u32,

    /// Deliveries beyond the first, nacks excluded
    pub additional_deliveries: u32,
}

impl JobDetails {
    pub fn new(id: JobId, queue: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            queue: queue.into(),
            body: body.into(),
            nacks: 0,
            additional_deliveries: 0,
        }
    }
}
