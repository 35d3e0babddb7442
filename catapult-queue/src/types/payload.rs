use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{QueueError, QueueResult};

/// Message body stored in the broker.
///
/// The job identifier is broker metadata and never part of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobPayload {
    pub body: String,
    #[serde(rename = "ETA")]
    pub eta: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobPayload {
    /// Payload created now for a job due at `eta`
    pub fn new(body: impl Into<String>, eta: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            body: body.into(),
            eta,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_json(&self) -> QueueResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the payload of job `id`
    pub fn from_json(id: &str, data: &str) -> QueueResult<Self> {
        serde_json::from_str(data).map_err(|e| QueueError::PayloadDecode {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }
}
