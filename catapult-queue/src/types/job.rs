use chrono::{DateTime, Utc};

use super::{JobDetails, JobId, JobPayload};
use crate::QueueResult;

/// Read-only snapshot of a queued job.
///
/// Built on push or reconstructed from broker details; the engine only
/// forwards its id to ack, nack and delete.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Broker-assigned identifier
    pub id: JobId,
    pub queue_name: String,
    pub body: String,
    /// Earliest time the job becomes eligible for delivery
    pub eta: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Broker details the job was decoded from, absent right after push
    pub raw: Option<JobDetails>,
}

impl Job {
    /// Job just pushed under `id`
    pub fn pushed(id: JobId, queue_name: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            id,
            queue_name: queue_name.into(),
            body: payload.body,
            eta: payload.eta,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            raw: None,
        }
    }

    /// Decode broker details into a job
    pub fn from_details(details: JobDetails) -> QueueResult<Self> {
        let payload = JobPayload::from_json(details.id.as_str(), &details.body)?;
        Ok(Self {
            id: details.id.clone(),
            queue_name: details.queue.clone(),
            body: payload.body,
            eta: payload.eta,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            raw: Some(details),
        })
    }

    /// Namespaced key guarding execution of this job
    pub fn lock_key(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.id)
    }
}
