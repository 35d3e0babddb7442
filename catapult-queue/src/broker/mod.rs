pub mod memory;

#[cfg(feature = "disque")]
pub mod disque;

use async_trait::async_trait;
use std::time::Duration;

use crate::{JobDetails, JobId, PushOptions, QueueResult};

pub use memory::{MemoryBroker, DEFAULT_RETRY};

#[cfg(feature = "disque")]
pub use self::disque::DisqueBroker;

/// Queue broker primitives used by the engine.
///
/// Delivery is at-least-once: a fetched job that is neither acked nor
/// deleted may be handed out again.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Push a serialized payload and return the broker-assigned id.
    /// `timeout` bounds how long the broker may take to accept the job.
    async fn push(
        &self,
        queue: &str,
        payload: &str,
        timeout: Duration,
        options: &PushOptions,
    ) -> QueueResult<JobId>;

    /// Fetch up to `count` due jobs, waiting at most `timeout` for one
    async fn fetch_due(
        &self,
        queue: &str,
        count: usize,
        timeout: Duration,
    ) -> QueueResult<Vec<JobDetails>>;

    /// Job details, `None` when the broker no longer knows the job
    async fn get_details(&self, id: &JobId) -> QueueResult<Option<JobDetails>>;

    /// Remove a job whatever its state
    async fn delete(&self, id: &JobId) -> QueueResult<()>;

    /// Work succeeded, forget the job
    async fn ack(&self, id: &JobId) -> QueueResult<()>;

    /// Work failed, put the job back for redelivery
    async fn nack(&self, id: &JobId) -> QueueResult<()>;

    /// Release pooled connections
    async fn close(&self) -> QueueResult<()> {
        Ok(())
    }
}
