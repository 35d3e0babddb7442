use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::trace;

use super::LiveMetrics;
use crate::{JobEvent, JobId};

const EVENT_CAPACITY: usize = 10_000;

/// Broadcasts [`JobEvent`]s and keeps the matching counters
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<JobEvent>,
    metrics: Arc<LiveMetrics>,
}

impl ObservabilityLayer {
    pub fn new() -> Self {
        let (event_broadcaster, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            event_broadcaster,
            metrics: Arc::new(LiveMetrics::new()),
        }
    }

    pub fn record_job_enqueued(&self, job_id: &JobId, queue: &str) {
        self.metrics.increment_jobs_enqueued();
        self.emit(JobEvent::Enqueued {
            job_id: job_id.clone(),
            queue: queue.to_string(),
            at: Utc::now(),
        });
    }

    pub fn record_job_acked(&self, job_id: &JobId, queue: &str) {
        self.metrics.increment_jobs_acked();
        self.emit(JobEvent::Acked {
            job_id: job_id.clone(),
            queue: queue.to_string(),
            at: Utc::now(),
        });
    }

    pub fn record_job_nacked(&self, job_id: &JobId, queue: &str, reason: &str) {
        self.metrics.increment_jobs_nacked();
        self.emit(JobEvent::Nacked {
            job_id: job_id.clone(),
            queue: queue.to_string(),
            reason: reason.to_string(),
            at: Utc::now(),
        });
    }

    pub fn record_job_skipped(&self, job_id: &JobId, queue: &str) {
        self.metrics.increment_jobs_skipped();
        self.emit(JobEvent::Skipped {
            job_id: job_id.clone(),
            queue: queue.to_string(),
            at: Utc::now(),
        });
    }

    pub fn record_lock_lost(&self, job_id: &JobId, queue: &str) {
        self.metrics.increment_locks_lost();
        self.emit(JobEvent::LockLost {
            job_id: job_id.clone(),
            queue: queue.to_string(),
            at: Utc::now(),
        });
    }

    pub fn record_job_removed(&self, job_id: &JobId) {
        self.metrics.increment_jobs_removed();
        self.emit(JobEvent::Removed {
            job_id: job_id.clone(),
            at: Utc::now(),
        });
    }

    /// Subscribe to events recorded from now on
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_broadcaster.subscribe()
    }

    /// Events as a stream. Events dropped by a lagging subscriber are skipped.
    pub fn event_stream(&self) -> impl futures::Stream<Item = JobEvent> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|event| event.ok())
    }

    pub fn metrics(&self) -> &LiveMetrics {
        &self.metrics
    }

    fn emit(&self, event: JobEvent) {
        trace!(event = event.event_name(), job_id = %event.job_id(), "Job event");
        // No subscribers is fine
        let _ = self.event_broadcaster.send(event);
    }
}

impl Default for ObservabilityLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObservabilityLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservabilityLayer")
            .field("metrics", &self.metrics.snapshot())
            .field("subscribers", &self.event_broadcaster.receiver_count())
            .finish()
    }
}
