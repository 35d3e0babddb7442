use std::time::Duration;

/// Per-push broker options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOptions {
    /// Hold the job back this long before it can be fetched.
    /// When unset, the delay is derived from the job's ETA.
    pub delay: Option<Duration>,

    /// Requeue a fetched job that was not acked within this period
    pub retry: Option<Duration>,

    /// Drop the job from the broker after this long
    pub ttl: Option<Duration>,
}

impl PushOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_retry(mut self, retry: Duration) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}
