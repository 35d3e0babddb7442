use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters for engine activity
#[derive(Debug, Default)]
pub struct LiveMetrics {
    jobs_enqueued: AtomicU64,
    jobs_acked: AtomicU64,
    jobs_nacked: AtomicU64,
    jobs_skipped: AtomicU64,
    locks_lost: AtomicU64,
    jobs_removed: AtomicU64,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_jobs_enqueued(&self) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_acked(&self) {
        self.jobs_acked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_nacked(&self) {
        self.jobs_nacked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_skipped(&self) {
        self.jobs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_locks_lost(&self) {
        self.locks_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_removed(&self) {
        self.jobs_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn jobs_enqueued(&self) -> u64 {
        self.jobs_enqueued.load(Ordering::Relaxed)
    }

    pub fn jobs_acked(&self) -> u64 {
        self.jobs_acked.load(Ordering::Relaxed)
    }

    pub fn jobs_nacked(&self) -> u64 {
        self.jobs_nacked.load(Ordering::Relaxed)
    }

    pub fn jobs_skipped(&self) -> u64 {
        self.jobs_skipped.load(Ordering::Relaxed)
    }

    pub fn locks_lost(&self) -> u64 {
        self.locks_lost.load(Ordering::Relaxed)
    }

    pub fn jobs_removed(&self) -> u64 {
        self.jobs_removed.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_enqueued: self.jobs_enqueued(),
            jobs_acked: self.jobs_acked(),
            jobs_nacked: self.jobs_nacked(),
            jobs_skipped: self.jobs_skipped(),
            locks_lost: self.locks_lost(),
            jobs_removed: self.jobs_removed(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_enqueued: u64,
    pub jobs_acked: u64,
    pub jobs_nacked: u64,
    pub jobs_skipped: u64,
    pub locks_lost: u64,
    pub jobs_removed: u64,
}

impl MetricsSnapshot {
    /// Share of finished pipeline runs that ended in an ack, as a percentage
    pub fn success_rate(&self) -> f64 {
        let finished = self.jobs_acked + self.jobs_nacked + self.locks_lost;
        if finished == 0 {
            100.0
        } else {
            (self.jobs_acked as f64 / finished as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = LiveMetrics::new();
        metrics.increment_jobs_enqueued();
        metrics.increment_jobs_enqueued();
        metrics.increment_jobs_acked();
        metrics.increment_jobs_nacked();
        metrics.increment_jobs_skipped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_enqueued, 2);
        assert_eq!(snapshot.jobs_acked, 1);
        assert_eq!(snapshot.jobs_nacked, 1);
        assert_eq!(snapshot.jobs_skipped, 1);
        assert_eq!(snapshot.locks_lost, 0);
        assert_eq!(snapshot.success_rate(), 50.0);
    }

    #[test]
    fn test_success_rate_without_work() {
        assert_eq!(MetricsSnapshot::default().success_rate(), 100.0);
    }
}
