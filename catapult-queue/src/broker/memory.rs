use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::{broker::Broker, JobDetails, JobId, PushOptions, QueueError, QueueResult};

/// How often a waiting fetch re-checks for due jobs
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Requeue period for jobs pushed without one, Disque's default
pub const DEFAULT_RETRY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Queued,
    Active { requeue_at: Option<Instant> },
}

#[derive(Debug, Clone)]
struct Entry {
    details: JobDetails,
    state: EntryState,
    ready_at: Instant,
    retry: Duration,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, Entry>,
    /// queue name -> queued job ids in FIFO order
    queues: HashMap<String, VecDeque<JobId>>,
}

impl Inner {
    /// Expire TTLs and hand back jobs whose retry period ran out
    fn housekeep(&mut self, now: Instant) {
        let expired: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|(_, e)| e.expires_at.is_some_and(|at| at <= now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.remove(&id);
        }

        let mut requeued = Vec::new();
        for (id, entry) in self.jobs.iter_mut() {
            if let EntryState::Active { requeue_at: Some(at) } = entry.state {
                if at <= now {
                    entry.state = EntryState::Queued;
                    entry.details.additional_deliveries += 1;
                    requeued.push((entry.details.queue.clone(), id.clone()));
                }
            }
        }
        for (queue, id) in requeued {
            self.queues.entry(queue).or_default().push_back(id);
        }
    }

    fn take_ready(&mut self, queue: &str, count: usize, now: Instant) -> Vec<JobDetails> {
        let Some(ids) = self.queues.get_mut(queue) else {
            return Vec::new();
        };

        let mut batch = Vec::new();
        let mut index = 0;
        while index < ids.len() && batch.len() < count {
            let ready = self.jobs.get(&ids[index]).map(|e| e.ready_at <= now);
            match ready {
                Some(true) => {
                    if let Some(id) = ids.remove(index) {
                        if let Some(entry) = self.jobs.get_mut(&id) {
                            entry.state = EntryState::Active {
                                requeue_at: Some(now + entry.retry),
                            };
                            batch.push(entry.details.clone());
                        }
                    }
                }
                Some(false) => index += 1,
                None => {
                    ids.remove(index);
                }
            }
        }
        batch
    }

    fn remove(&mut self, id: &JobId) -> bool {
        let Some(entry) = self.jobs.remove(id) else {
            return false;
        };
        if let Some(ids) = self.queues.get_mut(&entry.details.queue) {
            ids.retain(|queued| queued != id);
        }
        true
    }
}

/// In-memory broker with Disque-like semantics for tests and development.
///
/// Jobs become due after their delay, are handed out FIFO per queue,
/// return to the queue on nack or when their retry period lapses
/// ([`DEFAULT_RETRY`] unless the push sets one), and
/// disappear on ack or delete.
#[derive(Debug)]
pub struct MemoryBroker {
    inner: Mutex<Inner>,
    closed: AtomicBool,
    default_retry: Duration,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            closed: AtomicBool::new(false),
            default_retry: DEFAULT_RETRY,
        }
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requeue period for pushes that do not set `retry`
    pub fn with_default_retry(mut self, retry: Duration) -> Self {
        self.default_retry = retry;
        self
    }

    /// Number of jobs the broker still knows about
    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Jobs waiting in `queue`, due or not
    pub fn queued(&self, queue: &str) -> usize {
        self.inner.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    fn ensure_open(&self) -> QueueResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn push(
        &self,
        queue: &str,
        payload: &str,
        _timeout: Duration,
        options: &PushOptions,
    ) -> QueueResult<JobId> {
        self.ensure_open()?;
        let now = Instant::now();
        let id = JobId::new();

        let entry = Entry {
            details: JobDetails::new(id.clone(), queue, payload),
            state: EntryState::Queued,
            ready_at: now + options.delay.unwrap_or_default(),
            retry: options.retry.unwrap_or(self.default_retry),
            expires_at: options.ttl.map(|ttl| now + ttl),
        };

        let mut inner = self.inner.lock();
        inner.jobs.insert(id.clone(), entry);
        inner.queues.entry(queue.to_string()).or_default().push_back(id.clone());

        debug!("Pushed job {} to queue {}", id, queue);
        Ok(id)
    }

    async fn fetch_due(
        &self,
        queue: &str,
        count: usize,
        timeout: Duration,
    ) -> QueueResult<Vec<JobDetails>> {
        let deadline = Instant::now() + timeout;

        loop {
            self.ensure_open()?;
            let now = Instant::now();
            let batch = {
                let mut inner = self.inner.lock();
                inner.housekeep(now);
                inner.take_ready(queue, count, now)
            };

            if !batch.is_empty() || now >= deadline {
                return Ok(batch);
            }

            sleep_until(deadline.min(now + POLL_INTERVAL)).await;
        }
    }

    async fn get_details(&self, id: &JobId) -> QueueResult<Option<JobDetails>> {
        self.ensure_open()?;
        let mut inner = self.inner.lock();
        inner.housekeep(Instant::now());
        Ok(inner.jobs.get(id).map(|e| e.details.clone()))
    }

    async fn delete(&self, id: &JobId) -> QueueResult<()> {
        self.ensure_open()?;
        self.inner.lock().remove(id);
        Ok(())
    }

    async fn ack(&self, id: &JobId) -> QueueResult<()> {
        self.ensure_open()?;
        self.inner.lock().remove(id);
        Ok(())
    }

    async fn nack(&self, id: &JobId) -> QueueResult<()> {
        self.ensure_open()?;
        let mut inner = self.inner.lock();
        let Some(entry) = inner.jobs.get_mut(id) else {
            return Ok(());
        };

        entry.details.nacks += 1;
        if entry.state != EntryState::Queued {
            entry.state = EntryState::Queued;
            entry.ready_at = Instant::now();
            let queue = entry.details.queue.clone();
            inner.queues.entry(queue).or_default().push_back(id.clone());
        }
        Ok(())
    }

    async fn close(&self) -> QueueResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
