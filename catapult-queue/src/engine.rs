use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use catapult_lock::{Lock, LockStore, MemoryStore};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    broker::{Broker, MemoryBroker},
    delegate::{Delegate, DelegateRegistry, FnDelegate},
    observability::ObservabilityLayer,
    CatapultConfig, Job, JobDetails, JobError, JobId, JobPayload, PushOptions, QueueError,
    QueueResult,
};

/// A stop request carries the channel its acknowledgment goes back on
type StopRequest = oneshot::Sender<()>;

/// Lifecycle of the processing loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// `process` has not started yet
    Idle,
    Running,
    /// The loop acknowledged a stop request or was dropped
    Stopped,
}

/// What the guarded pipeline did with one delivered job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Handler succeeded and the ack was sent
    Acked,
    /// Handler failed or panicked, or the payload could not be decoded
    Nacked,
    /// Another worker holds the job, or already settled it
    Skipped,
    /// Renewal lost the lock while the handler ran; the handler was dropped
    LockLost,
}

struct RunState {
    state: EngineState,
    control: Option<oneshot::Sender<StopRequest>>,
    /// Set by `close`; a loop that has not started yet must not start
    closed: bool,
}

/// Marks the loop stopped however `process` exits, including cancellation
struct RunGuard<'a> {
    run: &'a Mutex<RunState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut run = self.run.lock();
        run.state = EngineState::Stopped;
        run.control = None;
    }
}

struct Inner {
    broker: Arc<dyn Broker>,
    store: Arc<dyn LockStore>,
    registry: DelegateRegistry,
    config: CatapultConfig,
    observability: ObservabilityLayer,
    run: Mutex<RunState>,
}

/// Job engine: producer API plus the lock-guarded processing loop.
///
/// Cloning is cheap and every clone drives the same engine, which is how
/// handlers receive it. Parallel processing of one queue takes several
/// engines sharing a broker and a lock store.
#[derive(Clone)]
pub struct Catapult {
    inner: Arc<Inner>,
}

impl Catapult {
    pub fn new(broker: Arc<dyn Broker>, store: Arc<dyn LockStore>, config: CatapultConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                broker,
                store,
                registry: DelegateRegistry::new(),
                config,
                observability: ObservabilityLayer::new(),
                run: Mutex::new(RunState {
                    state: EngineState::Idle,
                    control: None,
                    closed: false,
                }),
            }),
        }
    }

    /// Engine over a fresh [`MemoryBroker`] and [`MemoryStore`]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryBroker::new()),
            Arc::new(MemoryStore::new()),
            CatapultConfig::default(),
        )
    }

    /// Connect to Disque and Redis with the given configuration
    #[cfg(all(feature = "redis", feature = "disque"))]
    pub async fn connect(config: CatapultConfig) -> QueueResult<Self> {
        let broker = crate::broker::DisqueBroker::connect(&config.disque).await?;
        let store = catapult_lock::RedisStore::connect(&config.redis).await?;
        info!(
            disque = %config.disque.address,
            redis = %config.redis.address,
            "Connected"
        );
        Ok(Self::new(Arc::new(broker), Arc::new(store), config))
    }

    pub fn config(&self) -> &CatapultConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &DelegateRegistry {
        &self.inner.registry
    }

    pub fn observability(&self) -> &ObservabilityLayer {
        &self.inner.observability
    }

    pub fn state(&self) -> EngineState {
        self.inner.run.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Register an async closure as the handler for `queue_name`
    pub fn delegate<F, Fut>(&self, queue_name: &str, f: F) -> QueueResult<()>
    where
        F: Fn(Job, String, Catapult) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), JobError>> + Send + 'static,
    {
        self.register(queue_name, Arc::new(FnDelegate::new(f)))
    }

    /// Register a handler for `queue_name`, replacing any previous one
    pub fn register(&self, queue_name: &str, delegate: Arc<dyn Delegate>) -> QueueResult<()> {
        self.inner.registry.register(queue_name, delegate)
    }

    /// Push a job due at `eta`.
    ///
    /// Without an explicit `delay` in `options` the broker holds the job
    /// back until the ETA, rounded up to whole seconds.
    #[instrument(skip(self, body, options), fields(queue = queue_name))]
    pub async fn add(
        &self,
        queue_name: &str,
        body: impl Into<String>,
        eta: DateTime<Utc>,
        options: Option<PushOptions>,
    ) -> QueueResult<Job> {
        if queue_name.is_empty() {
            return Err(QueueError::EmptyQueueName);
        }

        let payload = JobPayload::new(body, eta);
        let mut options = options.unwrap_or_default();
        if options.delay.is_none() {
            options.delay = delay_until(eta, payload.created_at);
        }

        let data = payload.to_json()?;
        let id = self
            .inner
            .broker
            .push(queue_name, &data, self.inner.config.job_timeout, &options)
            .await?;

        self.inner.observability.record_job_enqueued(&id, queue_name);
        debug!(job_id = %id, "Enqueued job");
        Ok(Job::pushed(id, queue_name, payload))
    }

    /// Look a job up. `Ok(None)` when the broker no longer knows it.
    pub async fn get(&self, id: &JobId) -> QueueResult<Option<Job>> {
        match self.inner.broker.get_details(id).await? {
            Some(details) => Job::from_details(details).map(Some),
            None => Ok(None),
        }
    }

    /// Delete a job whatever its state
    pub async fn remove(&self, id: &JobId) -> QueueResult<()> {
        self.inner.broker.delete(id).await?;
        self.inner.observability.record_job_removed(id);
        debug!(job_id = %id, "Removed job");
        Ok(())
    }

    /// Run the processing loop for `queue_name` until [`close`](Self::close).
    ///
    /// Returns at once when no handler is registered for the queue, this
    /// engine already runs a loop, or it has been closed. Each cycle fetches up to `batch_size`
    /// due jobs and runs them one after another through the guarded
    /// pipeline. The stop request is checked between batches.
    #[instrument(skip(self), fields(queue = queue_name))]
    pub async fn process(&self, queue_name: &str, batch_size: usize) {
        let Some(delegate) = self.inner.registry.lookup(queue_name) else {
            debug!("No delegate registered, not processing");
            return;
        };

        let mut control = {
            let mut run = self.inner.run.lock();
            if run.closed {
                debug!("Engine is closed, not processing");
                return;
            }
            if run.state == EngineState::Running {
                warn!("Engine is already processing, ignoring second loop");
                return;
            }
            let (control_tx, control_rx) = oneshot::channel();
            run.state = EngineState::Running;
            run.control = Some(control_tx);
            control_rx
        };
        let guard = RunGuard {
            run: &self.inner.run,
        };

        let batch_size = batch_size.max(1);
        info!(batch_size, "Processing started");

        loop {
            match control.try_recv() {
                Ok(ack) => {
                    drop(guard);
                    let _ = ack.send(());
                    info!("Processing stopped");
                    return;
                }
                Err(TryRecvError::Closed) => {
                    info!("Control channel closed, processing stopped");
                    return;
                }
                Err(TryRecvError::Empty) => {}
            }

            let batch = match self
                .inner
                .broker
                .fetch_due(queue_name, batch_size, self.inner.config.fetch_timeout)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("Failed to fetch jobs: {}", e);
                    tokio::time::sleep(self.inner.config.error_backoff).await;
                    continue;
                }
            };

            for details in batch {
                self.run_guarded(queue_name, delegate.as_ref(), details).await;
            }

            // Nacked jobs come straight back, let other tasks run in between
            tokio::task::yield_now().await;
        }
    }

    /// Stop the processing loop, wait for it to acknowledge, then close the
    /// broker and the store. The connections are closed even if the loop
    /// could not be reached.
    #[instrument(skip(self))]
    pub async fn close(&self) -> QueueResult<()> {
        let control = {
            let mut run = self.inner.run.lock();
            run.closed = true;
            run.control.take()
        };
        if let Some(control) = control {
            let (ack_tx, ack_rx) = oneshot::channel();
            if control.send(ack_tx).is_err() || ack_rx.await.is_err() {
                warn!("Processing loop exited without acknowledging stop");
            }
        }

        let broker = self.inner.broker.close().await;
        let store = self.inner.store.close().await;
        info!("Closed");
        broker?;
        store?;
        Ok(())
    }

    /// Lock, run, settle and unlock one delivered job
    #[instrument(skip(self, delegate, details), fields(job_id = %details.id))]
    pub(crate) async fn run_guarded(
        &self,
        queue_name: &str,
        delegate: &dyn Delegate,
        details: JobDetails,
    ) -> JobOutcome {
        let id = details.id.clone();
        let job = match Job::from_details(details) {
            Ok(job) => job,
            Err(e) => {
                warn!("Nacking job with undecodable payload: {}", e);
                self.nack(&id, queue_name, &e.to_string()).await;
                return JobOutcome::Nacked;
            }
        };

        let lock = Lock::new(
            self.inner.store.clone(),
            job.lock_key(&self.inner.config.key_prefix),
            true,
        )
        .with_options(self.inner.config.lock.clone());

        if let Err(e) = lock.acquire().await {
            debug!("Skipping job: {}", e);
            self.inner.observability.record_job_skipped(&id, queue_name);
            return JobOutcome::Skipped;
        }

        let outcome = self.run_locked(&lock, queue_name, delegate, job).await;
        lock.release().await;
        outcome
    }

    async fn run_locked(
        &self,
        lock: &Lock,
        queue_name: &str,
        delegate: &dyn Delegate,
        job: Job,
    ) -> JobOutcome {
        let id = job.id.clone();

        // A redelivered copy may have waited on the lock while its twin
        // ran and got acked.
        match self.inner.broker.get_details(&id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("Job already settled, skipping");
                self.inner.observability.record_job_skipped(&id, queue_name);
                return JobOutcome::Skipped;
            }
            Err(e) => {
                warn!("Could not confirm job before running it: {}", e);
                self.inner.observability.record_job_skipped(&id, queue_name);
                return JobOutcome::Skipped;
            }
        }

        let handler = AssertUnwindSafe(delegate.handle(job, queue_name, self)).catch_unwind();
        let finished = match lock.take_lost_signal() {
            Some(lost) => tokio::select! {
                biased;
                error = lost.lost() => Err(error),
                result = handler => Ok(result),
            },
            None => Ok(handler.await),
        };

        match finished {
            Ok(Ok(Ok(()))) => {
                match self.inner.broker.ack(&id).await {
                    Ok(()) => {
                        debug!("Acked job");
                        self.inner.observability.record_job_acked(&id, queue_name);
                    }
                    Err(e) => warn!("Failed to ack job, it stays outstanding: {}", e),
                }
                JobOutcome::Acked
            }
            Ok(Ok(Err(e))) => {
                warn!("Job failed: {}", e);
                self.nack(&id, queue_name, &e.to_string()).await;
                JobOutcome::Nacked
            }
            Ok(Err(panic)) => {
                let reason = panic_message(panic.as_ref());
                warn!("Job panicked: {}", reason);
                self.nack(&id, queue_name, &reason).await;
                JobOutcome::Nacked
            }
            Err(e) => {
                error!("Aborted job after losing its lock: {}", e);
                self.inner.observability.record_lock_lost(&id, queue_name);
                if let Err(e) = self.inner.broker.nack(&id).await {
                    warn!("Failed to nack job: {}", e);
                }
                JobOutcome::LockLost
            }
        }
    }

    async fn nack(&self, id: &JobId, queue_name: &str, reason: &str) {
        match self.inner.broker.nack(id).await {
            Ok(()) => self.inner.observability.record_job_nacked(id, queue_name, reason),
            Err(e) => warn!(job_id = %id, "Failed to nack job: {}", e),
        }
    }
}

impl std::fmt::Debug for Catapult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catapult")
            .field("state", &self.state())
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Whole seconds from `now` until `eta`, rounded up; `None` when already due
fn delay_until(eta: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    let millis = (eta - now).num_milliseconds();
    if millis <= 0 {
        return None;
    }
    let secs = (millis as u64).div_ceil(1000);
    Some(Duration::from_secs(secs))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
