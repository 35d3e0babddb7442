//! # catapult-queue: lock-guarded job processing
//!
//! Turns an at-least-once broker into single-owner execution per job.
//! Every delivered job runs inside a pipeline that claims a distributed
//! lock keyed by the job id, calls the queue's handler, acks or nacks the
//! job and releases the lock again.
//!
//! ## Guarantees
//!
//! - **One owner at a time**: a job whose lock is held elsewhere is
//!   skipped, not acked or nacked.
//! - **Fault containment**: handler errors and panics nack the job and the
//!   loop carries on with the next one.
//! - **Lock-lost abort**: if auto-renewal loses the lock mid-run the
//!   handler is dropped and the job is nacked.
//! - **Cooperative shutdown**: [`Catapult::close`] waits for the loop to
//!   finish its current batch and acknowledge.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use catapult_queue::prelude::*;
//! use chrono::Utc;
//!
//! # async fn run() -> QueueResult<()> {
//! let catapult = Catapult::in_memory();
//!
//! catapult.delegate("emails", |job, _queue, _catapult| async move {
//!     println!("sending {}", job.body);
//!     Ok(())
//! })?;
//!
//! let job = catapult.add("emails", "hello", Utc::now(), None).await?;
//! println!("queued {}", job.id);
//!
//! let worker = catapult.clone();
//! let loop_task = tokio::spawn(async move { worker.process("emails", 10).await });
//!
//! // ...
//! catapult.close().await?;
//! let _ = loop_task.await;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod delegate;
pub mod engine;
pub mod error;
pub mod observability;
pub mod types;

pub use broker::{Broker, MemoryBroker};
pub use config::{CatapultConfig, DisqueConnectOptions, DEFAULT_KEY_PREFIX};
pub use delegate::{Delegate, DelegateRegistry, FnDelegate};
pub use engine::{Catapult, EngineState, JobOutcome};
pub use error::{JobError, QueueError, QueueResult};
pub use observability::{LiveMetrics, MetricsSnapshot, ObservabilityLayer};
pub use types::{Job, JobDetails, JobEvent, JobId, JobPayload, PushOptions};

#[cfg(feature = "disque")]
pub use broker::DisqueBroker;

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

pub use catapult_lock::{LockOptions, MemoryStore, RedisConnectOptions};

#[cfg(feature = "redis")]
pub use catapult_lock::RedisStore;

/// Everything needed to register handlers and run a loop
pub mod prelude {
    pub use crate::{
        Catapult, CatapultConfig, Delegate, EngineState, Job, JobError, JobId, JobOutcome,
        PushOptions, QueueError, QueueResult,
    };

    pub use async_trait::async_trait;
}
