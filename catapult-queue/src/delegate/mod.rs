pub mod registry;

pub use registry::DelegateRegistry;

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::{Catapult, Job, JobError};

/// Handler for the jobs of one queue.
///
/// Returning `Err` or panicking nacks the job so the broker redelivers it.
/// The engine reference lets a handler enqueue follow-up work.
#[async_trait]
pub trait Delegate: Send + Sync {
    async fn handle(&self, job: Job, queue_name: &str, catapult: &Catapult) -> Result<(), JobError>;
}

/// Adapts an async closure into a [`Delegate`]
pub struct FnDelegate<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnDelegate<F, Fut>
where
    F: Fn(Job, String, Catapult) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), JobError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> Delegate for FnDelegate<F, Fut>
where
    F: Fn(Job, String, Catapult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    async fn handle(&self, job: Job, queue_name: &str, catapult: &Catapult) -> Result<(), JobError> {
        (self.f)(job, queue_name.to_string(), catapult.clone()).await
    }
}
