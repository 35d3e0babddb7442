use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::Delegate;
use crate::{QueueError, QueueResult};

/// Queue name to handler mapping. The last registration for a name wins.
#[derive(Default)]
pub struct DelegateRegistry {
    delegates: RwLock<HashMap<String, Arc<dyn Delegate>>>,
}

impl DelegateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or replace the handler for `queue_name`
    pub fn register(&self, queue_name: &str, delegate: Arc<dyn Delegate>) -> QueueResult<()> {
        if queue_name.is_empty() {
            return Err(QueueError::EmptyQueueName);
        }

        let replaced = self
            .delegates
            .write()
            .insert(queue_name.to_string(), delegate)
            .is_some();
        debug!(queue = queue_name, replaced, "Registered delegate");
        Ok(())
    }

    pub fn lookup(&self, queue_name: &str) -> Option<Arc<dyn Delegate>> {
        self.delegates.read().get(queue_name).cloned()
    }

    pub fn is_registered(&self, queue_name: &str) -> bool {
        self.delegates.read().contains_key(queue_name)
    }

    /// Names of all queues with a handler
    pub fn queues(&self) -> Vec<String> {
        self.delegates.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for DelegateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateRegistry")
            .field("queues", &self.queues())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Catapult, Job, JobError};
    use async_trait::async_trait;

    struct Tagged(&'static str);

    #[async_trait]
    impl Delegate for Tagged {
        async fn handle(&self, _job: Job, _queue: &str, _catapult: &Catapult) -> Result<(), JobError> {
            Err(JobError::permanent(self.0))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = DelegateRegistry::new();
        registry.register("emails", Arc::new(Tagged("first"))).unwrap();

        assert!(registry.is_registered("emails"));
        assert!(registry.lookup("emails").is_some());
        assert!(registry.lookup("reports").is_none());
        assert_eq!(registry.queues(), vec!["emails".to_string()]);
    }

    #[test]
    fn test_empty_queue_name_rejected() {
        let registry = DelegateRegistry::new();
        let result = registry.register("", Arc::new(Tagged("x")));
        assert!(matches!(result, Err(QueueError::EmptyQueueName)));
        assert!(registry.queues().is_empty());
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let registry = DelegateRegistry::new();
        registry.register("q", Arc::new(Tagged("first"))).unwrap();
        registry.register("q", Arc::new(Tagged("second"))).unwrap();

        let catapult = Catapult::in_memory();
        let job = Job::pushed(
            crate::JobId::from("J-1"),
            "q",
            crate::JobPayload::new("body", chrono::Utc::now()),
        );
        let delegate = registry.lookup("q").unwrap();
        let err = delegate.handle(job, "q", &catapult).await.unwrap_err();

        assert_eq!(err.message(), "second");
        assert_eq!(registry.queues().len(), 1);
    }
}
