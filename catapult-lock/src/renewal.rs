use std::sync::Arc;

use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, trace};

use crate::{
    lock::{extend_held, LockState},
    store::LockStore,
    LockError, LockOptions,
};

type StopRequest = oneshot::Sender<()>;

/// Handle on the background task that keeps an auto-renewing lock alive
pub(crate) struct RenewalHandle {
    stop_tx: oneshot::Sender<StopRequest>,
    task: JoinHandle<()>,
}

impl RenewalHandle {
    pub(crate) fn spawn<S: LockStore + ?Sized + 'static>(
        store: Arc<S>,
        state: Arc<AsyncMutex<LockState>>,
        key: String,
        options: LockOptions,
    ) -> (Self, LockLostSignal) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (lost_tx, lost_rx) = oneshot::channel();

        let task = tokio::spawn(renew(store, state, key, options, stop_rx, lost_tx));

        (Self { stop_tx, task }, LockLostSignal { rx: lost_rx })
    }

    /// Ask the task to stop and wait for its acknowledgment
    pub(crate) async fn stop(self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        // A send error means the task already exited after losing the lock
        if self.stop_tx.send(ack_tx).is_ok() {
            let _ = ack_rx.await;
        }
        let _ = self.task.await;
    }

    pub(crate) fn abort(self) {
        self.task.abort();
    }
}

async fn renew<S: LockStore + ?Sized>(
    store: Arc<S>,
    state: Arc<AsyncMutex<LockState>>,
    key: String,
    options: LockOptions,
    mut stop_rx: oneshot::Receiver<StopRequest>,
    lost_tx: oneshot::Sender<LockError>,
) {
    let interval = options.renewal_interval();

    loop {
        tokio::select! {
            biased;
            request = &mut stop_rx => {
                if let Ok(ack) = request {
                    let _ = ack.send(());
                }
                debug!(key = %key, "Auto renewal stopped");
                return;
            }
            _ = sleep(interval) => {}
        }

        let failure = match extend_held(&state, &*store, &key, &options, options.duration).await {
            Ok(true) => {
                trace!(key = %key, "Renewed lock");
                continue;
            }
            Ok(false) => LockError::LockLost(key.clone()),
            Err(e) => LockError::ExtensionFailed(e.to_string()),
        };

        *state.lock().await = LockState::Unacquired;
        error!(key = %key, "Lock lost during auto renewal: {}", failure);
        let _ = lost_tx.send(failure);
        return;
    }
}

/// Fires once if the renewal task can no longer vouch for the lock.
///
/// Never resolves when renewal stops normally.
#[derive(Debug)]
pub struct LockLostSignal {
    rx: oneshot::Receiver<LockError>,
}

impl LockLostSignal {
    /// Wait until the lock is reported lost
    pub async fn lost(self) -> LockError {
        match self.rx.await {
            Ok(err) => err,
            Err(_) => std::future::pending().await,
        }
    }

    /// Non-blocking check
    pub fn try_lost(&mut self) -> Option<LockError> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tracing_test::traced_test;

    use crate::{Lock, LockError, LockOptions, MemoryStore};

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_lost_lock_is_logged_as_error() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let lock = Lock::new(store.clone(), "renewal:lost", true)
            .with_options(LockOptions::default().with_duration(Duration::from_secs(2)));
        lock.acquire().await.unwrap();
        let signal = lock.take_lost_signal().unwrap();

        store.put("renewal:lost", "someone-else", None);

        let error = signal.lost().await;
        assert_eq!(error, LockError::LockLost("renewal:lost".to_string()));
        assert!(!lock.is_held().await);
        assert!(logs_contain("Lock lost during auto renewal"));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_stop_acknowledges() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let lock = Lock::new(store, "renewal:stop", true);
        lock.acquire().await.unwrap();

        lock.release().await;

        assert!(logs_contain("Auto renewal stopped"));
    }
}
