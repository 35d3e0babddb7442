use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, trace, warn};

use crate::{
    renewal::{LockLostSignal, RenewalHandle},
    store::LockStore,
    token::generate_token,
    LockError, LockOptions, LockResult,
};

/// Local view of the claim. Only acquire, extend, release and a failed
/// renewal move between the two states, each under the instance mutex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LockState {
    Unacquired,
    Held { token: String, until: Instant },
}

impl LockState {
    pub(crate) fn is_held(&self) -> bool {
        matches!(self, Self::Held { .. })
    }
}

/// A claim on `key` in a shared store.
///
/// One instance is one claim attempt. Several instances, in this process
/// or others, may contend for the same key; the store decides who wins
/// and the per-acquisition token proves ownership afterwards.
pub struct Lock<S: LockStore + ?Sized = dyn LockStore> {
    key: String,
    options: LockOptions,
    auto_renew: bool,
    store: Arc<S>,
    state: Arc<AsyncMutex<LockState>>,
    renewal: parking_lot::Mutex<Option<RenewalHandle>>,
    lost: parking_lot::Mutex<Option<LockLostSignal>>,
}

impl<S: LockStore + ?Sized + 'static> Lock<S> {
    /// Create an unacquired lock with default options
    pub fn new(store: Arc<S>, key: impl Into<String>, auto_renew: bool) -> Self {
        Self {
            key: key.into(),
            options: LockOptions::default(),
            auto_renew,
            store,
            state: Arc::new(AsyncMutex::new(LockState::Unacquired)),
            renewal: parking_lot::Mutex::new(None),
            lost: parking_lot::Mutex::new(None),
        }
    }

    /// Override duration, drift factor, attempts and delay
    pub fn with_options(mut self, options: LockOptions) -> Self {
        self.options = options;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    pub fn auto_renew(&self) -> bool {
        self.auto_renew
    }

    /// Whether this instance currently believes it holds the lock
    pub async fn is_held(&self) -> bool {
        self.state.lock().await.is_held()
    }

    /// Token stored under the key while held
    pub async fn token(&self) -> Option<String> {
        match &*self.state.lock().await {
            LockState::Held { token, .. } => Some(token.clone()),
            LockState::Unacquired => None,
        }
    }

    /// Drift-compensated estimate of when the claim lapses
    pub async fn valid_until(&self) -> Option<Instant> {
        match &*self.state.lock().await {
            LockState::Held { until, .. } => Some(*until),
            LockState::Unacquired => None,
        }
    }

    /// Try to claim the key, retrying up to `max_attempts` times.
    ///
    /// Every call mints a fresh token. When auto-renew is on, a background
    /// task keeps the claim alive until [`release`](Self::release).
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn acquire(&self) -> LockResult<()> {
        let mut state = self.state.lock().await;
        if state.is_held() {
            return Err(LockError::AlreadyHeld(self.key.clone()));
        }

        let token = generate_token()?;
        let duration = self.options.duration;

        for attempt in 0..self.options.max_attempts {
            if attempt != 0 {
                sleep(self.options.delay).await;
            }

            let start = Instant::now();
            match self.store.set_if_absent(&self.key, &token, duration).await {
                Ok(true) => {
                    let until = Instant::now() + self.options.validity(duration, start.elapsed());
                    *state = LockState::Held { token, until };
                    if self.auto_renew {
                        self.start_renewal();
                    }
                    debug!(attempt, "Acquired lock");
                    return Ok(());
                }
                Ok(false) => trace!(attempt, "Lock is held elsewhere"),
                Err(e) => debug!(attempt, "Store error while acquiring lock: {}", e),
            }
        }

        debug!("Giving up on lock after {} attempts", self.options.max_attempts);
        Err(LockError::AcquisitionExhausted {
            key: self.key.clone(),
            attempts: self.options.max_attempts,
        })
    }

    /// Reset the store expiry to `duration` if the key still holds our token.
    ///
    /// `Ok(false)` means the lock is not held or the token no longer
    /// matches; local state is left untouched in that case.
    pub async fn extend(&self, duration: Duration) -> LockResult<bool> {
        extend_held(&self.state, &*self.store, &self.key, &self.options, duration).await
    }

    /// Give up the claim. Safe to call any number of times.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn release(&self) {
        // Stop renewal before touching state, otherwise an in-flight
        // extend could resurrect the key after we delete it.
        let renewal = self.renewal.lock().take();
        if let Some(renewal) = renewal {
            renewal.stop().await;
        }

        let mut state = self.state.lock().await;
        let LockState::Held { token, .. } = &*state else {
            return;
        };

        match self.store.compare_and_delete(&self.key, token).await {
            Ok(true) => debug!("Released lock"),
            Ok(false) => warn!("Lock was no longer ours at release"),
            Err(e) => warn!("Failed to release lock: {}", e),
        }
        *state = LockState::Unacquired;
    }

    /// One-shot signal fired if auto-renewal loses the lock.
    ///
    /// Available once per acquisition; whoever runs the guarded work
    /// should race it against that work.
    pub fn take_lost_signal(&self) -> Option<LockLostSignal> {
        self.lost.lock().take()
    }

    fn start_renewal(&self) {
        let (handle, signal) = RenewalHandle::spawn(
            self.store.clone(),
            self.state.clone(),
            self.key.clone(),
            self.options.clone(),
        );
        if let Some(stale) = self.renewal.lock().replace(handle) {
            stale.abort();
        }
        *self.lost.lock() = Some(signal);
    }
}

impl<S: LockStore + ?Sized> Drop for Lock<S> {
    fn drop(&mut self) {
        if let Some(renewal) = self.renewal.get_mut().take() {
            renewal.abort();
        }
    }
}

impl<S: LockStore + ?Sized> std::fmt::Debug for Lock<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock")
            .field("key", &self.key)
            .field("options", &self.options)
            .field("auto_renew", &self.auto_renew)
            .finish_non_exhaustive()
    }
}

/// Compare-and-set the expiry and refresh the validity estimate.
/// Shared by [`Lock::extend`] and the renewal task.
pub(crate) async fn extend_held<S: LockStore + ?Sized>(
    state: &AsyncMutex<LockState>,
    store: &S,
    key: &str,
    options: &LockOptions,
    duration: Duration,
) -> LockResult<bool> {
    let mut state = state.lock().await;
    let token = match &*state {
        LockState::Held { token, .. } => token.clone(),
        LockState::Unacquired => return Ok(false),
    };

    let start = Instant::now();
    if !store.compare_and_set(key, &token, &token, duration).await? {
        return Ok(false);
    }

    let until = Instant::now() + options.validity(duration, start.elapsed());
    *state = LockState::Held { token, until };
    Ok(true)
}
