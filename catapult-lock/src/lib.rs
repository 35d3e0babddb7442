//! # catapult-lock: distributed mutual exclusion over a key-value store
//!
//! A [`Lock`] claims a key in a shared store by writing a single-use random
//! token with an expiry. Only the holder of that token can extend or delete
//! the key, and every compare-and-act step runs atomically on the store.
//!
//! - **Drift-aware validity**: the local expiry estimate subtracts the time
//!   spent talking to the store and a configurable drift margin.
//! - **Auto-renewal**: an optional background task extends the claim every
//!   half duration. If an extension fails the lock is reported lost through a
//!   [`LockLostSignal`] instead of silently carrying on.
//! - **Pluggable stores**: [`MemoryStore`] for tests, `RedisStore` behind the
//!   `redis` feature.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use catapult_lock::{Lock, MemoryStore};
//!
//! # async fn run() -> catapult_lock::LockResult<()> {
//! let store = Arc::new(MemoryStore::new());
//! let lock = Lock::new(store, "ctpq:job-42", true);
//!
//! lock.acquire().await?;
//! // exclusive work
//! lock.release().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod lock;
pub mod options;
pub mod renewal;
pub mod store;
pub mod token;

pub use error::{LockError, LockResult, StoreError, StoreResult};
pub use lock::Lock;
pub use options::{
    LockOptions, RedisConnectOptions, DEFAULT_ATTEMPTS, DEFAULT_DELAY, DEFAULT_DRIFT_FACTOR,
    DEFAULT_DURATION, SAFETY_MARGIN,
};
pub use renewal::LockLostSignal;
pub use store::{LockStore, MemoryStore};

#[cfg(feature = "redis")]
pub use store::RedisStore;
