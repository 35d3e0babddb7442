pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;

use crate::StoreResult;

pub use memory::MemoryStore;

#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Key-value primitives the lock service needs from a shared store.
///
/// Each compare-and-act method must run as one indivisible operation on
/// the store side; a read followed by a write lets another holder slip in
/// between the check and the act.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key` to `value` with expiry `ttl` only if the key is absent.
    /// Returns `true` when the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete `key` only if it currently holds `expected`.
    /// Returns `true` when the key was deleted.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Replace the value and expiry of `key` only if it currently holds
    /// `expected`. Returns `false` on mismatch.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<bool>;

    /// Plain read, used for inspection and tests
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Release pooled connections. Later calls may fail with `Closed`.
    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
