use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, info};

use crate::{store::LockStore, RedisConnectOptions, StoreError, StoreResult};

/// Delete the key only while it still holds our token
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
  return redis.call("DEL", KEYS[1])
else
  return 0
end
"#;

/// Rewrite value and expiry only while the key still holds our token
const EXTEND_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
  redis.call("SET", KEYS[1], ARGV[2], "XX", "PX", ARGV[3])
  return 1
else
  return 0
end
"#;

/// Redis-backed lock store.
///
/// Every call checks out a clone of the shared connection manager, so
/// the underlying multiplexed connection is reused across locks.
pub struct RedisStore {
    manager: RwLock<Option<ConnectionManager>>,
    release: Script,
    extend: Script,
}

impl RedisStore {
    /// Connect using AUTH/SELECT from the options when present
    pub async fn connect(options: &RedisConnectOptions) -> StoreResult<Self> {
        let client = redis::Client::open(options.url())?;
        let manager = ConnectionManager::new(client).await?;
        info!("Connected lock store to {}", options.address);
        Ok(Self::from_manager(manager))
    }

    /// Wrap an existing connection manager
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self {
            manager: RwLock::new(Some(manager)),
            release: Script::new(RELEASE_SCRIPT),
            extend: Script::new(EXTEND_SCRIPT),
        }
    }

    fn connection(&self) -> StoreResult<ConnectionManager> {
        self.manager.read().clone().ok_or(StoreError::Closed)
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl LockStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.as_deref() == Some("OK"))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let deleted: i64 = self
            .release
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let updated: i64 = self
            .extend
            .key(key)
            .arg(expected)
            .arg(value)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(updated == 1)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection()?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn close(&self) -> StoreResult<()> {
        if self.manager.write().take().is_some() {
            debug!("Closed lock store connection manager");
        }
        Ok(())
    }
}
