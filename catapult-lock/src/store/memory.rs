use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{store::LockStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process store for testing and single-node deployments.
///
/// Expiry follows tokio's clock, so tests on a paused runtime can
/// fast-forward through lock durations.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    closed: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally write a key, as an external writer would
    pub fn put(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.lock().insert(key.to_string(), entry);
    }

    /// Remaining time-to-live of a live key
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock();
        let entry = entries.get(key).filter(|e| e.is_live(now))?;
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if *self.closed.lock() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Look up a live entry, dropping it if it has expired
    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        self.ensure_open()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if Self::live(&mut entries, key, now).is_some() {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let matched = Self::live(&mut entries, key, now).is_some_and(|e| e.value == expected);
        if matched {
            entries.remove(key);
        }
        Ok(matched)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        self.ensure_open()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match Self::live(&mut entries, key, now) {
            Some(entry) if entry.value == expected => {
                entry.value = value.to_string();
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.ensure_open()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Ok(Self::live(&mut entries, key, now).map(|e| e.value.clone()))
    }

    async fn close(&self) -> StoreResult<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent_respects_expiry() {
        let store = MemoryStore::new();

        assert!(store.set_if_absent("k", "a", Duration::from_secs(1)).await.unwrap());
        assert!(!store.set_if_absent("k", "b", Duration::from_secs(1)).await.unwrap());

        tokio::time::advance(Duration::from_millis(1001)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_if_absent("k", "b", Duration::from_secs(1)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("b".to_string()));
    }

    #[tokio::test]
    async fn test_compare_and_act_only_on_match() {
        let store = MemoryStore::new();
        store.put("k", "mine", None);

        assert!(!store.compare_and_delete("k", "theirs").await.unwrap());
        assert!(!store.compare_and_set("k", "theirs", "x", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("mine".to_string()));

        assert!(store.compare_and_set("k", "mine", "mine", Duration::from_secs(5)).await.unwrap());
        assert!(store.ttl("k").is_some());

        assert!(store.compare_and_delete("k", "mine").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_closed_store_rejects_commands() {
        let store = MemoryStore::new();
        store.close().await.unwrap();

        let result = store.get("k").await;
        assert_eq!(result, Err(StoreError::Closed));
    }
}
