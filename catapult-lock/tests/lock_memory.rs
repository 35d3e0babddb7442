use std::sync::Arc;
use std::time::Duration;

use catapult_lock::{Lock, LockError, LockOptions, LockStore, MemoryStore, StoreError};

const KEY_PREFIX: &str = "tq:l:";

fn short_options() -> LockOptions {
    LockOptions::default()
        .with_max_attempts(3)
        .with_delay(Duration::from_millis(100))
}

/// L1. Acquire writes our token, which expires after the duration
#[tokio::test(start_paused = true)]
async fn test_acquire_sets_token_with_expiry() {
    let store = Arc::new(MemoryStore::new());
    let key = format!("{}getlock", KEY_PREFIX);
    let lock = Lock::new(store.clone(), key.clone(), false)
        .with_options(LockOptions::default().with_duration(Duration::from_secs(3)));

    lock.acquire().await.unwrap();

    let token = lock.token().await.unwrap();
    assert!(!token.is_empty());
    assert_eq!(store.get(&key).await.unwrap(), Some(token));
    assert!(lock.valid_until().await.is_some());

    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(store.get(&key).await.unwrap(), None);
}

/// L2. A second claimant is turned away while the first holds the key
#[tokio::test(start_paused = true)]
async fn test_mutual_exclusion() {
    let store = Arc::new(MemoryStore::new());
    let key = format!("{}mutex", KEY_PREFIX);

    let first = Lock::new(store.clone(), key.clone(), true);
    first.acquire().await.unwrap();

    let second = Lock::new(store.clone(), key.clone(), true).with_options(short_options());
    let result = second.acquire().await;

    assert_eq!(
        result,
        Err(LockError::AcquisitionExhausted { key: key.clone(), attempts: 3 })
    );
    assert!(first.is_held().await);
    assert!(!second.is_held().await);
    assert_eq!(store.get(&key).await.unwrap(), first.token().await);

    first.release().await;
    second.release().await;
}

/// L3. Auto-renewal keeps the key alive well past its nominal duration
#[tokio::test(start_paused = true)]
async fn test_auto_renew_outlives_duration() {
    let store = Arc::new(MemoryStore::new());
    let key = format!("{}autorenew", KEY_PREFIX);
    let duration = Duration::from_secs(2);
    let lock = Lock::new(store.clone(), key.clone(), true)
        .with_options(LockOptions::default().with_duration(duration));

    lock.acquire().await.unwrap();
    let token = lock.token().await;

    tokio::time::sleep(duration * 2).await;

    assert!(lock.is_held().await);
    assert_eq!(store.get(&key).await.unwrap(), token);

    lock.release().await;

    assert!(!lock.is_held().await);
    assert_eq!(store.get(&key).await.unwrap(), None);
}

/// L4. Release on an idle lock, and a second release, are no-ops
#[tokio::test(start_paused = true)]
async fn test_release_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let key = format!("{}release", KEY_PREFIX);

    let idle = Lock::new(store.clone(), key.clone(), true);
    idle.release().await;
    assert!(!idle.is_held().await);

    let lock = Lock::new(store.clone(), key.clone(), true);
    lock.acquire().await.unwrap();
    lock.release().await;
    lock.release().await;

    assert!(!lock.is_held().await);
    assert!(store.is_empty());
}

/// L5. An external overwrite is never deleted or extended by the old holder
#[tokio::test(start_paused = true)]
async fn test_token_integrity_after_external_overwrite() {
    let store = Arc::new(MemoryStore::new());
    let key = format!("{}integrity", KEY_PREFIX);
    let lock = Lock::new(store.clone(), key.clone(), false);

    lock.acquire().await.unwrap();
    store.put(&key, "intruder", None);

    let extended = lock.extend(Duration::from_secs(10)).await.unwrap();
    assert!(!extended);
    // Mismatch leaves local state alone
    assert!(lock.is_held().await);

    lock.release().await;

    assert!(!lock.is_held().await);
    assert_eq!(store.get(&key).await.unwrap(), Some("intruder".to_string()));
}

/// L6. Extend pushes the store expiry forward
#[tokio::test(start_paused = true)]
async fn test_extend_refreshes_expiry() {
    let store = Arc::new(MemoryStore::new());
    let key = format!("{}extend", KEY_PREFIX);
    let lock = Lock::new(store.clone(), key.clone(), false)
        .with_options(LockOptions::default().with_duration(Duration::from_secs(2)));

    assert!(!lock.extend(Duration::from_secs(5)).await.unwrap());

    lock.acquire().await.unwrap();
    let before = lock.valid_until().await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(lock.extend(Duration::from_secs(5)).await.unwrap());

    assert!(lock.valid_until().await.unwrap() > before);
    assert_eq!(store.ttl(&key), Some(Duration::from_secs(5)));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(store.get(&key).await.unwrap(), lock.token().await);

    lock.release().await;
}

/// L7. Each acquisition mints a new token
#[tokio::test(start_paused = true)]
async fn test_fresh_token_per_acquisition() {
    let store = Arc::new(MemoryStore::new());
    let lock = Lock::new(store.clone(), format!("{}fresh", KEY_PREFIX), false);

    lock.acquire().await.unwrap();
    let first = lock.token().await.unwrap();
    assert_eq!(
        lock.acquire().await,
        Err(LockError::AlreadyHeld(lock.key().to_string()))
    );
    lock.release().await;

    lock.acquire().await.unwrap();
    let second = lock.token().await.unwrap();
    lock.release().await;

    assert_ne!(first, second);
}

/// L8. Renewal that finds a foreign token reports the lock lost
#[tokio::test(start_paused = true)]
async fn test_renewal_reports_lost_lock() {
    let store = Arc::new(MemoryStore::new());
    let key = format!("{}lost", KEY_PREFIX);
    let lock = Lock::new(store.clone(), key.clone(), true)
        .with_options(LockOptions::default().with_duration(Duration::from_secs(2)));

    lock.acquire().await.unwrap();
    let signal = lock.take_lost_signal().unwrap();
    assert!(lock.take_lost_signal().is_none());

    store.put(&key, "intruder", None);

    let err = tokio::time::timeout(Duration::from_secs(5), signal.lost())
        .await
        .unwrap();
    assert_eq!(err, LockError::LockLost(key.clone()));
    assert!(err.is_fatal());
    assert!(!lock.is_held().await);

    lock.release().await;
    assert_eq!(store.get(&key).await.unwrap(), Some("intruder".to_string()));
}

/// L9. A store failure during renewal is just as fatal
#[tokio::test(start_paused = true)]
async fn test_renewal_store_failure_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let lock = Lock::new(store.clone(), format!("{}storefail", KEY_PREFIX), true)
        .with_options(LockOptions::default().with_duration(Duration::from_secs(2)));

    lock.acquire().await.unwrap();
    let signal = lock.take_lost_signal().unwrap();
    store.close().await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), signal.lost())
        .await
        .unwrap();
    assert!(matches!(err, LockError::ExtensionFailed(_)));
    assert!(!lock.is_held().await);
}

/// L10. Released locks never fire the lost signal
#[tokio::test(start_paused = true)]
async fn test_release_does_not_fire_lost_signal() {
    let store = Arc::new(MemoryStore::new());
    let lock = Lock::new(store.clone(), format!("{}quiet", KEY_PREFIX), true)
        .with_options(LockOptions::default().with_duration(Duration::from_secs(2)));

    lock.acquire().await.unwrap();
    let signal = lock.take_lost_signal().unwrap();
    lock.release().await;

    let waited = tokio::time::timeout(Duration::from_secs(10), signal.lost()).await;
    assert!(waited.is_err());
}

/// L11. Store errors count as failed attempts
#[tokio::test(start_paused = true)]
async fn test_store_errors_exhaust_attempts() {
    let store = Arc::new(MemoryStore::new());
    store.close().await.unwrap();

    let lock = Lock::new(store.clone(), format!("{}closed", KEY_PREFIX), false)
        .with_options(short_options());

    let err = lock.acquire().await.unwrap_err();
    assert!(err.is_contention());

}

/// L12. Extend surfaces store errors instead of reporting a mismatch
#[tokio::test(start_paused = true)]
async fn test_extend_surfaces_store_error() {
    let store = Arc::new(MemoryStore::new());
    let lock = Lock::new(store.clone(), format!("{}extend-err", KEY_PREFIX), false);

    lock.acquire().await.unwrap();
    store.close().await.unwrap();

    let result = lock.extend(Duration::from_secs(1)).await;
    assert_eq!(result, Err(LockError::Store(StoreError::Closed)));
    assert!(lock.is_held().await);
}

/// L13. Locks behind a trait object behave the same
#[tokio::test(start_paused = true)]
async fn test_dyn_store() {
    let store: Arc<dyn LockStore> = Arc::new(MemoryStore::new());
    let lock: Lock = Lock::new(store.clone(), format!("{}dyn", KEY_PREFIX), true);

    lock.acquire().await.unwrap();
    assert!(store.get(lock.key()).await.unwrap().is_some());
    lock.release().await;
    assert!(store.get(lock.key()).await.unwrap().is_none());
}
