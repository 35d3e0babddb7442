#![cfg(feature = "redis")]

use std::sync::Arc;
use std::time::Duration;

use catapult_lock::{Lock, LockError, LockOptions, LockStore, RedisConnectOptions, RedisStore};

async fn store() -> Arc<RedisStore> {
    let address = std::env::var("REDIS_ADDRESS").unwrap_or_else(|_| "127.0.0.1:6379".to_string());
    Arc::new(RedisStore::connect(&RedisConnectOptions::new(address)).await.unwrap())
}

fn key(name: &str) -> String {
    format!("tq:l:{}:{}", name, std::process::id())
}

#[tokio::test]
#[ignore = "needs a redis server"]
async fn test_redis_mutual_exclusion_and_release() {
    let store = store().await;
    let key = key("mutex");

    let first = Lock::new(store.clone(), key.clone(), false);
    first.acquire().await.unwrap();

    let second = Lock::new(store.clone(), key.clone(), false).with_options(
        LockOptions::default()
            .with_max_attempts(2)
            .with_delay(Duration::from_millis(50)),
    );
    assert!(matches!(
        second.acquire().await,
        Err(LockError::AcquisitionExhausted { .. })
    ));

    first.release().await;
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "needs a redis server"]
async fn test_redis_token_integrity() {
    let store = store().await;
    let key = key("integrity");

    let lock = Lock::new(store.clone(), key.clone(), false);
    lock.acquire().await.unwrap();
    let token = lock.token().await.unwrap();

    assert!(store.compare_and_set(&key, &token, "intruder", Duration::from_secs(5)).await.unwrap());
    assert!(!lock.extend(Duration::from_secs(5)).await.unwrap());

    lock.release().await;
    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("intruder"));
    assert!(store.compare_and_delete(&key, "intruder").await.unwrap());
}

#[tokio::test]
#[ignore = "needs a redis server"]
async fn test_redis_auto_renew() {
    let store = store().await;
    let key = key("renew");

    let lock = Lock::new(store.clone(), key.clone(), true)
        .with_options(LockOptions::default().with_duration(Duration::from_secs(1)));
    lock.acquire().await.unwrap();
    let token = lock.token().await;

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(store.get(&key).await.unwrap(), token);
    lock.release().await;
    assert_eq!(store.get(&key).await.unwrap(), None);
}
