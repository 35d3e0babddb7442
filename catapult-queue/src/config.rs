//! # Configuration
//!
//! Options are plain values consumed at construction time. They can be
//! built in code, or layered from dotted string keys the same way a
//! key/value config store would hold them:
//!
//! ```rust
//! use catapult_queue::CatapultConfig;
//!
//! let config = CatapultConfig::from_pairs([
//!     ("redis.address", "10.0.0.5:6379"),
//!     ("lock.duration_ms", "30000"),
//! ])
//! .unwrap();
//!
//! assert_eq!(config.lock.duration.as_secs(), 30);
//! ```
//!
//! `from_env("CATAPULT")` reads `CATAPULT__LOCK__DURATION_MS=30000` style
//! variables into the same keys.

use std::time::Duration;

use catapult_lock::{LockOptions, RedisConnectOptions};

use crate::{QueueError, QueueResult};

/// Default prefix for job lock keys
pub const DEFAULT_KEY_PREFIX: &str = "ctpq:";

/// Parameters for connecting to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisqueConnectOptions {
    /// `host:port` or a full URL
    pub address: String,
}

impl Default for DisqueConnectOptions {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:7711".to_string(),
        }
    }
}

impl DisqueConnectOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn url(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("redis://{}", self.address)
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CatapultConfig {
    pub redis: RedisConnectOptions,
    pub disque: DisqueConnectOptions,
    /// Options for every job lock
    pub lock: LockOptions,
    /// Prepended to the job id to form its lock key
    pub key_prefix: String,
    /// How long the broker may take to accept a push
    pub job_timeout: Duration,
    /// How long one fetch waits for due jobs
    pub fetch_timeout: Duration,
    /// Pause after a failed fetch
    pub error_backoff: Duration,
}

impl Default for CatapultConfig {
    fn default() -> Self {
        Self {
            redis: RedisConnectOptions::default(),
            disque: DisqueConnectOptions::default(),
            lock: LockOptions::default(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            job_timeout: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(1),
            error_backoff: Duration::from_millis(100),
        }
    }
}

impl CatapultConfig {
    /// Layer dotted keys over the defaults. Unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> QueueResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in pairs {
            config.set(key.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    /// Read `PREFIX__SECTION__KEY` environment variables
    pub fn from_env(prefix: &str) -> QueueResult<Self> {
        let marker = format!("{}__", prefix);
        let pairs = std::env::vars().filter_map(|(key, value)| {
            key.strip_prefix(&marker)
                .map(|stripped| (stripped.to_lowercase().replace("__", "."), value))
        });
        Self::from_pairs(pairs)
    }

    /// Apply a single dotted key
    pub fn set(&mut self, key: &str, value: &str) -> QueueResult<()> {
        match key {
            "redis.address" => self.redis.address = value.to_string(),
            "redis.auth" => self.redis.auth = non_empty(value),
            "redis.db" => self.redis.db = Some(parse(key, value)?),
            "disque.address" => self.disque.address = value.to_string(),
            "lock.duration_ms" => self.lock.duration = millis(key, value)?,
            "lock.delay_ms" => self.lock.delay = millis(key, value)?,
            "lock.max_attempts" => self.lock.max_attempts = parse(key, value)?,
            "lock.drift_factor" => {
                let factor: f64 = parse(key, value)?;
                if !(0.0..1.0).contains(&factor) {
                    return Err(QueueError::Config(format!(
                        "{} must be in [0, 1), got {}",
                        key, value
                    )));
                }
                self.lock.drift_factor = factor;
            }
            "key_prefix" => self.key_prefix = value.to_string(),
            "job_timeout_ms" => self.job_timeout = millis(key, value)?,
            "fetch_timeout_ms" => self.fetch_timeout = millis(key, value)?,
            "error_backoff_ms" => self.error_backoff = millis(key, value)?,
            _ => {}
        }
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> QueueResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| QueueError::Config(format!("invalid value for {}: '{}'", key, value)))
}

fn millis(key: &str, value: &str) -> QueueResult<Duration> {
    parse::<u64>(key, value).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CatapultConfig::default();
        assert_eq!(config.key_prefix, "ctpq:");
        assert_eq!(config.job_timeout, Duration::from_secs(2));
        assert_eq!(config.lock, LockOptions::default());
    }

    #[test]
    fn test_from_pairs() {
        let config = CatapultConfig::from_pairs([
            ("redis.address", "cache:6380"),
            ("redis.auth", "secret"),
            ("redis.db", "7"),
            ("disque.address", "broker:7711"),
            ("lock.max_attempts", "3"),
            ("lock.delay_ms", "50"),
            ("lock.drift_factor", "0.05"),
            ("key_prefix", "jobs:"),
            ("fetch_timeout_ms", "250"),
            ("something.else", "ignored"),
        ])
        .unwrap();

        assert_eq!(config.redis.url(), "redis://:secret@cache:6380/7");
        assert_eq!(config.disque.url(), "redis://broker:7711");
        assert_eq!(config.lock.max_attempts, 3);
        assert_eq!(config.lock.delay, Duration::from_millis(50));
        assert_eq!(config.lock.drift_factor, 0.05);
        assert_eq!(config.key_prefix, "jobs:");
        assert_eq!(config.fetch_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            CatapultConfig::from_pairs([("lock.max_attempts", "many")]),
            Err(QueueError::Config(_))
        ));
        assert!(matches!(
            CatapultConfig::from_pairs([("lock.drift_factor", "1.5")]),
            Err(QueueError::Config(_))
        ));
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("CTPTEST__LOCK__DURATION_MS", "1500");
        std::env::set_var("CTPTEST__KEY_PREFIX", "env:");

        let config = CatapultConfig::from_env("CTPTEST").unwrap();

        assert_eq!(config.lock.duration, Duration::from_millis(1500));
        assert_eq!(config.key_prefix, "env:");
    }
}
