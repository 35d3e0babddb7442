use std::time::Duration;

/// Default nominal validity of a lock
pub const DEFAULT_DURATION: Duration = Duration::from_secs(10);

/// Default number of acquisition attempts
pub const DEFAULT_ATTEMPTS: u32 = 7;

/// Default delay between acquisition attempts
pub const DEFAULT_DELAY: Duration = Duration::from_millis(512);

/// Default fraction of the duration reserved for clock drift
pub const DEFAULT_DRIFT_FACTOR: f64 = 0.01;

/// Fixed margin added back to the drift-compensated validity
pub const SAFETY_MARGIN: Duration = Duration::from_millis(2);

/// Tuning knobs for a [`Lock`](crate::Lock)
#[derive(Debug, Clone, PartialEq)]
pub struct LockOptions {
    /// Nominal validity of the lock, also the store-side expiry
    pub duration: Duration,
    /// Fraction of `duration` subtracted from the local validity estimate
    pub drift_factor: f64,
    /// Maximum acquisition attempts before giving up
    pub max_attempts: u32,
    /// Delay between acquisition attempts
    pub delay: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION,
            drift_factor: DEFAULT_DRIFT_FACTOR,
            max_attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl LockOptions {
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_drift_factor(mut self, drift_factor: f64) -> Self {
        self.drift_factor = drift_factor;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Validity left after `elapsed` was spent talking to the store.
    ///
    /// `duration - elapsed - duration * drift_factor + SAFETY_MARGIN`
    pub fn validity(&self, duration: Duration, elapsed: Duration) -> Duration {
        let drift = duration.mul_f64(self.drift_factor.clamp(0.0, 1.0));
        duration
            .saturating_sub(elapsed)
            .saturating_sub(drift)
            + SAFETY_MARGIN
    }

    /// Sleep between two renewals of an auto-renewing lock
    pub fn renewal_interval(&self) -> Duration {
        self.duration / 2
    }
}

/// Parameters for connecting to the shared key-value store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConnectOptions {
    /// `host:port` or a full `redis://` URL
    pub address: String,
    /// Optional password sent with AUTH
    pub auth: Option<String>,
    /// Optional database index sent with SELECT
    pub db: Option<i64>,
}

impl Default for RedisConnectOptions {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:6379".to_string(),
            auth: None,
            db: None,
        }
    }
}

impl RedisConnectOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Connection URL understood by the redis client
    pub fn url(&self) -> String {
        let base = if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("redis://{}", self.address)
        };
        let base = match &self.auth {
            Some(auth) if !base.contains('@') => base.replacen("://", &format!("://:{}@", auth), 1),
            _ => base,
        };
        match self.db {
            Some(db) => format!("{}/{}", base.trim_end_matches('/'), db),
            None => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = LockOptions::default();
        assert_eq!(options.duration, Duration::from_secs(10));
        assert_eq!(options.max_attempts, 7);
        assert_eq!(options.delay, Duration::from_millis(512));
        assert_eq!(options.renewal_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_validity_compensates_for_drift() {
        let options = LockOptions::default();
        let validity = options.validity(Duration::from_secs(10), Duration::from_millis(50));
        // 10s - 50ms - 100ms drift + 2ms margin
        assert_eq!(validity, Duration::from_millis(9_852));
    }

    #[test]
    fn test_redis_url() {
        assert_eq!(RedisConnectOptions::default().url(), "redis://127.0.0.1:6379");

        let options = RedisConnectOptions {
            address: "cache:6380".to_string(),
            auth: Some("secret".to_string()),
            db: Some(7),
        };
        assert_eq!(options.url(), "redis://:secret@cache:6380/7");
    }
}
