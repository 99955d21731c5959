//! Store configuration.
//!
//! Both durations are fixed for the lifetime of a store instance.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_SLIDING_EXPIRATION_SECS: u64 = 5 * 60;
const DEFAULT_POLLING_INTERVAL_SECS: u64 = 10 * 60;

/// Expiring store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Idle time after which an entry is eligible for eviction. Every
    /// successful lookup restarts the window.
    pub sliding_expiration: Duration,
    /// Period of the background eviction scan.
    pub polling_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sliding_expiration: Duration::from_secs(DEFAULT_SLIDING_EXPIRATION_SECS),
            polling_interval: Duration::from_secs(DEFAULT_POLLING_INTERVAL_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for StoreConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            sliding_expiration: settings.sliding_expiration,
            polling_interval: settings.polling_interval,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sliding_expiration(mut self, duration: Duration) -> Self {
        self.sliding_expiration = duration;
        self
    }

    pub fn with_polling_interval(mut self, duration: Duration) -> Self {
        self.polling_interval = duration;
        self
    }

    /// Polling interval clamped to at least one millisecond; a zero period
    /// would make the sweeper spin.
    pub fn effective_polling_interval(&self) -> Duration {
        self.polling_interval.max(Duration::from_millis(1))
    }
}
