//! Typed configuration for the batching core.
//!
//! The server crate fills a [`CoordinatorConfig`] from the environment;
//! tests build one directly. Defaults match the documented relay
//! behaviour: 10 events, 60 second interval, 3 attempts, 2 second delay.

use std::time::Duration;

use crate::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryPolicy};
use crate::trigger::{DEFAULT_BATCH_INTERVAL, DEFAULT_BATCH_SIZE, FlushTrigger};

/// Settings for a [`BatchCoordinator`](crate::coordinator::BatchCoordinator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Number of events that triggers a size flush.
    pub batch_size: usize,
    /// Time between the first event of a batch and its interval flush.
    pub batch_interval: Duration,
    /// Delivery attempts per batch before the failure becomes fatal.
    pub max_attempts: u32,
    /// Pause between consecutive delivery attempts.
    pub retry_delay: Duration,
}

impl CoordinatorConfig {
    /// Build the flush trigger described by this config.
    pub fn trigger(&self) -> FlushTrigger {
        FlushTrigger::new(self.batch_size, self.batch_interval)
    }

    /// Build the retry policy described by this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_delay)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval: DEFAULT_BATCH_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.batch_interval, Duration::from_secs(60));
        assert_eq!(config.retry_policy().max_attempts(), 3);
        assert_eq!(config.retry_policy().delay(), Duration::from_secs(2));
        assert_eq!(config.trigger().threshold(), 10);
    }
}
