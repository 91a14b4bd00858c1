//! Configuration types for the relay server.
//!
//! All configuration is loaded from environment variables. Every variable
//! is optional: a missing or unparsable value falls back to its default
//! and is recorded in [`RelayConfig::fallbacks`] so the binary can report
//! it once logging is up.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `BATCH_SIZE` | `10` |
//! | `BATCH_INTERVAL` | `60` (seconds) |
//! | `POST_ENDPOINT` | `http://requestbin.net` |
//! | `RETRY_ATTEMPTS` | `3` |
//! | `RETRY_DELAY` | `2` (seconds) |
//! | `DELIVERY_TIMEOUT` | `10` (seconds) |
//! | `FATAL_POLICY` | `terminate` |
//! | `LISTEN_HOST` | `0.0.0.0` |
//! | `LISTEN_PORT` | `8080` |
//! | `SHUTDOWN_GRACE` | `5` (seconds) |
//! | `LOG_FORMAT` | `json` |

use std::str::FromStr;
use std::time::Duration;

use hookrelay_core::CoordinatorConfig;
use hookrelay_core::retry::DEFAULT_MAX_ATTEMPTS;
use hookrelay_core::trigger::DEFAULT_BATCH_SIZE;

use crate::server::ServerConfig;
use crate::supervisor::FatalPolicy;

/// Default downstream endpoint base URL.
pub const DEFAULT_ENDPOINT: &str = "http://requestbin.net";

const DEFAULT_BATCH_INTERVAL_SECS: u64 = 60;
const DEFAULT_RETRY_DELAY_SECS: u64 = 2;
const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Batching and retry settings for the core.
    pub coordinator: CoordinatorConfig,
    /// Downstream base URL; batches are posted to `{endpoint}/batch`.
    pub endpoint: String,
    /// Upper bound on a single delivery request.
    pub delivery_timeout: Duration,
    /// What to do when a batch exhausts its retries.
    pub fatal_policy: FatalPolicy,
    /// HTTP listener address.
    pub server: ServerConfig,
    /// How long shutdown waits for in-flight deliveries.
    pub shutdown_grace: Duration,
    /// Log output format.
    pub log_format: LogFormat,
    /// Variables that were set but rejected, in load order.
    pub fallbacks: Vec<ConfigFallback>,
}

/// A variable whose value was rejected in favour of the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFallback {
    /// Environment variable name.
    pub key: &'static str,
    /// The rejected raw value.
    pub raw: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-field lines.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

impl RelayConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut loader = Loader {
            lookup,
            fallbacks: Vec::new(),
        };

        let batch_size = loader.parse("BATCH_SIZE", DEFAULT_BATCH_SIZE, |v| *v > 0);
        let batch_interval = loader.secs("BATCH_INTERVAL", DEFAULT_BATCH_INTERVAL_SECS, false);
        let max_attempts = loader.parse("RETRY_ATTEMPTS", DEFAULT_MAX_ATTEMPTS, |v| *v > 0);
        let retry_delay = loader.secs("RETRY_DELAY", DEFAULT_RETRY_DELAY_SECS, true);
        let endpoint = loader.endpoint("POST_ENDPOINT");
        let delivery_timeout =
            loader.secs("DELIVERY_TIMEOUT", DEFAULT_DELIVERY_TIMEOUT_SECS, false);
        let fatal_policy = loader.parse("FATAL_POLICY", FatalPolicy::default(), |_| true);
        let defaults = ServerConfig::default();
        let host = loader.parse("LISTEN_HOST", defaults.host, |h: &String| !h.is_empty());
        let port = loader.parse("LISTEN_PORT", defaults.port, |p| *p > 0);
        let shutdown_grace = loader.secs("SHUTDOWN_GRACE", DEFAULT_SHUTDOWN_GRACE_SECS, true);
        let log_format = loader.parse("LOG_FORMAT", LogFormat::default(), |_| true);

        Self {
            coordinator: CoordinatorConfig {
                batch_size,
                batch_interval,
                max_attempts,
                retry_delay,
            },
            endpoint,
            delivery_timeout,
            fatal_policy,
            server: ServerConfig { host, port },
            shutdown_grace,
            log_format,
            fallbacks: loader.fallbacks,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Reads variables and records rejected values.
struct Loader<F> {
    lookup: F,
    fallbacks: Vec<ConfigFallback>,
}

impl<F> Loader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T, V>(&mut self, key: &'static str, default: T, valid: V) -> T
    where
        T: FromStr,
        V: Fn(&T) -> bool,
    {
        let Some(raw) = (self.lookup)(key) else {
            return default;
        };
        match raw.trim().parse::<T>() {
            Ok(value) if valid(&value) => value,
            _ => {
                self.fallbacks.push(ConfigFallback { key, raw });
                default
            }
        }
    }

    fn secs(&mut self, key: &'static str, default: u64, allow_zero: bool) -> Duration {
        Duration::from_secs(self.parse(key, default, |v| allow_zero || *v > 0))
    }

    fn endpoint(&mut self, key: &'static str) -> String {
        let raw = self.parse(key, String::from(DEFAULT_ENDPOINT), |v: &String| {
            reqwest::Url::parse(v).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
        });
        raw.trim_end_matches('/').to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> RelayConfig {
        let map: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        RelayConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = load(&[]);
        assert_eq!(config.coordinator.batch_size, 10);
        assert_eq!(config.coordinator.batch_interval, Duration::from_secs(60));
        assert_eq!(config.coordinator.max_attempts, 3);
        assert_eq!(config.coordinator.retry_delay, Duration::from_secs(2));
        assert_eq!(config.endpoint, "http://requestbin.net");
        assert_eq!(config.fatal_policy, FatalPolicy::Terminate);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.fallbacks.is_empty());
    }

    #[test]
    fn valid_values_override_defaults() {
        let config = load(&[
            ("BATCH_SIZE", "25"),
            ("BATCH_INTERVAL", "5"),
            ("POST_ENDPOINT", "https://hooks.example.com/"),
            ("FATAL_POLICY", "continue"),
            ("LISTEN_PORT", "9090"),
            ("LOG_FORMAT", "pretty"),
        ]);
        assert_eq!(config.coordinator.batch_size, 25);
        assert_eq!(config.coordinator.batch_interval, Duration::from_secs(5));
        assert_eq!(config.endpoint, "https://hooks.example.com");
        assert_eq!(config.fatal_policy, FatalPolicy::Continue);
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn invalid_values_fall_back_and_are_recorded() {
        let config = load(&[
            ("BATCH_SIZE", "lots"),
            ("BATCH_INTERVAL", "0"),
            ("POST_ENDPOINT", "not a url"),
            ("FATAL_POLICY", "explode"),
        ]);
        assert_eq!(config.coordinator.batch_size, 10);
        assert_eq!(config.coordinator.batch_interval, Duration::from_secs(60));
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.fatal_policy, FatalPolicy::Terminate);

        let keys: Vec<&str> = config.fallbacks.iter().map(|f| f.key).collect();
        assert_eq!(
            keys,
            ["BATCH_SIZE", "BATCH_INTERVAL", "POST_ENDPOINT", "FATAL_POLICY"]
        );
    }

    #[test]
    fn zero_retry_delay_is_allowed() {
        let config = load(&[("RETRY_DELAY", "0")]);
        assert_eq!(config.coordinator.retry_delay, Duration::ZERO);
        assert!(config.fallbacks.is_empty());
    }
}
