//! # Server Configuration
//!
//! [`ServerConfig`] gathers every tunable of the protocol shell. It is loaded
//! from a YAML file, from `MINICOAP_*` environment variables on top of the
//! defaults, or both (file first, then environment).
//!
//! ```yaml
//! bind: "0.0.0.0:5683"
//! handler_timeout_ms: 5000
//! piggyback_window_ms: 1000
//! sweep_interval_ms: 250
//! dedup_capacity: 1024
//! transmission:
//!   ack_timeout_ms: 2000
//!   ack_random_factor: 1.5
//!   max_retransmit: 4
//! worker_pool:
//!   num_workers: 4
//!   queue_bound: 64
//! ```
//!
//! Durations are written in milliseconds. `dedup_window_ms` defaults to the
//! transmission span derived from `transmission` (45 s with the defaults).

use crate::dispatcher::DispatcherConfig;
use crate::exchange::{ExchangeRegistry, TransmissionParams, DEFAULT_DEDUP_CAPACITY};
use crate::runtime_config::{parse_stack_size, DEFAULT_STACK_SIZE};
use crate::worker_pool::WorkerPoolConfig;
use serde::{Deserialize, Deserializer};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default CoAP port.
pub const DEFAULT_PORT: u16 = 5683;

/// Longest duration any setting may name; deadlines are computed from `Instant`.
pub const MAX_SETTING_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Problems loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("environment variable {var} has invalid value {value:?}")]
    Env { var: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Protocol shell settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// UDP address to bind
    pub bind: SocketAddr,
    /// Longest wait for a resource handler
    #[serde(rename = "handler_timeout_ms", deserialize_with = "duration_ms")]
    pub handler_timeout: Duration,
    /// How long a confirmable request may wait for a piggybacked reply
    #[serde(rename = "piggyback_window_ms", deserialize_with = "duration_ms")]
    pub piggyback_window: Duration,
    /// Period of the retransmission sweep
    #[serde(rename = "sweep_interval_ms", deserialize_with = "duration_ms")]
    pub sweep_interval: Duration,
    /// How long message ids are remembered for duplicate detection
    #[serde(rename = "dedup_window_ms", deserialize_with = "optional_duration_ms")]
    pub dedup_window: Option<Duration>,
    /// Remembered message ids before the oldest is evicted
    pub dedup_capacity: usize,
    /// Stack size of the shell's own coroutines
    pub stack_size: usize,
    pub transmission: TransmissionParams,
    pub worker_pool: WorkerPoolConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            handler_timeout: Duration::from_secs(5),
            piggyback_window: Duration::from_secs(1),
            sweep_interval: Duration::from_millis(250),
            dedup_window: None,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            stack_size: DEFAULT_STACK_SIZE,
            transmission: TransmissionParams::default(),
            worker_pool: WorkerPoolConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load a YAML file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with `MINICOAP_*` overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env()
    }

    /// Apply `MINICOAP_*` overrides from the process environment.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any variable source.
    ///
    /// Recognized: `MINICOAP_BIND`, `MINICOAP_HANDLER_TIMEOUT_MS`,
    /// `MINICOAP_PIGGYBACK_WINDOW_MS`, `MINICOAP_SWEEP_INTERVAL_MS`,
    /// `MINICOAP_DEDUP_WINDOW_MS`, `MINICOAP_DEDUP_CAPACITY`,
    /// `MINICOAP_STACK_SIZE`, `MINICOAP_HANDLER_WORKERS`,
    /// `MINICOAP_HANDLER_QUEUE_BOUND`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            var: &'static str,
        ) -> Result<Option<T>, ConfigError> {
            match lookup(var) {
                None => Ok(None),
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::Env { var, value }),
            }
        }

        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        if let Some(bind) = parsed(lookup, "MINICOAP_BIND")? {
            self.bind = bind;
        }
        if let Some(ms) = parsed(lookup, "MINICOAP_HANDLER_TIMEOUT_MS")? {
            self.handler_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed(lookup, "MINICOAP_PIGGYBACK_WINDOW_MS")? {
            self.piggyback_window = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed(lookup, "MINICOAP_SWEEP_INTERVAL_MS")? {
            self.sweep_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed(lookup, "MINICOAP_DEDUP_WINDOW_MS")? {
            self.dedup_window = Some(Duration::from_millis(ms));
        }
        if let Some(capacity) = parsed(lookup, "MINICOAP_DEDUP_CAPACITY")? {
            self.dedup_capacity = capacity;
        }
        if let Some(workers) = parsed(lookup, "MINICOAP_HANDLER_WORKERS")? {
            self.worker_pool.num_workers = workers;
        }
        if let Some(bound) = parsed(lookup, "MINICOAP_HANDLER_QUEUE_BOUND")? {
            self.worker_pool.queue_bound = bound;
        }
        if let Some(value) = lookup("MINICOAP_STACK_SIZE") {
            let size = parse_stack_size(&value).ok_or(ConfigError::Env {
                var: "MINICOAP_STACK_SIZE",
                value,
            })?;
            self.stack_size = size;
            self.worker_pool.stack_size = size;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.handler_timeout.is_zero() {
            return invalid("handler_timeout_ms must be positive");
        }
        if self.sweep_interval.is_zero() {
            return invalid("sweep_interval_ms must be positive");
        }
        if self.dedup_capacity == 0 {
            return invalid("dedup_capacity must be positive");
        }
        if self.worker_pool.num_workers == 0 {
            return invalid("worker_pool.num_workers must be positive");
        }
        if self.worker_pool.queue_bound == 0 {
            return invalid("worker_pool.queue_bound must be positive");
        }
        if self.stack_size == 0 || self.worker_pool.stack_size == 0 {
            return invalid("stack_size must be positive");
        }
        if self.transmission.ack_timeout.is_zero() {
            return invalid("transmission.ack_timeout_ms must be positive");
        }
        let factor = self.transmission.ack_random_factor;
        if !factor.is_finite() || factor < 1.0 {
            return invalid("transmission.ack_random_factor must be a finite number of at least 1.0");
        }
        if self.transmission.max_retransmit > 16 {
            return invalid("transmission.max_retransmit must be at most 16");
        }
        let durations = [
            ("handler_timeout_ms", self.handler_timeout),
            ("piggyback_window_ms", self.piggyback_window),
            ("sweep_interval_ms", self.sweep_interval),
            ("transmission.ack_timeout_ms", self.transmission.ack_timeout),
            ("dedup_window_ms", self.dedup_window()),
        ];
        if let Some((name, _)) = durations
            .iter()
            .find(|(_, d)| *d > MAX_SETTING_DURATION)
        {
            return Err(ConfigError::Invalid(format!(
                "{name} must not exceed {} ms",
                MAX_SETTING_DURATION.as_millis()
            )));
        }
        Ok(())
    }

    /// Effective duplicate-detection window.
    #[must_use]
    pub fn dedup_window(&self) -> Duration {
        self.dedup_window
            .unwrap_or_else(|| self.transmission.max_transmit_span())
    }

    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            handler_timeout: self.handler_timeout,
            worker_pool: self.worker_pool,
        }
    }

    /// A registry sized and timed from this configuration.
    #[must_use]
    pub fn exchange_registry(&self) -> ExchangeRegistry {
        ExchangeRegistry::with_dedup(self.transmission, self.dedup_window(), self.dedup_capacity)
    }
}

/// Deserialize a millisecond count into a `Duration`.
pub(crate) fn duration_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

fn optional_duration_ms<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.bind.port(), 5683);
        assert_eq!(config.dedup_window(), Duration::from_secs(45));
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::default()
            .with_overrides(vars(&[
                ("MINICOAP_BIND", "127.0.0.1:6000"),
                ("MINICOAP_HANDLER_TIMEOUT_MS", "250"),
                ("MINICOAP_STACK_SIZE", "0x8000"),
                ("MINICOAP_HANDLER_WORKERS", "2"),
                ("MINICOAP_HANDLER_QUEUE_BOUND", "8"),
            ]))
            .unwrap();
        assert_eq!(config.bind, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(config.handler_timeout, Duration::from_millis(250));
        assert_eq!(config.stack_size, 0x8000);
        assert_eq!(config.worker_pool.stack_size, 0x8000);
        assert_eq!(config.worker_pool.num_workers, 2);
        assert_eq!(config.worker_pool.queue_bound, 8);
    }

    #[test]
    fn test_bad_override_names_the_variable() {
        let err = ServerConfig::default()
            .with_overrides(vars(&[("MINICOAP_DEDUP_CAPACITY", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Env {
                var: "MINICOAP_DEDUP_CAPACITY",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = ServerConfig::default()
            .with_overrides(vars(&[("MINICOAP_HANDLER_WORKERS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
