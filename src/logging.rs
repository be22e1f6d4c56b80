//! Structured logging setup.
//!
//! All crate code logs through `tracing` macros with structured fields
//! (`request_id`, `path`, `method`, `status`, latency). This module installs
//! the global subscriber once per process:
//!
//! - `EnvFilter` from `RUST_LOG` when set, otherwise `MINICOAP_LOG_LEVEL`
//! - a JSON or pretty `fmt` layer
//! - optionally `tracing-appender`'s non-blocking writer, flushed when the
//!   returned [`LoggingGuard`] is dropped
//!
//! ## Environment
//!
//! | Variable | Default |
//! |---|---|
//! | `MINICOAP_LOG_LEVEL` | `info` |
//! | `MINICOAP_LOG_FORMAT` | `json` (`pretty` for humans) |
//! | `MINICOAP_LOG_ASYNC` | `true` |
//! | `MINICOAP_LOG_BUFFER_LINES` | `8192` |
//! | `MINICOAP_LOG_TARGET_FILTER` | unset, comma-separated directives |
//! | `MINICOAP_LOG_INCLUDE_LOCATION` | `false` |

use anyhow::{Context, Result};
use std::env;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Log level: trace/debug/info/warn/error
    pub log_level: String,
    /// Log format: json/pretty
    pub format: LogFormat,
    /// Write through a background thread instead of blocking the caller
    pub async_logging: bool,
    /// Lines buffered by the background writer before new lines are dropped
    pub buffer_lines: usize,
    /// Extra filter directives (comma-separated), e.g. `minicoap::exchange=trace`
    pub target_filter: Option<String>,
    /// Include file:line location (dev only)
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            async_logging: true,
            buffer_lines: 8192,
            target_filter: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Parse configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: env::var("MINICOAP_LOG_LEVEL").unwrap_or(defaults.log_level),
            format: env::var("MINICOAP_LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or(defaults.format),
            async_logging: env::var("MINICOAP_LOG_ASYNC")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.async_logging),
            buffer_lines: env::var("MINICOAP_LOG_BUFFER_LINES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.buffer_lines),
            target_filter: env::var("MINICOAP_LOG_TARGET_FILTER").ok(),
            include_location: env::var("MINICOAP_LOG_INCLUDE_LOCATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.include_location),
        }
    }

    /// Human-friendly synchronous output.
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            async_logging: false,
            buffer_lines: 1024,
            target_filter: None,
            include_location: true,
        }
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let mut env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));

        if let Some(target_filter) = &self.target_filter {
            for filter in target_filter.split(',').map(str::trim) {
                if filter.is_empty() {
                    continue;
                }
                match filter.parse() {
                    Ok(directive) => env_filter = env_filter.add_directive(directive),
                    // No subscriber yet, so stderr is the only place this can go
                    Err(_) => eprintln!("Warning: Invalid log filter directive: {filter}"),
                }
            }
        }
        env_filter
    }
}

/// Keeps the background log writer alive.
///
/// Dropping it flushes buffered lines. Hand it to
/// [`crate::server::CoapServer::with_logging_guard`] so logging lives exactly
/// as long as the server.
#[must_use = "dropping the guard stops the background log writer"]
pub struct LoggingGuard {
    worker: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Whether a background writer is attached.
    pub fn is_async(&self) -> bool {
        self.worker.is_some()
    }
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard")
            .field("async", &self.is_async())
            .finish()
    }
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set.
///
/// ```no_run
/// use minicoap::logging::{init_logging, LogConfig};
///
/// let _guard = init_logging(&LogConfig::from_env()).expect("logging");
/// tracing::info!("ready");
/// ```
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard> {
    let (writer, worker) = if config.async_logging {
        let (non_blocking, guard) = NonBlockingBuilder::default()
            .buffered_lines_limit(config.buffer_lines)
            .lossy(true)
            .finish(std::io::stdout());
        (BoxMakeWriter::new(non_blocking), Some(guard))
    } else {
        (BoxMakeWriter::new(std::io::stdout), None)
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_list(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(LoggingGuard { worker })
}
