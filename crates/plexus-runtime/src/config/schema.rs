//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use plexus_bus::{BusConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_REQUEST_TIMEOUT, UnroutablePolicy};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlexusConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Communication bus settings.
    #[serde(default)]
    pub bus: BusSettings,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level name as used in filter directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the matching `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Writes to [`LoggingConfig::file_path`].
    File,
}

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Span events to log.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread IDs.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file names and line numbers.
    #[serde(default)]
    pub file_location: bool,

    /// Log file used when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Rollover schedule for the log file.
    #[serde(default)]
    pub rotation: LogRotation,

    /// Number of rotated files to keep.
    #[serde(default = "default_max_files")]
    pub max_files: u32,

    /// Per-module level overrides, e.g. `plexus_bus = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            filters: HashMap::new(),
        }
    }
}

fn default_max_files() -> u32 {
    5
}

// =============================================================================
// Bus
// =============================================================================

/// Communication bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSettings {
    /// Capacity of the inbound message queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Default request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Upper bound on concurrently dispatched messages; unbounded if absent.
    #[serde(default)]
    pub max_concurrent_dispatch: Option<usize>,

    /// What to do with requests no handler can answer (`drop` or `reply`).
    #[serde(default)]
    pub unroutable: UnroutablePolicy,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            request_timeout_ms: default_request_timeout_ms(),
            max_concurrent_dispatch: None,
            unroutable: UnroutablePolicy::default(),
        }
    }
}

impl BusSettings {
    /// Converts to the bus configuration.
    pub fn to_bus_config(&self) -> BusConfig {
        let mut config = BusConfig::new()
            .queue_capacity(self.queue_capacity)
            .request_timeout(Duration::from_millis(self.request_timeout_ms))
            .unroutable(self.unroutable);
        if let Some(limit) = self.max_concurrent_dispatch {
            config = config.max_concurrent_dispatch(limit);
        }
        config
    }
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bus_defaults() {
        let config = BusSettings::default().to_bus_config();
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.max_concurrent_dispatch, None);
        assert_eq!(config.unroutable, UnroutablePolicy::Drop);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: PlexusConfig = serde_json::from_value(serde_json::json!({
            "logging": { "level": "debug", "filters": { "plexus_bus": "trace" } },
            "bus": { "queue_capacity": 16, "unroutable": "reply" }
        }))
        .unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.filters.get("plexus_bus"), Some(&LogLevel::Trace));
        assert_eq!(config.bus.queue_capacity, 16);
        assert_eq!(config.bus.request_timeout_ms, 30_000);

        let bus = config.bus.to_bus_config();
        assert_eq!(bus.unroutable, UnroutablePolicy::Reply);
    }
}
