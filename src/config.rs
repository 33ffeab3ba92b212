//! Aggregator configuration
//!
//! Loaded from a TOML file and/or `AGGREGATOR_*` environment variables,
//! environment winning over file, defaults filling the rest. Always run
//! `validate()` before wiring anything from a config.

use crate::metrics::FailureReportGate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming a TOML config file
pub const CONFIG_PATH_ENV: &str = "AGGREGATOR_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Concurrent ingest workers (default: 5)
    pub workers_count: usize,
    /// Input queue capacity; 1 keeps producers in lockstep with workers
    pub input_queue_capacity: usize,
    pub outcome_queue_capacity: usize,
    /// Report every N outcomes (default: 10)
    pub metrics_batch_size: u64,
    pub failure_report_gate: FailureReportGate,
    /// Point index expiry (default: 500s)
    #[serde(rename = "point_ttl_secs", with = "duration_secs")]
    pub point_ttl: Duration,
    /// Ordered set key of the order index (default: "events")
    pub order_index_key: String,
    #[serde(rename = "expiry_sweep_interval_ms", with = "duration_millis")]
    pub expiry_sweep_interval: Duration,
    pub generator: GeneratorConfig,
    pub logging: LoggingConfig,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            workers_count: 5,
            input_queue_capacity: 1,
            outcome_queue_capacity: 1,
            metrics_batch_size: 10,
            failure_report_gate: FailureReportGate::SuccessCount,
            point_ttl: Duration::from_secs(500),
            order_index_key: "events".to_string(),
            expiry_sweep_interval: Duration::from_millis(100),
            generator: GeneratorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Synthetic producer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Delay between emitted batches (default: 555ms)
    #[serde(rename = "interval_ms", with = "duration_millis")]
    pub interval: Duration,
    /// Values per batch (default: 10)
    pub pack_length: usize,
    /// Values are drawn from `[0, value_limit)` (default: 1000)
    pub value_limit: i64,
    pub seed: u64,
    /// Batches to emit before stopping
    pub count: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            interval: Duration::from_millis(555),
            pack_length: 10,
            value_limit: 1000,
            seed: 0,
            count: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl AggregatorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults overlaid with `AGGREGATOR_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// File named by `AGGREGATOR_CONFIG` (if set), then environment
    /// overrides, then validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from `lookup` (an environment stand-in) onto `self`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        fn parsed<T: FromStr>(
            lookup: &impl Fn(&'static str) -> Option<String>,
            var: &'static str,
        ) -> Result<Option<T>, ConfigError> {
            match lookup(var) {
                None => Ok(None),
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::InvalidEnv { var, value }),
            }
        }

        if let Some(v) = parsed(&lookup, "AGGREGATOR_WORKERS_COUNT")? {
            self.workers_count = v;
        }
        if let Some(v) = parsed(&lookup, "AGGREGATOR_INPUT_QUEUE_CAPACITY")? {
            self.input_queue_capacity = v;
        }
        if let Some(v) = parsed(&lookup, "AGGREGATOR_OUTCOME_QUEUE_CAPACITY")? {
            self.outcome_queue_capacity = v;
        }
        if let Some(v) = parsed(&lookup, "AGGREGATOR_METRICS_BATCH_SIZE")? {
            self.metrics_batch_size = v;
        }
        if let Some(value) = lookup("AGGREGATOR_FAILURE_REPORT_GATE") {
            self.failure_report_gate = match value.trim() {
                "success_count" => FailureReportGate::SuccessCount,
                "failure_count" => FailureReportGate::FailureCount,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "AGGREGATOR_FAILURE_REPORT_GATE",
                        value,
                    })
                }
            };
        }
        if let Some(v) = parsed(&lookup, "AGGREGATOR_POINT_TTL_SECS")? {
            self.point_ttl = Duration::from_secs(v);
        }
        if let Some(v) = lookup("AGGREGATOR_ORDER_INDEX_KEY") {
            self.order_index_key = v;
        }
        if let Some(v) = parsed(&lookup, "AGGREGATOR_EXPIRY_SWEEP_INTERVAL_MS")? {
            self.expiry_sweep_interval = Duration::from_millis(v);
        }
        if let Some(v) = parsed(&lookup, "AGGREGATOR_GENERATOR_INTERVAL_MS")? {
            self.generator.interval = Duration::from_millis(v);
        }
        if let Some(v) = parsed(&lookup, "AGGREGATOR_GENERATOR_PACK_LENGTH")? {
            self.generator.pack_length = v;
        }
        if let Some(v) = parsed(&lookup, "AGGREGATOR_GENERATOR_VALUE_LIMIT")? {
            self.generator.value_limit = v;
        }
        if let Some(v) = parsed(&lookup, "AGGREGATOR_GENERATOR_SEED")? {
            self.generator.seed = v;
        }
        if let Some(v) = parsed(&lookup, "AGGREGATOR_GENERATOR_COUNT")? {
            self.generator.count = v;
        }
        if let Some(v) = lookup("AGGREGATOR_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = parsed(&lookup, "AGGREGATOR_LOG_FORMAT")? {
            self.logging.format = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(bool, &str); 9] = [
            (self.workers_count >= 1, "workers_count must be at least 1"),
            (self.input_queue_capacity >= 1, "input_queue_capacity must be at least 1"),
            (self.outcome_queue_capacity >= 1, "outcome_queue_capacity must be at least 1"),
            (self.metrics_batch_size >= 1, "metrics_batch_size must be at least 1"),
            (!self.point_ttl.is_zero(), "point_ttl_secs must be positive"),
            (!self.order_index_key.is_empty(), "order_index_key must not be empty"),
            (
                !self.expiry_sweep_interval.is_zero(),
                "expiry_sweep_interval_ms must be positive",
            ),
            (self.generator.pack_length >= 1, "generator.pack_length must be at least 1"),
            (self.generator.value_limit >= 1, "generator.value_limit must be at least 1"),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, message)) => Err(ConfigError::Invalid(message.to_string())),
            None => Ok(()),
        }
    }
}

/// Serde helper for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Serde helper for Duration as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
