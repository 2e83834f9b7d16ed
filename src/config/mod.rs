//! Bus configuration.
//!
//! Configuration is layered, lowest priority first:
//! 1. Built-in defaults ([`BusConfig::default`])
//! 2. An optional TOML file
//! 3. Environment variables with the `FAULTBUS__` prefix, e.g.
//!    `FAULTBUS__BATCH_SIZE=50` or `FAULTBUS__ENABLE_NOTIFICATION=false`
//!
//! At runtime the bus accepts a [`BusConfigPatch`], which is merged over the
//! current values. Durations are expressed in milliseconds (`*_ms` keys).

pub(crate) mod millis;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "FAULTBUS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("invalid configuration path: {0}")]
    InvalidPath(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime configuration of an [`ErrorBus`](crate::bus::ErrorBus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Master switch for draining. Publishing is unaffected.
    pub enabled: bool,
    pub enable_classification: bool,
    pub enable_notification: bool,
    pub enable_recovery: bool,
    /// Gates handlers whose step kind is `MONITORING`.
    pub enable_monitoring: bool,
    /// Deadline for a single handler, notifier or recovery invocation.
    #[serde(rename = "processing_timeout_ms", with = "millis")]
    pub processing_timeout: Duration,
    /// Retry budget for recovery when the classification has none.
    pub max_retries: u32,
    /// Base retry delay for recovery when the classification has none.
    #[serde(rename = "retry_delay_ms", with = "millis")]
    pub retry_delay: Duration,
    /// How long finished records stay inspectable.
    #[serde(rename = "retention_time_ms", with = "millis")]
    pub retention_time: Duration,
    /// Upper bound on retained records; the oldest are evicted first.
    /// 0 disables retention.
    pub max_retained_records: usize,
    /// Maximum records drained per tick.
    pub batch_size: usize,
    #[serde(rename = "batch_interval_ms", with = "millis")]
    pub batch_interval: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            enable_classification: true,
            enable_notification: true,
            enable_recovery: true,
            enable_monitoring: true,
            processing_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            retention_time: Duration::from_secs(60 * 60),
            max_retained_records: 10_000,
            batch_size: 100,
            batch_interval: Duration::from_secs(1),
        }
    }
}

impl BusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from an optional file plus `FAULTBUS__*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            let path_str = path
                .to_str()
                .ok_or_else(|| ConfigError::InvalidPath(format!("{:?}", path)))?;
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path_str.to_string()));
            }
            builder = builder.add_source(File::with_name(path_str));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let bus_config: BusConfig = config.try_deserialize()?;
        bus_config.validate()?;
        Ok(bus_config)
    }

    /// Rejects values the drain loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.batch_interval.is_zero() {
            return Err(ConfigError::Invalid("batch_interval_ms must be positive".into()));
        }
        if self.processing_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "processing_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Returns a copy with `patch` merged over it.
    pub fn merged(&self, patch: &BusConfigPatch) -> Self {
        let mut next = self.clone();
        if let Some(v) = patch.enabled {
            next.enabled = v;
        }
        if let Some(v) = patch.enable_classification {
            next.enable_classification = v;
        }
        if let Some(v) = patch.enable_notification {
            next.enable_notification = v;
        }
        if let Some(v) = patch.enable_recovery {
            next.enable_recovery = v;
        }
        if let Some(v) = patch.enable_monitoring {
            next.enable_monitoring = v;
        }
        if let Some(v) = patch.processing_timeout {
            next.processing_timeout = v;
        }
        if let Some(v) = patch.max_retries {
            next.max_retries = v;
        }
        if let Some(v) = patch.retry_delay {
            next.retry_delay = v;
        }
        if let Some(v) = patch.retention_time {
            next.retention_time = v;
        }
        if let Some(v) = patch.max_retained_records {
            next.max_retained_records = v;
        }
        if let Some(v) = patch.batch_size {
            next.batch_size = v;
        }
        if let Some(v) = patch.batch_interval {
            next.batch_interval = v;
        }
        next
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = interval;
        self
    }

    pub fn with_processing_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_retention_time(mut self, retention: Duration) -> Self {
        self.retention_time = retention;
        self
    }

    pub fn with_max_retained_records(mut self, max: usize) -> Self {
        self.max_retained_records = max;
        self
    }
}

/// A partial configuration. `None` leaves the current value untouched.
///
/// Accepts both the file keys (`batch_size`, `retry_delay_ms`) and the
/// camelCase option names (`batchSize`, `retryDelay`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfigPatch {
    pub enabled: Option<bool>,
    #[serde(alias = "enableClassification")]
    pub enable_classification: Option<bool>,
    #[serde(alias = "enableNotification")]
    pub enable_notification: Option<bool>,
    #[serde(alias = "enableRecovery")]
    pub enable_recovery: Option<bool>,
    #[serde(alias = "enableMonitoring")]
    pub enable_monitoring: Option<bool>,
    #[serde(
        rename = "processing_timeout_ms",
        alias = "processingTimeout",
        with = "millis::option"
    )]
    pub processing_timeout: Option<Duration>,
    #[serde(alias = "maxRetries")]
    pub max_retries: Option<u32>,
    #[serde(rename = "retry_delay_ms", alias = "retryDelay", with = "millis::option")]
    pub retry_delay: Option<Duration>,
    #[serde(
        rename = "retention_time_ms",
        alias = "retentionTime",
        with = "millis::option"
    )]
    pub retention_time: Option<Duration>,
    #[serde(alias = "maxRetainedRecords")]
    pub max_retained_records: Option<usize>,
    #[serde(alias = "batchSize")]
    pub batch_size: Option<usize>,
    #[serde(
        rename = "batch_interval_ms",
        alias = "batchInterval",
        with = "millis::option"
    )]
    pub batch_interval: Option<Duration>,
}

impl BusConfigPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn enable_classification(mut self, enabled: bool) -> Self {
        self.enable_classification = Some(enabled);
        self
    }

    pub fn enable_notification(mut self, enabled: bool) -> Self {
        self.enable_notification = Some(enabled);
        self
    }

    pub fn enable_recovery(mut self, enabled: bool) -> Self {
        self.enable_recovery = Some(enabled);
        self
    }

    pub fn enable_monitoring(mut self, enabled: bool) -> Self {
        self.enable_monitoring = Some(enabled);
        self
    }

    pub fn processing_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn retention_time(mut self, retention: Duration) -> Self {
        self.retention_time = Some(retention);
        self
    }

    pub fn max_retained_records(mut self, max: usize) -> Self {
        self.max_retained_records = Some(max);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = Some(interval);
        self
    }
}
