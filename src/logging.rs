//! Diagnostic logging for the bus and its CLI.
//!
//! Everything goes to stderr so `faultbus simulate` can print its statistics
//! JSON on stdout untouched. `RUST_LOG` wins over the programmatic level.

use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{fmt as subscriber_fmt, EnvFilter};

/// Verbosity of the bus's own diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Silence everything.
    Off,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "none" => Ok(LogLevel::Off),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl From<u8> for LogLevel {
    /// `-v` count: 0 = warn, 1 = info, 2 = debug, 3+ = trace.
    fn from(verbosity: u8) -> Self {
        match verbosity {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Level applied to dependencies (reqwest, hyper, ...) when `level` is
    /// more verbose than this.
    pub dependency_level: LogLevel,
    pub with_timestamps: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            dependency_level: LogLevel::Warn,
            with_timestamps: true,
            with_target: true,
            with_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_dependency_level(mut self, level: LogLevel) -> Self {
        self.dependency_level = level;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.with_timestamps = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    /// CLI verbosity. `quiet` forces errors only.
    pub fn from_verbosity(verbosity: u8, quiet: bool) -> Self {
        let level = if quiet {
            LogLevel::Error
        } else {
            LogLevel::from(verbosity)
        };
        Self::default().with_level(level)
    }

    /// `EnvFilter` directive: the crate at `level`, everything else capped
    /// at `dependency_level`.
    pub fn filter_directive(&self) -> String {
        if self.level == LogLevel::Off {
            return "off".to_string();
        }
        let deps = if self.dependency_level > self.level {
            self.level
        } else {
            self.dependency_level
        };
        format!("{deps},faultbus={}", self.level)
    }
}

// Off is the least verbose; Trace the most.
impl PartialOrd for LogLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        fn rank(level: &LogLevel) -> u8 {
            match level {
                LogLevel::Off => 0,
                LogLevel::Error => 1,
                LogLevel::Warn => 2,
                LogLevel::Info => 3,
                LogLevel::Debug => 4,
                LogLevel::Trace => 5,
            }
        }
        rank(self).cmp(&rank(other))
    }
}

/// Installs the global subscriber.
///
/// Returns `false` when a subscriber was already installed (for example by
/// a host application or a previous call); the existing one is kept.
///
/// ```no_run
/// use faultbus::logging::{init_logging, LogLevel, LoggingConfig};
///
/// init_logging(LoggingConfig::new().with_level(LogLevel::Debug));
/// ```
pub fn init_logging(config: LoggingConfig) -> bool {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(config.filter_directive()),
    };

    let builder = subscriber_fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids);

    let result = if config.with_timestamps {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    };
    result.is_ok()
}
