//! Error model and crate error types.
//!
//! This module holds the data that flows through the bus (the raised error,
//! its context, its classification and the resulting record) together with
//! the two error enums of the crate: [`BusError`] for the public bus surface
//! and [`ComponentError`] for failures at an extension point boundary.

pub mod classification;
pub mod context;
pub mod raised;
pub mod record;

pub use classification::{ErrorClassification, ErrorType, Severity};
pub use context::{ErrorContext, ErrorContextFragment, Transport};
pub use raised::RaisedError;
pub use record::{ErrorRecord, ErrorStatus, ProcessingStep, StepKind, StepOutcome};

use std::time::Duration;
use thiserror::Error;

/// Errors returned by the bus itself.
#[derive(Debug, Error)]
pub enum BusError {
    /// `publish` was called before `start` (or after `stop`).
    #[error("error bus is not started")]
    NotStarted,

    /// `start` was called outside a tokio runtime.
    #[error("error bus must be started inside a tokio runtime")]
    NoRuntime,

    #[error("invalid status transition for record {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ErrorStatus,
        to: ErrorStatus,
    },

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Failure reported by a classifier, handler, notifier or recovery strategy.
///
/// These never escape the bus; they end up in a record's processing history.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComponentError {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("panicked: {0}")]
    Panicked(String),
}

impl ComponentError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<reqwest::Error> for ComponentError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ComponentError::Unavailable(format!("request timed out: {}", error))
        } else if error.is_connect() {
            ComponentError::Unavailable(format!("connection failed: {}", error))
        } else {
            ComponentError::Failed(error.to_string())
        }
    }
}

impl From<serde_json::Error> for ComponentError {
    fn from(error: serde_json::Error) -> Self {
        ComponentError::Failed(format!("serialization failed: {}", error))
    }
}

/// Result alias for extension point implementations.
pub type ComponentResult<T> = Result<T, ComponentError>;
