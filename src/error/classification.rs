//! Classification types for published errors.
//!
//! A classification is computed exactly once per record, at publish time, and
//! decides which downstream stages see the record: severity gates notifiers,
//! the recoverable/retryable flags gate recovery strategies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::config::millis;

/// The category an error belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// A domain rule was violated.
    Business,
    /// Input failed validation.
    Validation,
    /// The caller could not be authenticated.
    Authentication,
    /// The caller is authenticated but not allowed.
    Authorization,
    /// Database or repository failure.
    DataAccess,
    /// Connectivity failure (DNS, TCP, TLS, resets).
    Network,
    /// Internal failure of the application itself.
    System,
    /// A third-party dependency failed.
    ExternalService,
    /// Missing or invalid configuration.
    Configuration,
    /// An operation exceeded its deadline.
    Timeout,
    /// Quotas, rate limits or pools ran dry.
    ResourceExhausted,
    /// Nothing more specific applied.
    Unknown,
}

impl ErrorType {
    /// All variants, in declaration order.
    pub const ALL: [ErrorType; 12] = [
        ErrorType::Business,
        ErrorType::Validation,
        ErrorType::Authentication,
        ErrorType::Authorization,
        ErrorType::DataAccess,
        ErrorType::Network,
        ErrorType::System,
        ErrorType::ExternalService,
        ErrorType::Configuration,
        ErrorType::Timeout,
        ErrorType::ResourceExhausted,
        ErrorType::Unknown,
    ];

    /// Wire name, e.g. `DATA_ACCESS`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Business => "BUSINESS",
            ErrorType::Validation => "VALIDATION",
            ErrorType::Authentication => "AUTHENTICATION",
            ErrorType::Authorization => "AUTHORIZATION",
            ErrorType::DataAccess => "DATA_ACCESS",
            ErrorType::Network => "NETWORK",
            ErrorType::System => "SYSTEM",
            ErrorType::ExternalService => "EXTERNAL_SERVICE",
            ErrorType::Configuration => "CONFIGURATION",
            ErrorType::Timeout => "TIMEOUT",
            ErrorType::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorType::Unknown => "UNKNOWN",
        }
    }

    /// Lowercase category label used when a classifier does not set one.
    pub fn category(&self) -> &'static str {
        match self {
            ErrorType::Business => "business",
            ErrorType::Validation => "validation",
            ErrorType::Authentication => "authentication",
            ErrorType::Authorization => "authorization",
            ErrorType::DataAccess => "data_access",
            ErrorType::Network => "network",
            ErrorType::System => "system",
            ErrorType::ExternalService => "external_service",
            ErrorType::Configuration => "configuration",
            ErrorType::Timeout => "timeout",
            ErrorType::ResourceExhausted => "resource_exhausted",
            ErrorType::Unknown => "unknown",
        }
    }

    /// Whether errors of this type are usually transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorType::Network
                | ErrorType::Timeout
                | ErrorType::ExternalService
                | ErrorType::ResourceExhausted
                | ErrorType::DataAccess
        )
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad an error is. Ordered: `Low < Medium < High < Critical`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured classification attached to every record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorClassification {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub severity: Severity,
    /// Stable machine-readable code, e.g. `NETWORK_TIMEOUT`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    pub category: String,
    pub recoverable: bool,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(
        default,
        rename = "retryDelayMs",
        with = "millis::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_delay: Option<Duration>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ErrorClassification {
    /// Creates a classification that is neither recoverable nor retryable.
    pub fn new(
        error_type: ErrorType,
        severity: Severity,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error_type,
            severity,
            code: code.into(),
            message: message.into(),
            category: error_type.category().to_string(),
            recoverable: false,
            retryable: false,
            max_retries: None,
            retry_delay: None,
            tags: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// The classification used when no classifier applies.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Unknown, Severity::Medium, "UNKNOWN_ERROR", message)
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Marks the error retryable. Retryable implies recoverable.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        if retryable {
            self.recoverable = true;
        }
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns true if the severity is at least `threshold`.
    pub fn is_at_least(&self, threshold: Severity) -> bool {
        self.severity >= threshold
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}: {}", self.error_type, self.severity, self.code, self.message)
    }
}
