//! Classifier for errors carrying an HTTP status code.

use super::Classifier;
use crate::error::{
    ComponentError, ComponentResult, ErrorClassification, ErrorContext, ErrorType, RaisedError,
    Severity,
};
use crate::registry::Component;

/// Maps `RaisedError::status` (4xx and 5xx) to a classification.
///
/// Runs ahead of the pattern classifier by default since a status code is a
/// stronger signal than message text.
#[derive(Debug, Clone)]
pub struct StatusCodeClassifier {
    name: String,
    priority: i32,
}

impl Default for StatusCodeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCodeClassifier {
    pub const DEFAULT_NAME: &'static str = "status-code";
    pub const DEFAULT_PRIORITY: i32 = 100;

    pub fn new() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            priority: Self::DEFAULT_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Classification for a status, `None` below 400.
    pub fn classify_status(status: u16, message: &str) -> Option<ErrorClassification> {
        let (error_type, severity, code, retryable) = match status {
            400 | 422 => (ErrorType::Validation, Severity::Low, "VALIDATION_FAILED", false),
            401 => (ErrorType::Authentication, Severity::High, "AUTHENTICATION_FAILED", false),
            403 => (ErrorType::Authorization, Severity::High, "ACCESS_DENIED", false),
            404 => (ErrorType::Business, Severity::Low, "NOT_FOUND", false),
            409 => (ErrorType::Business, Severity::Medium, "CONFLICT", false),
            408 | 504 => (ErrorType::Timeout, Severity::Medium, "TIMEOUT", true),
            429 => (ErrorType::ResourceExhausted, Severity::Medium, "RATE_LIMITED", true),
            502 | 503 => (
                ErrorType::ExternalService,
                Severity::High,
                "EXTERNAL_SERVICE_UNAVAILABLE",
                true,
            ),
            400..=499 => (ErrorType::Validation, Severity::Low, "CLIENT_ERROR", false),
            500..=599 => (ErrorType::System, Severity::High, "INTERNAL_ERROR", false),
            _ => return None,
        };

        Some(
            ErrorClassification::new(error_type, severity, code, message)
                .with_retryable(retryable)
                .with_metadata("httpStatus", status)
                .with_tag("http"),
        )
    }
}

impl Component for StatusCodeClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

impl Classifier for StatusCodeClassifier {
    fn applies_to(&self, error: &RaisedError, _context: &ErrorContext) -> bool {
        matches!(error.status, Some(400..=599))
    }

    fn classify(
        &self,
        error: &RaisedError,
        _context: &ErrorContext,
    ) -> ComponentResult<ErrorClassification> {
        let status = error
            .status
            .ok_or_else(|| ComponentError::Rejected("error has no status code".to_string()))?;
        Self::classify_status(status, &error.message)
            .ok_or_else(|| ComponentError::Rejected(format!("status {} is not an error", status)))
    }
}
