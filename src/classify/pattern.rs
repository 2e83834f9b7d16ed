//! Regex-based error classifier
//!
//! Matches the searchable text of a raised error (name, message, code and
//! causes) against an ordered list of patterns. The first pattern that
//! matches decides the classification.

use regex::Regex;
use std::time::Duration;
use tracing::warn;

use super::Classifier;
use crate::error::{
    ComponentError, ComponentResult, ErrorClassification, ErrorContext, ErrorType, RaisedError,
    Severity,
};
use crate::registry::Component;

/// A pattern for matching errors in raised error text.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    /// The compiled regex pattern.
    regex: Regex,
    error_type: ErrorType,
    severity: Severity,
    /// Machine-readable code assigned on match.
    code: String,
    retryable: bool,
    recoverable: bool,
    retry_delay: Option<Duration>,
    /// A human-readable description of what this pattern detects.
    description: String,
}

impl ErrorPattern {
    /// Creates a new error pattern. Fails if `pattern` is not a valid regex.
    pub fn new(
        pattern: &str,
        error_type: ErrorType,
        severity: Severity,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self::with_regex(
            Regex::new(pattern)?,
            error_type,
            severity,
            code,
            description,
        ))
    }

    /// Creates a new error pattern with a pre-compiled regex.
    pub fn with_regex(
        regex: Regex,
        error_type: ErrorType,
        severity: Severity,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            regex,
            error_type,
            severity,
            code: code.into(),
            retryable: false,
            recoverable: false,
            retry_delay: None,
            description: description.into(),
        }
    }

    /// Marks matches as retryable (and therefore recoverable).
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self.recoverable = true;
        self
    }

    /// Marks matches as recoverable without retrying.
    pub fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Checks if this pattern matches the given text.
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Finds the first match in the text and returns the matched string.
    pub fn find<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.regex.find(text).map(|m| m.as_str())
    }

    fn to_classification(&self, error: &RaisedError, matched: &str) -> ErrorClassification {
        let mut classification =
            ErrorClassification::new(self.error_type, self.severity, &self.code, &error.message)
                .with_recoverable(self.recoverable)
                .with_retryable(self.retryable)
                .with_metadata("matchedPattern", self.regex.as_str())
                .with_metadata("matchedText", matched)
                .with_tag("pattern");
        if let Some(delay) = self.retry_delay {
            classification = classification.with_retry_delay(delay);
        }
        classification
    }
}

/// Classifier that assigns a classification from the first matching pattern.
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    name: String,
    priority: i32,
    /// The list of patterns to match against, in priority order.
    patterns: Vec<ErrorPattern>,
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternClassifier {
    pub const DEFAULT_NAME: &'static str = "pattern";
    pub const DEFAULT_PRIORITY: i32 = 50;

    /// Creates a classifier with the built-in patterns.
    pub fn new() -> Self {
        Self::with_patterns(Self::default_patterns())
    }

    /// Creates a classifier with custom patterns.
    pub fn with_patterns(patterns: Vec<ErrorPattern>) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            priority: Self::DEFAULT_PRIORITY,
            patterns,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Appends a pattern after the existing ones.
    pub fn push_pattern(mut self, pattern: ErrorPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn patterns(&self) -> &[ErrorPattern] {
        &self.patterns
    }

    /// Returns the first pattern matching `text`, with the matched substring.
    pub fn find_match<'a>(&self, text: &'a str) -> Option<(&ErrorPattern, &'a str)> {
        self.patterns
            .iter()
            .find_map(|pattern| pattern.find(text).map(|m| (pattern, m)))
    }

    /// Built-in patterns, most specific first.
    fn default_patterns() -> Vec<ErrorPattern> {
        use ErrorType::*;
        use Severity::*;

        let table: [(&str, ErrorType, Severity, &str, &str, bool); 16] = [
            // Resource exhaustion
            (r"(?i)\b429\b|too\s+many\s+requests", ResourceExhausted, Medium, "RATE_LIMITED", "Too many requests", true),
            (r"(?i)\brate[\s\-]?limit", ResourceExhausted, Medium, "RATE_LIMITED", "Rate limit error message", true),
            (r"(?i)quota\s*(exceeded|exhausted)", ResourceExhausted, High, "QUOTA_EXCEEDED", "Quota exceeded", false),
            (r"(?i)out\s+of\s+memory|disk\s+full|no\s+space\s+left", ResourceExhausted, Critical, "RESOURCE_EXHAUSTED", "Host resources exhausted", false),
            // Authentication and authorization
            (r"(?i)\b401\b|\bunauthori[sz]ed\b|auth(entication)?\s*(failed|error)", Authentication, High, "AUTHENTICATION_FAILED", "Authentication failed", false),
            (r"(?i)invalid\s*(api\s*)?(token|key)|token\s+expired", Authentication, High, "INVALID_CREDENTIALS", "Invalid credentials", false),
            (r"(?i)\b403\b|\bforbidden\b|permission\s+denied|access\s+denied", Authorization, High, "ACCESS_DENIED", "Access denied", false),
            // Timeouts
            (r"(?i)timed?\s*out|timeout|deadline\s+exceeded", Timeout, Medium, "TIMEOUT", "Operation timed out", true),
            // Network
            (r"(?i)connection\s*(refused|reset|closed|failed)|ECONNREFUSED|ECONNRESET", Network, High, "CONNECTION_FAILED", "Connection failure", true),
            (r"(?i)network\s*(error|unreachable)|dns\s+(lookup|resolution)\s+failed|host\s+unreachable", Network, High, "NETWORK_ERROR", "Network failure", true),
            // Upstream services
            (r"(?i)\b50[234]\b|service\s+unavailable|bad\s+gateway|upstream", ExternalService, High, "EXTERNAL_SERVICE_UNAVAILABLE", "Upstream service unavailable", true),
            // Data access
            (r"(?i)deadlock|database|\bsql\b|constraint\s+violation|duplicate\s+key", DataAccess, High, "DATA_ACCESS_ERROR", "Database error", true),
            // Configuration
            (r"(?i)missing\s+(config|configuration|env)|invalid\s+configuration|not\s+configured", Configuration, Critical, "CONFIGURATION_ERROR", "Configuration error", false),
            // Validation and business rules
            (r"(?i)\b(400|422)\b|invalid\s+(request|input|argument)|validation\s+(failed|error)", Validation, Low, "VALIDATION_FAILED", "Invalid input", false),
            (r"(?i)\b404\b|not\s+found", Business, Low, "NOT_FOUND", "Resource not found", false),
            // Generic crash signatures
            (r"(?i)panic|segmentation\s+fault|stack\s+overflow|null\s+pointer", System, Critical, "SYSTEM_FAILURE", "Process level failure", false),
        ];

        table
            .into_iter()
            .filter_map(|(pattern, error_type, severity, code, description, retryable)| {
                match ErrorPattern::new(pattern, error_type, severity, code, description) {
                    Ok(p) if retryable => Some(p.retryable()),
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!(pattern, error = %e, "Skipping invalid built-in pattern");
                        None
                    }
                }
            })
            .collect()
    }
}

impl Component for PatternClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

impl Classifier for PatternClassifier {
    fn applies_to(&self, error: &RaisedError, _context: &ErrorContext) -> bool {
        let text = error.searchable_text();
        self.patterns.iter().any(|p| p.matches(&text))
    }

    fn classify(
        &self,
        error: &RaisedError,
        _context: &ErrorContext,
    ) -> ComponentResult<ErrorClassification> {
        let text = error.searchable_text();
        self.find_match(&text)
            .map(|(pattern, matched)| pattern.to_classification(error, matched))
            .ok_or_else(|| ComponentError::Rejected("no pattern matched".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorContextFragment;

    fn ctx() -> ErrorContext {
        ErrorContext::from_fragment(ErrorContextFragment::default())
    }

    fn classify(message: &str) -> Option<ErrorClassification> {
        let classifier = PatternClassifier::new();
        let error = RaisedError::message(message);
        if !classifier.applies_to(&error, &ctx()) {
            return None;
        }
        classifier.classify(&error, &ctx()).ok()
    }

    // =========================================================================
    // Built-in patterns
    // =========================================================================

    #[test]
    fn test_default_patterns_all_compile() {
        assert_eq!(PatternClassifier::new().patterns().len(), 16);
    }

    #[test]
    fn test_rate_limit_is_retryable_resource_exhaustion() {
        for msg in ["HTTP 429", "Rate limit hit", "rate-limit exceeded", "Too Many Requests"] {
            let c = classify(msg).unwrap();
            assert_eq!(c.error_type, ErrorType::ResourceExhausted, "{msg}");
            assert_eq!(c.code, "RATE_LIMITED");
            assert!(c.retryable);
            assert!(c.recoverable);
        }
    }

    #[test]
    fn test_authentication_errors() {
        let c = classify("Authentication failed for user").unwrap();
        assert_eq!(c.error_type, ErrorType::Authentication);
        assert_eq!(c.severity, Severity::High);
        assert!(!c.retryable);

        let c = classify("invalid api key supplied").unwrap();
        assert_eq!(c.code, "INVALID_CREDENTIALS");
    }

    #[test]
    fn test_authorization_errors() {
        let c = classify("403 Forbidden").unwrap();
        assert_eq!(c.error_type, ErrorType::Authorization);
        assert_eq!(c.code, "ACCESS_DENIED");
    }

    #[test]
    fn test_timeout_and_network() {
        let c = classify("request timed out after 30s").unwrap();
        assert_eq!(c.error_type, ErrorType::Timeout);
        assert!(c.retryable);

        let c = classify("connection refused (os error 111)").unwrap();
        assert_eq!(c.error_type, ErrorType::Network);
        assert_eq!(c.code, "CONNECTION_FAILED");
    }

    #[test]
    fn test_external_service_and_data_access() {
        assert_eq!(
            classify("upstream returned 503").unwrap().error_type,
            ErrorType::ExternalService
        );
        assert_eq!(
            classify("deadlock detected").unwrap().error_type,
            ErrorType::DataAccess
        );
    }

    #[test]
    fn test_validation_and_not_found() {
        let c = classify("invalid input: email").unwrap();
        assert_eq!(c.error_type, ErrorType::Validation);
        assert_eq!(c.severity, Severity::Low);
        assert!(!c.recoverable);

        let c = classify("order 42 not found").unwrap();
        assert_eq!(c.error_type, ErrorType::Business);
        assert_eq!(c.code, "NOT_FOUND");
    }

    #[test]
    fn test_no_match_does_not_apply() {
        assert!(classify("everything is fine").is_none());
        let classifier = PatternClassifier::new();
        let result = classifier.classify(&RaisedError::message("all good"), &ctx());
        assert!(matches!(result, Err(ComponentError::Rejected(_))));
    }

    #[test]
    fn test_matches_code_and_causes() {
        let classifier = PatternClassifier::new();
        let error = RaisedError::message("request failed").with_cause("connection reset by peer");
        let c = classifier.classify(&error, &ctx()).unwrap();
        assert_eq!(c.error_type, ErrorType::Network);
        assert_eq!(c.message, "request failed");
        assert_eq!(c.metadata["matchedText"], "connection reset");
    }

    // =========================================================================
    // Custom patterns
    // =========================================================================

    #[test]
    fn test_custom_patterns_first_match_wins() {
        let classifier = PatternClassifier::with_patterns(vec![
            ErrorPattern::new(r"payment", ErrorType::Business, Severity::High, "PAYMENT", "Payment")
                .unwrap(),
            ErrorPattern::new(r"declined", ErrorType::Validation, Severity::Low, "DECLINED", "Declined")
                .unwrap()
                .recoverable(),
        ])
        .with_name("billing")
        .with_priority(80);

        assert_eq!(classifier.name(), "billing");
        assert_eq!(classifier.priority(), 80);

        let c = classifier
            .classify(&RaisedError::message("payment declined"), &ctx())
            .unwrap();
        assert_eq!(c.code, "PAYMENT");

        let c = classifier
            .classify(&RaisedError::message("card declined"), &ctx())
            .unwrap();
        assert_eq!(c.code, "DECLINED");
        assert!(c.recoverable);
        assert!(!c.retryable);
    }

    #[test]
    fn test_invalid_regex_is_an_error() {
        let result = ErrorPattern::new(r"(unclosed", ErrorType::System, Severity::Low, "X", "bad");
        assert!(result.is_err());
    }

    #[test]
    fn test_retry_delay_carried_into_classification() {
        let classifier = PatternClassifier::with_patterns(vec![ErrorPattern::new(
            r"busy",
            ErrorType::ExternalService,
            Severity::Medium,
            "BUSY",
            "Busy",
        )
        .unwrap()
        .retryable()
        .with_retry_delay(Duration::from_millis(250))]);

        let c = classifier
            .classify(&RaisedError::message("server busy"), &ctx())
            .unwrap();
        assert_eq!(c.retry_delay, Some(Duration::from_millis(250)));
    }
}
