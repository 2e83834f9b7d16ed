use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::ErrorHandler;
use crate::error::{ComponentResult, ErrorRecord, Severity};
use crate::registry::Component;

/// Emits one structured `tracing` event per record.
///
/// The level follows severity: LOW → info, MEDIUM → warn, HIGH and CRITICAL
/// → error. Records below `min_severity` are logged at debug.
#[derive(Debug, Clone)]
pub struct LoggingHandler {
    name: String,
    priority: i32,
    min_severity: Severity,
}

impl Default for LoggingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingHandler {
    pub const DEFAULT_NAME: &'static str = "logging";
    pub const DEFAULT_PRIORITY: i32 = 100;

    pub fn new() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            priority: Self::DEFAULT_PRIORITY,
            min_severity: Severity::Low,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }
}

impl Component for LoggingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[async_trait]
impl ErrorHandler for LoggingHandler {
    async fn handle(&self, record: &ErrorRecord) -> ComponentResult<Option<Value>> {
        let c = &record.classification;
        let tenant_id = record.tenant_id().unwrap_or("-");
        let source = record
            .context
            .source
            .as_ref()
            .map(|s| s.label())
            .unwrap_or("unknown");

        let level = if c.severity < self.min_severity {
            debug!(
                error_id = %record.id,
                tenant_id,
                error_type = %c.error_type,
                severity = %c.severity,
                code = %c.code,
                "{}",
                c.message
            );
            "debug"
        } else {
            match c.severity {
                Severity::Low => {
                    info!(error_id = %record.id, tenant_id, source, error_type = %c.error_type, severity = %c.severity, code = %c.code, "{}", c.message);
                    "info"
                }
                Severity::Medium => {
                    warn!(error_id = %record.id, tenant_id, source, error_type = %c.error_type, severity = %c.severity, code = %c.code, "{}", c.message);
                    "warn"
                }
                Severity::High | Severity::Critical => {
                    error!(
                        error_id = %record.id,
                        tenant_id,
                        source,
                        error_type = %c.error_type,
                        severity = %c.severity,
                        code = %c.code,
                        original = %record.original_error,
                        causes = ?record.original_error.causes,
                        "{}",
                        c.message
                    );
                    "error"
                }
            }
        };

        Ok(Some(json!({ "level": level })))
    }
}
