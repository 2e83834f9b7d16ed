//! Channel-neutral alert rendered from an error record.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::{ErrorRecord, ErrorType, Severity};

/// What every notifier renders: one flat view of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub error_id: String,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub category: String,
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl Alert {
    pub fn from_record(record: &ErrorRecord) -> Self {
        let c = &record.classification;
        Self {
            error_id: record.id.clone(),
            error_type: c.error_type,
            severity: c.severity,
            code: c.code.clone(),
            message: c.message.clone(),
            category: c.category.clone(),
            recoverable: c.recoverable,
            tenant_id: record.context.tenant_id.clone(),
            user_id: record.context.user_id.clone(),
            correlation_id: record.context.correlation_id.clone(),
            source: record.context.source.as_ref().map(|s| s.to_string()),
            occurred_at: record.context.timestamp,
        }
    }

    /// One-line title, e.g. `[CRITICAL] DATA_ACCESS: DB_DOWN`.
    pub fn title(&self) -> String {
        format!("[{}] {}: {}", self.severity, self.error_type, self.code)
    }

    /// Hex color used by chat attachments.
    pub fn color(&self) -> &'static str {
        match self.severity {
            Severity::Low => "#439FE0",
            Severity::Medium => "#E0A800",
            Severity::High => "#E05A00",
            Severity::Critical => "#D00000",
        }
    }

    /// Plain-text body shared by chat and email.
    pub fn body(&self) -> String {
        let mut lines = vec![
            self.message.clone(),
            String::new(),
            format!("Error ID: {}", self.error_id),
            format!("Category: {}", self.category),
            format!("Recoverable: {}", if self.recoverable { "yes" } else { "no" }),
            format!("Occurred at: {}", self.occurred_at.to_rfc3339()),
        ];
        if let Some(tenant) = &self.tenant_id {
            lines.push(format!("Tenant: {}", tenant));
        }
        if let Some(user) = &self.user_id {
            lines.push(format!("User: {}", user));
        }
        if let Some(correlation) = &self.correlation_id {
            lines.push(format!("Correlation ID: {}", correlation));
        }
        if let Some(source) = &self.source {
            lines.push(format!("Source: {}", source));
        }
        lines.join("\n")
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.title(), self.message)
    }
}
