use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

use super::ErrorHandler;
use crate::error::{ComponentResult, ErrorRecord, ErrorType, Severity};
use crate::registry::Component;

/// An alert raised for a severe error, deduplicated by `(type, code)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAlert {
    pub error_type: ErrorType,
    pub code: String,
    pub severity: Severity,
    pub message: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrences: u64,
    /// Most recent record that hit this alert.
    pub last_error_id: String,
}

/// Keeps a bounded list of active alerts for HIGH and CRITICAL records.
///
/// A record whose `(type, code)` matches an alert seen within `dedup_window`
/// bumps that alert instead of opening a new one. When the list is full the
/// oldest alert is dropped.
#[derive(Debug)]
pub struct AlertingHandler {
    name: String,
    priority: i32,
    min_severity: Severity,
    dedup_window: Duration,
    capacity: usize,
    alerts: Mutex<VecDeque<ActiveAlert>>,
}

impl Default for AlertingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertingHandler {
    pub const DEFAULT_NAME: &'static str = "alerting";
    pub const DEFAULT_PRIORITY: i32 = 10;
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            priority: Self::DEFAULT_PRIORITY,
            min_severity: Severity::High,
            dedup_window: Duration::from_secs(300),
            capacity: Self::DEFAULT_CAPACITY,
            alerts: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Active alerts, oldest first.
    pub fn active_alerts(&self) -> Vec<ActiveAlert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Drops every alert for `(error_type, code)`. Returns how many were removed.
    pub fn acknowledge(&self, error_type: ErrorType, code: &str) -> usize {
        let mut alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
        let before = alerts.len();
        alerts.retain(|a| !(a.error_type == error_type && a.code == code));
        before - alerts.len()
    }

    fn window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.dedup_window).unwrap_or(chrono::Duration::MAX)
    }
}

impl Component for AlertingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[async_trait]
impl ErrorHandler for AlertingHandler {
    fn should_handle(&self, record: &ErrorRecord) -> bool {
        record.classification.is_at_least(self.min_severity)
    }

    async fn handle(&self, record: &ErrorRecord) -> ComponentResult<Option<Value>> {
        let c = &record.classification;
        let now = Utc::now();
        let window = self.window();
        let mut alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = alerts.iter_mut().rev().find(|a| {
            a.error_type == c.error_type && a.code == c.code && now - a.last_seen <= window
        }) {
            existing.occurrences += 1;
            existing.last_seen = now;
            existing.last_error_id = record.id.clone();
            existing.severity = existing.severity.max(c.severity);
            return Ok(Some(json!({
                "deduplicated": true,
                "occurrences": existing.occurrences,
            })));
        }

        if alerts.len() >= self.capacity {
            alerts.pop_front();
        }
        alerts.push_back(ActiveAlert {
            error_type: c.error_type,
            code: c.code.clone(),
            severity: c.severity,
            message: c.message.clone(),
            first_seen: now,
            last_seen: now,
            occurrences: 1,
            last_error_id: record.id.clone(),
        });
        info!(
            error_id = %record.id,
            error_type = %c.error_type,
            code = %c.code,
            severity = %c.severity,
            "Alert opened"
        );

        Ok(Some(json!({ "deduplicated": false, "occurrences": 1 })))
    }
}
