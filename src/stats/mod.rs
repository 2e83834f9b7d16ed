//! Error statistics for the bus.
//!
//! Counters are updated from two places: the publish path (dimension
//! counters) and the drain tick (processing, recovery and notification
//! totals). Both go through the same [`StatisticsCollector`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::config::millis;
use crate::error::{ErrorRecord, ErrorType, Severity};

/// Totals for records that went through a drain tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStats {
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    /// Rolling mean over successfully processed records.
    #[serde(rename = "averageDurationMs", with = "millis")]
    pub average_duration: Duration,
}

impl ProcessingStats {
    fn add_sample(&mut self, duration: Duration) {
        // `successful` already counts this sample.
        let n = self.successful.max(1) as f64;
        let mean = self.average_duration.as_secs_f64();
        let next = mean + (duration.as_secs_f64() - mean) / n;
        self.average_duration = Duration::from_secs_f64(next.max(0.0));
    }
}

/// Totals for one outbound stage (recovery or notification).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStats {
    /// Invocations, successful or not.
    pub attempts: u64,
    pub successful: u64,
    pub failed: u64,
    /// `successful / attempts`, 0.0 before the first attempt.
    pub success_rate: f64,
}

impl StageStats {
    fn record(&mut self, success: bool) {
        self.attempts += 1;
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.success_rate = self.successful as f64 / self.attempts as f64;
    }
}

/// Snapshot of the bus counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_errors: u64,
    pub errors_by_type: BTreeMap<ErrorType, u64>,
    pub errors_by_severity: BTreeMap<Severity, u64>,
    pub errors_by_tenant: BTreeMap<String, u64>,
    pub errors_by_user: BTreeMap<String, u64>,
    pub processing: ProcessingStats,
    pub recovery: StageStats,
    /// `attempts` counts notifications sent.
    pub notification: StageStats,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Statistics {
    /// Count for one error type, 0 if never seen.
    pub fn count_for_type(&self, error_type: ErrorType) -> u64 {
        self.errors_by_type.get(&error_type).copied().unwrap_or(0)
    }

    pub fn count_for_severity(&self, severity: Severity) -> u64 {
        self.errors_by_severity.get(&severity).copied().unwrap_or(0)
    }

    pub fn count_for_tenant(&self, tenant_id: &str) -> u64 {
        self.errors_by_tenant.get(tenant_id).copied().unwrap_or(0)
    }

    /// Most frequent error type, ties resolved by declaration order.
    pub fn most_common_type(&self) -> Option<ErrorType> {
        self.errors_by_type
            .iter()
            .max_by(|(ta, a), (tb, b)| a.cmp(b).then(tb.cmp(ta)))
            .map(|(t, _)| *t)
    }

    fn touch(&mut self) {
        self.last_updated = Some(Utc::now());
    }
}

/// Thread-safe statistics shared by the publish path and the drain tick.
#[derive(Debug, Clone, Default)]
pub struct StatisticsCollector {
    inner: Arc<RwLock<Statistics>>,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Statistics> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> RwLockReadGuard<'_, Statistics> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts a freshly published record in every dimension.
    pub fn record_published(&self, record: &ErrorRecord) {
        let mut stats = self.write();
        stats.total_errors += 1;
        *stats
            .errors_by_type
            .entry(record.classification.error_type)
            .or_insert(0) += 1;
        *stats
            .errors_by_severity
            .entry(record.classification.severity)
            .or_insert(0) += 1;
        if let Some(tenant) = &record.context.tenant_id {
            *stats.errors_by_tenant.entry(tenant.clone()).or_insert(0) += 1;
        }
        if let Some(user) = &record.context.user_id {
            *stats.errors_by_user.entry(user.clone()).or_insert(0) += 1;
        }
        stats.touch();
    }

    /// Counts a record that finished a drain tick.
    pub fn record_processed(&self, success: bool, duration: Duration) {
        let mut stats = self.write();
        stats.processing.processed += 1;
        if success {
            stats.processing.successful += 1;
            stats.processing.add_sample(duration);
        } else {
            stats.processing.failed += 1;
        }
        stats.touch();
    }

    pub fn record_recovery(&self, success: bool) {
        let mut stats = self.write();
        stats.recovery.record(success);
        stats.touch();
    }

    pub fn record_notification(&self, success: bool) {
        let mut stats = self.write();
        stats.notification.record(success);
        stats.touch();
    }

    /// Returns a copy of the current counters.
    pub fn snapshot(&self) -> Statistics {
        self.read().clone()
    }

    /// Clears every counter.
    pub fn reset(&self) {
        *self.write() = Statistics::default();
    }
}
