use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

use super::ErrorHandler;
use crate::error::{ComponentResult, ErrorRecord, ErrorType, StepKind};
use crate::registry::Component;

/// Counter key: classification type and code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccurrenceKey {
    pub error_type: ErrorType,
    pub code: String,
}

impl OccurrenceKey {
    pub fn new(error_type: ErrorType, code: impl Into<String>) -> Self {
        Self {
            error_type,
            code: code.into(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    totals: HashMap<OccurrenceKey, u64>,
    /// Recent occurrence instants per key, oldest first.
    recent: HashMap<OccurrenceKey, VecDeque<Instant>>,
}

/// Counts occurrences per `(type, code)` and flags keys that occur at least
/// `threshold` times inside a sliding `window`.
#[derive(Debug)]
pub struct MonitoringHandler {
    name: String,
    priority: i32,
    threshold: usize,
    window: Duration,
    counters: Mutex<Counters>,
}

impl Default for MonitoringHandler {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(60))
    }
}

impl MonitoringHandler {
    pub const DEFAULT_NAME: &'static str = "monitoring";
    pub const DEFAULT_PRIORITY: i32 = 50;

    pub fn new(threshold: usize, window: Duration) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            priority: Self::DEFAULT_PRIORITY,
            threshold: threshold.max(1),
            window,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Total occurrences of a key since creation.
    pub fn total(&self, key: &OccurrenceKey) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.totals.get(key).copied().unwrap_or(0)
    }

    /// Keys currently at or above the threshold inside the window.
    pub fn breaches(&self) -> Vec<OccurrenceKey> {
        let now = Instant::now();
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<OccurrenceKey> = counters
            .recent
            .iter()
            .filter(|(_, instants)| {
                instants
                    .iter()
                    .filter(|t| now.duration_since(**t) <= self.window)
                    .count()
                    >= self.threshold
            })
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Records one occurrence; returns the in-window count.
    fn observe(&self, key: OccurrenceKey) -> (u64, usize) {
        let now = Instant::now();
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);

        let total = {
            let entry = counters.totals.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        let recent = counters.recent.entry(key).or_default();
        while let Some(oldest) = recent.front() {
            if now.duration_since(*oldest) > self.window {
                recent.pop_front();
            } else {
                break;
            }
        }
        recent.push_back(now);
        (total, recent.len())
    }
}

impl Component for MonitoringHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[async_trait]
impl ErrorHandler for MonitoringHandler {
    fn kind(&self) -> StepKind {
        StepKind::Monitoring
    }

    async fn handle(&self, record: &ErrorRecord) -> ComponentResult<Option<Value>> {
        let c = &record.classification;
        let (total, in_window) = self.observe(OccurrenceKey::new(c.error_type, &c.code));
        let breached = in_window >= self.threshold;

        // Warn only on the occurrence that crosses the threshold.
        if in_window == self.threshold {
            warn!(
                error_type = %c.error_type,
                code = %c.code,
                occurrences = in_window,
                window_secs = self.window.as_secs(),
                "Error rate threshold breached"
            );
        }

        Ok(Some(json!({
            "total": total,
            "inWindow": in_window,
            "thresholdBreached": breached,
        })))
    }
}
