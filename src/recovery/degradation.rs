use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::warn;

use super::{RecoveryOutcome, RecoveryPolicy, RecoveryStrategy, RouteTable};
use crate::error::{ComponentResult, ErrorRecord, ErrorType};
use crate::registry::Component;

/// A feature currently running in degraded mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradedFeature {
    pub feature: String,
    pub reason: String,
    pub error_id: String,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

/// Shared view of degraded features. Clones share state.
///
/// Application code consults it (`is_degraded`) to switch features off.
#[derive(Debug, Clone, Default)]
pub struct DegradationState {
    inner: Arc<RwLock<HashMap<String, DegradedFeature>>>,
}

impl DegradationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `feature` degraded for `ttl`, extending an existing entry.
    pub fn degrade(
        &self,
        feature: impl Into<String>,
        reason: impl Into<String>,
        error_id: impl Into<String>,
        ttl: Duration,
    ) -> DegradedFeature {
        let now = Utc::now();
        let until = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let feature = feature.into();

        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let since = map
            .get(&feature)
            .filter(|existing| existing.until > now)
            .map(|existing| existing.since)
            .unwrap_or(now);
        let entry = DegradedFeature {
            feature: feature.clone(),
            reason: reason.into(),
            error_id: error_id.into(),
            since,
            until,
        };
        map.insert(feature, entry.clone());
        entry
    }

    pub fn is_degraded(&self, feature: &str) -> bool {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(feature).is_some_and(|f| f.until > Utc::now())
    }

    /// Ends degradation early. Returns false if the feature was not degraded.
    pub fn restore(&self, feature: &str) -> bool {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(feature).is_some()
    }

    /// Unexpired entries, sorted by feature name.
    pub fn active(&self) -> Vec<DegradedFeature> {
        let now = Utc::now();
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut active: Vec<DegradedFeature> =
            map.values().filter(|f| f.until > now).cloned().collect();
        active.sort_by(|a, b| a.feature.cmp(&b.feature));
        active
    }

    /// Drops expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = map.len();
        map.retain(|_, f| f.until > now);
        before - map.len()
    }
}

/// Degrades the feature mapped to a record's `(type, code)`.
#[derive(Debug, Clone)]
pub struct DegradationRecovery {
    name: String,
    priority: i32,
    state: DegradationState,
    routes: RouteTable<String>,
    ttl: Duration,
}

impl DegradationRecovery {
    pub const DEFAULT_NAME: &'static str = "degradation";
    pub const DEFAULT_PRIORITY: i32 = 10;

    pub fn new(state: DegradationState) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            priority: Self::DEFAULT_PRIORITY,
            state,
            routes: RouteTable::default(),
            ttl: Duration::from_secs(300),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// How long a feature stays degraded after the last matching record.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn for_type(mut self, error_type: ErrorType, feature: impl Into<String>) -> Self {
        self.routes.insert_type(error_type, feature.into());
        self
    }

    pub fn for_code(
        mut self,
        error_type: ErrorType,
        code: impl Into<String>,
        feature: impl Into<String>,
    ) -> Self {
        self.routes.insert_code(error_type, code, feature.into());
        self
    }

    pub fn state(&self) -> &DegradationState {
        &self.state
    }
}

impl Component for DegradationRecovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[async_trait]
impl RecoveryStrategy for DegradationRecovery {
    fn can_recover(&self, record: &ErrorRecord) -> bool {
        self.routes.lookup(&record.classification).is_some()
    }

    async fn recover(
        &self,
        record: &ErrorRecord,
        _policy: &RecoveryPolicy,
    ) -> ComponentResult<RecoveryOutcome> {
        let Some(feature) = self.routes.lookup(&record.classification) else {
            return Ok(RecoveryOutcome::not_recovered("degrade", 0, "no feature mapped"));
        };

        let entry = self.state.degrade(
            feature.as_str(),
            record.classification.to_string(),
            record.id.as_str(),
            self.ttl,
        );
        warn!(
            error_id = %record.id,
            feature = %entry.feature,
            until = %entry.until.to_rfc3339(),
            "Feature degraded"
        );

        Ok(RecoveryOutcome::recovered(format!("degrade:{}", entry.feature), 1)
            .with_detail(format!("degraded until {}", entry.until.to_rfc3339())))
    }
}
