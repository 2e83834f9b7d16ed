//! Recovery stage.
//!
//! Strategies run only for recoverable records. Every strategy whose
//! `can_recover` holds is invoked; recovery is not first-match-wins.

mod degradation;
mod fallback;
mod retry;

pub use degradation::{DegradationRecovery, DegradationState, DegradedFeature};
pub use fallback::FallbackRecovery;
pub use retry::{RecoverableAction, RetryRecovery};

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::BusConfig;
use crate::error::{ComponentResult, ErrorClassification, ErrorRecord, ErrorType};
use crate::registry::Component;

/// Bus-wide retry defaults handed to every strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl From<&BusConfig> for RecoveryPolicy {
    fn from(config: &BusConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        }
    }
}

/// What a strategy did for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryOutcome {
    pub recovered: bool,
    /// What was done, e.g. `retry` or `fallback:cached-prices`.
    pub action: String,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RecoveryOutcome {
    pub fn recovered(action: impl Into<String>, attempts: u32) -> Self {
        Self {
            recovered: true,
            action: action.into(),
            attempts,
            detail: None,
        }
    }

    pub fn not_recovered(action: impl Into<String>, attempts: u32, detail: impl Into<String>) -> Self {
        Self {
            recovered: false,
            action: action.into(),
            attempts,
            detail: Some(detail.into()),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A recovery strategy.
#[async_trait]
pub trait RecoveryStrategy: Component {
    fn can_recover(&self, record: &ErrorRecord) -> bool;

    async fn recover(
        &self,
        record: &ErrorRecord,
        policy: &RecoveryPolicy,
    ) -> ComponentResult<RecoveryOutcome>;
}

/// `(type, code)` lookup table: an exact code entry wins over a type-wide one.
#[derive(Debug, Clone)]
pub struct RouteTable<V> {
    exact: HashMap<(ErrorType, String), V>,
    by_type: HashMap<ErrorType, V>,
}

impl<V> Default for RouteTable<V> {
    fn default() -> Self {
        Self {
            exact: HashMap::new(),
            by_type: HashMap::new(),
        }
    }
}

impl<V> RouteTable<V> {
    pub fn insert_code(&mut self, error_type: ErrorType, code: impl Into<String>, value: V) {
        self.exact.insert((error_type, code.into()), value);
    }

    pub fn insert_type(&mut self, error_type: ErrorType, value: V) {
        self.by_type.insert(error_type, value);
    }

    pub fn lookup(&self, classification: &ErrorClassification) -> Option<&V> {
        self.exact
            .get(&(classification.error_type, classification.code.clone()))
            .or_else(|| self.by_type.get(&classification.error_type))
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.by_type.is_empty()
    }
}
