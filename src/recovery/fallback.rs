use async_trait::async_trait;
use tracing::info;

use super::{RecoveryOutcome, RecoveryPolicy, RecoveryStrategy, RouteTable};
use crate::error::{ComponentResult, ErrorRecord, ErrorType};
use crate::registry::Component;

/// Selects a named fallback (cached data, a default value, an alternative
/// service) for a record's `(type, code)`.
#[derive(Debug, Clone)]
pub struct FallbackRecovery {
    name: String,
    priority: i32,
    routes: RouteTable<String>,
}

impl Default for FallbackRecovery {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackRecovery {
    pub const DEFAULT_NAME: &'static str = "fallback";
    pub const DEFAULT_PRIORITY: i32 = 50;

    pub fn new() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            priority: Self::DEFAULT_PRIORITY,
            routes: RouteTable::default(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Fallback for every code of `error_type`.
    pub fn for_type(mut self, error_type: ErrorType, fallback: impl Into<String>) -> Self {
        self.routes.insert_type(error_type, fallback.into());
        self
    }

    /// Fallback for one `(type, code)` pair. Takes precedence over `for_type`.
    pub fn for_code(
        mut self,
        error_type: ErrorType,
        code: impl Into<String>,
        fallback: impl Into<String>,
    ) -> Self {
        self.routes.insert_code(error_type, code, fallback.into());
        self
    }

    /// The fallback selected for a record, if any.
    pub fn select(&self, record: &ErrorRecord) -> Option<&str> {
        self.routes.lookup(&record.classification).map(String::as_str)
    }
}

impl Component for FallbackRecovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[async_trait]
impl RecoveryStrategy for FallbackRecovery {
    fn can_recover(&self, record: &ErrorRecord) -> bool {
        self.select(record).is_some()
    }

    async fn recover(
        &self,
        record: &ErrorRecord,
        _policy: &RecoveryPolicy,
    ) -> ComponentResult<RecoveryOutcome> {
        match self.select(record) {
            Some(fallback) => {
                info!(error_id = %record.id, fallback, "Fallback selected");
                Ok(RecoveryOutcome::recovered(format!("fallback:{}", fallback), 1))
            }
            None => Ok(RecoveryOutcome::not_recovered(
                "fallback",
                0,
                format!("no fallback for {}", record.classification.error_type),
            )),
        }
    }
}
