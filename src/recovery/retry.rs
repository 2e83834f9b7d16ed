use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{RecoveryOutcome, RecoveryPolicy, RecoveryStrategy};
use crate::error::{ComponentError, ComponentResult, ErrorRecord};
use crate::registry::Component;

/// The operation a [`RetryRecovery`] re-runs.
///
/// The bus knows nothing about what failed; the application supplies the
/// action (re-sending a message, re-running a job, reconnecting).
#[async_trait]
pub trait RecoverableAction: Send + Sync {
    /// Runs one attempt. `attempt` is 1-based.
    async fn attempt(&self, record: &ErrorRecord, attempt: u32) -> ComponentResult<()>;
}

/// Retries an action with linear backoff for retryable records.
///
/// Attempts come from the classification's `max_retries`, else the policy.
/// The wait after attempt `n` is `delay * n`, capped at `max_delay`.
pub struct RetryRecovery {
    name: String,
    priority: i32,
    action: Arc<dyn RecoverableAction>,
    max_delay: Duration,
}

impl RetryRecovery {
    pub const DEFAULT_PRIORITY: i32 = 100;

    pub fn new(name: impl Into<String>, action: Arc<dyn RecoverableAction>) -> Self {
        Self {
            name: name.into(),
            priority: Self::DEFAULT_PRIORITY,
            action,
            max_delay: Duration::from_secs(60),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn calculate_delay(&self, base_delay: Duration, attempt: u32) -> Duration {
        base_delay.saturating_mul(attempt.max(1)).min(self.max_delay)
    }
}

impl Component for RetryRecovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[async_trait]
impl RecoveryStrategy for RetryRecovery {
    fn can_recover(&self, record: &ErrorRecord) -> bool {
        record.classification.retryable
    }

    async fn recover(
        &self,
        record: &ErrorRecord,
        policy: &RecoveryPolicy,
    ) -> ComponentResult<RecoveryOutcome> {
        let c = &record.classification;
        let max_attempts = c.max_retries.unwrap_or(policy.max_retries);
        let base_delay = c.retry_delay.unwrap_or(policy.retry_delay);

        if max_attempts == 0 {
            return Ok(RecoveryOutcome::not_recovered("retry", 0, "retries disabled"));
        }

        let mut last_error: Option<ComponentError> = None;
        for attempt in 1..=max_attempts {
            match self.action.attempt(record, attempt).await {
                Ok(()) => {
                    info!(error_id = %record.id, attempt, "Retry succeeded");
                    return Ok(RecoveryOutcome::recovered("retry", attempt));
                }
                Err(e) => {
                    debug!(error_id = %record.id, attempt, max_attempts, error = %e, "Retry attempt failed");
                    last_error = Some(e);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.calculate_delay(base_delay, attempt)).await;
                    }
                }
            }
        }

        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        Ok(RecoveryOutcome::not_recovered("retry", max_attempts, detail))
    }
}
