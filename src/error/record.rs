//! Error records and their processing history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::{BusError, ErrorClassification, ErrorContext, RaisedError};
use crate::config::millis;

/// Lifecycle of a record: `Pending -> Processing -> {Handled | Failed}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorStatus {
    #[default]
    Pending,
    Processing,
    Handled,
    Failed,
}

impl ErrorStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ErrorStatus::Handled | ErrorStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    pub fn can_transition_to(&self, next: ErrorStatus) -> bool {
        matches!(
            (self, next),
            (ErrorStatus::Pending, ErrorStatus::Processing)
                | (ErrorStatus::Processing, ErrorStatus::Handled)
                | (ErrorStatus::Processing, ErrorStatus::Failed)
        )
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorStatus::Pending => "PENDING",
            ErrorStatus::Processing => "PROCESSING",
            ErrorStatus::Handled => "HANDLED",
            ErrorStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Which pipeline stage produced a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    Classification,
    Notification,
    Recovery,
    Logging,
    Monitoring,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepOutcome {
    Success,
    Failed,
    Skipped,
}

/// One pipeline-stage invocation. Never modified after it is appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStep {
    pub id: String,
    /// Name of the component that ran.
    pub name: String,
    pub kind: StepKind,
    pub executed_at: DateTime<Utc>,
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "durationMs", with = "millis")]
    pub duration: Duration,
}

impl ProcessingStep {
    fn new(name: impl Into<String>, kind: StepKind, outcome: StepOutcome, duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            executed_at: Utc::now(),
            outcome,
            result: None,
            error: None,
            duration,
        }
    }

    pub fn success(
        name: impl Into<String>,
        kind: StepKind,
        result: Option<Value>,
        duration: Duration,
    ) -> Self {
        let mut step = Self::new(name, kind, StepOutcome::Success, duration);
        step.result = result;
        step
    }

    pub fn failed(
        name: impl Into<String>,
        kind: StepKind,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        let mut step = Self::new(name, kind, StepOutcome::Failed, duration);
        step.error = Some(error.into());
        step
    }

    pub fn skipped(name: impl Into<String>, kind: StepKind, reason: impl Into<String>) -> Self {
        let mut step = Self::new(name, kind, StepOutcome::Skipped, Duration::ZERO);
        step.result = Some(Value::from(reason.into()));
        step
    }

    pub fn is_success(&self) -> bool {
        self.outcome == StepOutcome::Success
    }
}

/// A classified error travelling through the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub id: String,
    pub classification: ErrorClassification,
    pub context: ErrorContext,
    pub original_error: RaisedError,
    status: ErrorStatus,
    processing_history: Vec<ProcessingStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ErrorRecord {
    /// Creates a pending record. The classification is fixed from here on.
    pub fn new(
        original_error: RaisedError,
        context: ErrorContext,
        classification: ErrorClassification,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            classification,
            context,
            original_error,
            status: ErrorStatus::Pending,
            processing_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    /// Steps in execution order.
    pub fn processing_history(&self) -> &[ProcessingStep] {
        &self.processing_history
    }

    /// Steps of one kind, in execution order.
    pub fn steps_of(&self, kind: StepKind) -> impl Iterator<Item = &ProcessingStep> {
        self.processing_history.iter().filter(move |s| s.kind == kind)
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.context.tenant_id.as_deref()
    }

    pub(crate) fn push_step(&mut self, step: ProcessingStep) {
        self.processing_history.push(step);
        self.updated_at = Utc::now();
    }

    pub(crate) fn transition(&mut self, next: ErrorStatus) -> Result<(), BusError> {
        if !self.status.can_transition_to(next) {
            return Err(BusError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Forces a terminal `Failed` status after an orchestration failure.
    ///
    /// Terminal records are left alone.
    pub(crate) fn mark_failed(&mut self) {
        if !self.status.is_terminal() {
            self.status = ErrorStatus::Failed;
            self.updated_at = Utc::now();
        }
    }
}
