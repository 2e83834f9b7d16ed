//! Handler stage.
//!
//! Every handler whose opt-in predicate holds runs for every drained record,
//! in descending priority. Priority controls order, the predicates control
//! inclusion.

mod alerting;
mod logging;
mod monitoring;

pub use alerting::{ActiveAlert, AlertingHandler};
pub use logging::LoggingHandler;
pub use monitoring::{MonitoringHandler, OccurrenceKey};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ComponentResult, ErrorRecord, ErrorType, StepKind};
use crate::registry::Component;

/// A subscriber that reacts to drained error records.
#[async_trait]
pub trait ErrorHandler: Component {
    /// Kind recorded on this handler's processing steps.
    ///
    /// `Monitoring` handlers are skipped while monitoring is disabled.
    fn kind(&self) -> StepKind {
        StepKind::Logging
    }

    /// Opt-in predicate over the whole record.
    fn should_handle(&self, _record: &ErrorRecord) -> bool {
        true
    }

    /// Capability check over the classification type.
    fn can_handle(&self, _error_type: ErrorType) -> bool {
        true
    }

    /// Handles the record, returning an optional payload for the audit step.
    async fn handle(&self, record: &ErrorRecord) -> ComponentResult<Option<Value>>;
}

/// Whether `handler` takes part in processing `record`.
pub(crate) fn is_included(handler: &dyn ErrorHandler, record: &ErrorRecord) -> bool {
    handler.should_handle(record) && handler.can_handle(record.classification.error_type)
}
