//! Classification stage.
//!
//! Classifiers turn a raised error and its context into an
//! [`ErrorClassification`]. They are consulted in descending priority (ties in
//! registration order); the first one that applies and succeeds wins. A
//! classifier that fails or panics is logged and skipped. When nothing
//! applies the record gets [`ErrorClassification::unknown`].

mod pattern;
mod status;

pub use pattern::{ErrorPattern, PatternClassifier};
pub use status::StatusCodeClassifier;

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, warn};

use crate::error::{
    ComponentError, ComponentResult, ErrorClassification, ErrorContext, ProcessingStep,
    RaisedError, StepKind,
};
use crate::registry::{Component, Registry};

/// Step name used when no classifier produced the classification.
pub const DEFAULT_CLASSIFIER: &str = "default";

/// A pluggable classifier.
///
/// Classification runs synchronously on the publishing call site, so
/// implementations must be cheap and must not block.
pub trait Classifier: Component {
    /// Whether this classifier wants to classify the error.
    fn applies_to(&self, _error: &RaisedError, _context: &ErrorContext) -> bool {
        true
    }

    fn classify(
        &self,
        error: &RaisedError,
        context: &ErrorContext,
    ) -> ComponentResult<ErrorClassification>;
}

/// Result of running the classifier chain.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub classification: ErrorClassification,
    /// Winning classifier, `None` if the default was used.
    pub classifier: Option<String>,
    /// Classifiers that applied but failed, with their error.
    pub failures: Vec<(String, ComponentError)>,
    pub elapsed: Duration,
}

impl ClassificationResult {
    /// Audit step describing this result.
    pub fn to_step(&self) -> ProcessingStep {
        match &self.classifier {
            Some(name) => ProcessingStep::success(
                name.clone(),
                StepKind::Classification,
                Some(json!({
                    "type": self.classification.error_type,
                    "severity": self.classification.severity,
                    "code": self.classification.code,
                })),
                self.elapsed,
            ),
            None => ProcessingStep::skipped(
                DEFAULT_CLASSIFIER,
                StepKind::Classification,
                "no classifier applied; default classification used",
            ),
        }
    }
}

/// Runs the classifier chain over `registry`.
pub fn classify(
    registry: &Registry<dyn Classifier>,
    error: &RaisedError,
    context: &ErrorContext,
) -> ClassificationResult {
    let started = Instant::now();
    let mut failures = Vec::new();

    for classifier in registry.ordered() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            classifier
                .applies_to(error, context)
                .then(|| classifier.classify(error, context))
        }))
        .unwrap_or_else(|payload| Some(Err(ComponentError::Panicked(panic_message(&payload)))));

        let Some(outcome) = outcome else {
            continue;
        };

        match outcome {
            Ok(classification) => {
                debug!(
                    classifier = classifier.name(),
                    error_type = %classification.error_type,
                    severity = %classification.severity,
                    "Error classified"
                );
                return ClassificationResult {
                    classification,
                    classifier: Some(classifier.name().to_string()),
                    failures,
                    elapsed: started.elapsed(),
                };
            }
            Err(e) => {
                warn!(classifier = classifier.name(), error = %e, "Classifier failed, trying next");
                failures.push((classifier.name().to_string(), e));
            }
        }
    }

    ClassificationResult {
        classification: ErrorClassification::unknown(error.message.clone()),
        classifier: None,
        failures,
        elapsed: started.elapsed(),
    }
}

/// Renders a panic payload caught by `catch_unwind`.
pub(crate) fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
