//! Drain tick: handle → notify → recover for each popped record.

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::{lock, read, BusInner};
use crate::classify::panic_message;
use crate::config::{millis, BusConfig};
use crate::error::{
    BusError, ComponentError, ComponentResult, ErrorRecord, ErrorStatus, ProcessingStep, StepKind,
};
use crate::handlers::is_included;
use crate::recovery::RecoveryPolicy;

/// Summary of one drain tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Records popped from the queue.
    pub processed: usize,
    /// Records that ended HANDLED.
    pub handled: usize,
    /// Records that ended FAILED.
    pub failed: usize,
    /// Records still queued after the tick.
    pub remaining: usize,
    /// Retained records dropped by the retention policy.
    pub purged: usize,
    /// True when the bus was disabled and nothing was popped.
    pub skipped: bool,
    #[serde(rename = "durationMs", with = "millis")]
    pub duration: Duration,
}

/// Runs one stage invocation with a deadline, turning panics into errors.
async fn invoke<T, F>(timeout: Duration, call: F) -> ComponentResult<T>
where
    F: Future<Output = ComponentResult<T>>,
{
    match tokio::time::timeout(timeout, AssertUnwindSafe(call).catch_unwind()).await {
        Ok(Ok(result)) => result,
        Ok(Err(payload)) => Err(ComponentError::Panicked(panic_message(&payload))),
        Err(_) => Err(ComponentError::Timeout(timeout)),
    }
}

/// Evaluates an opt-in predicate; a panicking predicate yields its message.
fn check<P>(predicate: P) -> Result<bool, String>
where
    P: FnOnce() -> bool,
{
    panic::catch_unwind(AssertUnwindSafe(predicate)).map_err(|payload| panic_message(&payload))
}

impl BusInner {
    /// Scheduled tick. Returns `None` when a drain is already running.
    pub(super) async fn scheduled_tick(&self) -> Option<DrainReport> {
        let Ok(_guard) = self.drain_guard.try_lock() else {
            debug!("Previous drain still running, skipping tick");
            return None;
        };

        let report = self.drain_locked().await;
        if report.processed > 0 {
            debug!(
                processed = report.processed,
                handled = report.handled,
                failed = report.failed,
                remaining = report.remaining,
                "Drain tick finished"
            );
        }
        Some(report)
    }

    /// One drain tick. Callers must hold `drain_guard`.
    pub(super) async fn drain_locked(&self) -> DrainReport {
        let started = Instant::now();
        let config = read(&self.config).clone();
        let mut report = DrainReport::default();

        if !config.enabled {
            report.skipped = true;
        } else {
            let batch: Vec<ErrorRecord> = {
                let mut queue = lock(&self.queue);
                let n = config.batch_size.min(queue.len());
                let batch: Vec<ErrorRecord> = queue.drain(..n).collect();
                // Published before the queue lock drops so lookups never miss.
                let mut in_flight = lock(&self.in_flight);
                for record in &batch {
                    in_flight.insert(record.id.clone(), record.clone());
                }
                batch
            };

            for mut record in batch {
                let record_started = Instant::now();
                let outcome = AssertUnwindSafe(self.process_record(&mut record, &config))
                    .catch_unwind()
                    .await;

                let success = match outcome {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        error!(error_id = %record.id, error = %e, "Record processing failed");
                        false
                    }
                    Err(payload) => {
                        error!(
                            error_id = %record.id,
                            panic = %panic_message(&payload),
                            "Record processing panicked"
                        );
                        false
                    }
                };
                if !success {
                    record.mark_failed();
                }

                report.processed += 1;
                if success {
                    report.handled += 1;
                } else {
                    report.failed += 1;
                }
                self.stats.record_processed(success, record_started.elapsed());
                let id = record.id.clone();
                lock(&self.retained).insert(record);
                lock(&self.in_flight).remove(&id);
            }
        }

        report.purged = lock(&self.retained).purge(
            config.retention_time,
            config.max_retained_records,
            Utc::now(),
        );
        report.remaining = lock(&self.queue).len();
        report.duration = started.elapsed();
        if report.purged > 0 {
            debug!(purged = report.purged, "Expired records purged");
        }
        report
    }

    async fn process_record(
        &self,
        record: &mut ErrorRecord,
        config: &BusConfig,
    ) -> Result<(), BusError> {
        record.transition(ErrorStatus::Processing)?;

        self.run_handlers(record, config).await;

        if config.enable_notification {
            self.run_notifiers(record, config).await;
        }

        if config.enable_recovery && record.classification.recoverable {
            self.run_recovery(record, config).await;
        }

        record.transition(ErrorStatus::Handled)?;
        Ok(())
    }

    async fn run_handlers(&self, record: &mut ErrorRecord, config: &BusConfig) {
        let handlers = read(&self.handlers).ordered();

        for handler in handlers {
            let kind = handler.kind();
            if kind == StepKind::Monitoring && !config.enable_monitoring {
                continue;
            }

            match check(|| is_included(handler.as_ref(), &*record)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(panic) => {
                    warn!(error_id = %record.id, component = handler.name(), %panic, "Handler predicate panicked");
                    record.push_step(ProcessingStep::failed(
                        handler.name(),
                        kind,
                        ComponentError::Panicked(panic).to_string(),
                        Duration::ZERO,
                    ));
                    continue;
                }
            }

            let started = Instant::now();
            let result = invoke(config.processing_timeout, handler.handle(record)).await;
            let elapsed = started.elapsed();

            let step = match result {
                Ok(payload) => ProcessingStep::success(handler.name(), kind, payload, elapsed),
                Err(e) => {
                    warn!(error_id = %record.id, component = handler.name(), error = %e, "Handler failed");
                    ProcessingStep::failed(handler.name(), kind, e.to_string(), elapsed)
                }
            };
            record.push_step(step);
        }
    }

    async fn run_notifiers(&self, record: &mut ErrorRecord, config: &BusConfig) {
        let notifiers = read(&self.notifiers).ordered();

        for notifier in notifiers {
            match check(|| notifier.should_notify(&*record)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(panic) => {
                    warn!(error_id = %record.id, component = notifier.name(), %panic, "Notifier predicate panicked");
                    record.push_step(ProcessingStep::failed(
                        notifier.name(),
                        StepKind::Notification,
                        ComponentError::Panicked(panic).to_string(),
                        Duration::ZERO,
                    ));
                    continue;
                }
            }

            let started = Instant::now();
            let result = invoke(config.processing_timeout, notifier.notify(record)).await;
            let elapsed = started.elapsed();

            self.stats.record_notification(result.is_ok());
            let step = match result {
                Ok(receipt) => ProcessingStep::success(
                    notifier.name(),
                    StepKind::Notification,
                    serde_json::to_value(&receipt).ok(),
                    elapsed,
                ),
                Err(e) => {
                    warn!(error_id = %record.id, component = notifier.name(), error = %e, "Notifier failed");
                    ProcessingStep::failed(
                        notifier.name(),
                        StepKind::Notification,
                        e.to_string(),
                        elapsed,
                    )
                }
            };
            record.push_step(step);
        }
    }

    async fn run_recovery(&self, record: &mut ErrorRecord, config: &BusConfig) {
        let strategies = read(&self.strategies).ordered();
        let policy = RecoveryPolicy::from(config);

        for strategy in strategies {
            match check(|| strategy.can_recover(&*record)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(panic) => {
                    warn!(error_id = %record.id, component = strategy.name(), %panic, "Recovery predicate panicked");
                    record.push_step(ProcessingStep::failed(
                        strategy.name(),
                        StepKind::Recovery,
                        ComponentError::Panicked(panic).to_string(),
                        Duration::ZERO,
                    ));
                    continue;
                }
            }

            let started = Instant::now();
            let result = invoke(config.processing_timeout, strategy.recover(record, &policy)).await;
            let elapsed = started.elapsed();

            let step = match result {
                Ok(outcome) if outcome.recovered => {
                    self.stats.record_recovery(true);
                    info!(error_id = %record.id, component = strategy.name(), action = %outcome.action, "Recovered");
                    ProcessingStep::success(
                        strategy.name(),
                        StepKind::Recovery,
                        serde_json::to_value(&outcome).ok(),
                        elapsed,
                    )
                }
                Ok(outcome) => {
                    self.stats.record_recovery(false);
                    let reason = outcome
                        .detail
                        .clone()
                        .unwrap_or_else(|| "not recovered".to_string());
                    let mut step =
                        ProcessingStep::failed(strategy.name(), StepKind::Recovery, reason, elapsed);
                    step.result = serde_json::to_value(&outcome).ok();
                    step
                }
                Err(e) => {
                    self.stats.record_recovery(false);
                    warn!(error_id = %record.id, component = strategy.name(), error = %e, "Recovery failed");
                    ProcessingStep::failed(strategy.name(), StepKind::Recovery, e.to_string(), elapsed)
                }
            };
            record.push_step(step);
        }
    }
}
