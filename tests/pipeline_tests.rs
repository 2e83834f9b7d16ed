//! End-to-end tests for the error bus pipeline.
//!
//! The drain tick is driven manually with `ErrorBus::drain`. Buses use an
//! hour-long batch interval so the scheduled tick stays out of the way,
//! except in the tests that exercise the tick itself.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

use faultbus::bus::ErrorBus;
use faultbus::classify::Classifier;
use faultbus::config::{BusConfig, BusConfigPatch};
use faultbus::error::{
    BusError, ComponentError, ComponentResult, ErrorClassification, ErrorContext,
    ErrorContextFragment, ErrorRecord, ErrorStatus, ErrorType, RaisedError, Severity, StepKind,
    StepOutcome,
};
use faultbus::handlers::ErrorHandler;
use faultbus::notify::{ErrorNotifier, NotificationReceipt};
use faultbus::recovery::{RecoveryOutcome, RecoveryPolicy, RecoveryStrategy};
use faultbus::registry::Component;

// ============================================================================
// Test doubles
// ============================================================================

fn test_config() -> BusConfig {
    BusConfig::default().with_batch_interval(Duration::from_secs(3600))
}

fn started_bus(config: BusConfig) -> ErrorBus {
    let bus = assert_ok!(ErrorBus::new(config));
    assert_ok!(bus.start());
    bus
}

/// Classifies everything the same way.
struct FixedClassifier {
    recoverable: bool,
}

impl Component for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }
}

impl Classifier for FixedClassifier {
    fn classify(
        &self,
        error: &RaisedError,
        _context: &ErrorContext,
    ) -> ComponentResult<ErrorClassification> {
        Ok(ErrorClassification::new(
            ErrorType::ExternalService,
            Severity::High,
            "UPSTREAM_DOWN",
            error.message.clone(),
        )
        .with_recoverable(self.recoverable))
    }
}

/// Counts invocations and returns its tag as payload.
struct RecordingHandler {
    name: String,
    priority: i32,
    tag: &'static str,
    calls: Arc<AtomicUsize>,
}

impl RecordingHandler {
    fn new(name: &str, priority: i32) -> Self {
        Self {
            name: name.to_string(),
            priority,
            tag: "recorded",
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn tagged(mut self, tag: &'static str) -> Self {
        self.tag = tag;
        self
    }
}

impl Component for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[async_trait]
impl ErrorHandler for RecordingHandler {
    async fn handle(&self, _record: &ErrorRecord) -> ComponentResult<Option<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(json!({ "tag": self.tag })))
    }
}

struct FailingHandler;

impl Component for FailingHandler {
    fn name(&self) -> &str {
        "failing"
    }

    fn priority(&self) -> i32 {
        100
    }
}

#[async_trait]
impl ErrorHandler for FailingHandler {
    async fn handle(&self, _record: &ErrorRecord) -> ComponentResult<Option<Value>> {
        Err(ComponentError::failed("handler always fails"))
    }
}

struct SlowHandler;

impl Component for SlowHandler {
    fn name(&self) -> &str {
        "slow"
    }
}

#[async_trait]
impl ErrorHandler for SlowHandler {
    async fn handle(&self, _record: &ErrorRecord) -> ComponentResult<Option<Value>> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(None)
    }
}

struct CountingNotifier {
    name: &'static str,
    calls: Arc<AtomicUsize>,
}

impl CountingNotifier {
    fn new(calls: Arc<AtomicUsize>) -> Self {
        Self {
            name: "counting-notifier",
            calls,
        }
    }

    fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl Component for CountingNotifier {
    fn name(&self) -> &str {
        self.name
    }
}

#[async_trait]
impl ErrorNotifier for CountingNotifier {
    fn min_severity(&self) -> Severity {
        Severity::Low
    }

    async fn notify(&self, _record: &ErrorRecord) -> ComponentResult<NotificationReceipt> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(NotificationReceipt::new("test"))
    }
}

struct CountingRecovery {
    calls: Arc<AtomicUsize>,
}

impl Component for CountingRecovery {
    fn name(&self) -> &str {
        "counting-recovery"
    }
}

#[async_trait]
impl RecoveryStrategy for CountingRecovery {
    fn can_recover(&self, _record: &ErrorRecord) -> bool {
        true
    }

    async fn recover(
        &self,
        _record: &ErrorRecord,
        _policy: &RecoveryPolicy,
    ) -> ComponentResult<RecoveryOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RecoveryOutcome::recovered("noop", 1))
    }
}

/// Sleeps on every call and tracks how many calls overlap.
struct GaugeHandler {
    delay: Duration,
    calls: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl GaugeHandler {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Component for GaugeHandler {
    fn name(&self) -> &str {
        "gauge"
    }
}

#[async_trait]
impl ErrorHandler for GaugeHandler {
    async fn handle(&self, _record: &ErrorRecord) -> ComponentResult<Option<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(None)
    }
}

/// Polls `condition` every 10ms for up to five seconds.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn step_names(record: &ErrorRecord, kind: StepKind) -> Vec<String> {
    record.steps_of(kind).map(|s| s.name.clone()).collect()
}

// ============================================================================
// Publishing
// ============================================================================

#[tokio::test]
async fn test_publish_before_start_is_rejected() {
    let bus = assert_ok!(ErrorBus::new(test_config()));

    let result = bus.publish(RaisedError::message("x"), None);

    assert!(matches!(result, Err(BusError::NotStarted)));
    assert_eq!(bus.queue_len(), 0);
    assert_eq!(bus.statistics().total_errors, 0);
}

#[tokio::test]
async fn test_published_records_have_unique_ids_and_classification() {
    let bus = started_bus(test_config());

    let mut ids = HashSet::new();
    for i in 0..50 {
        let record = assert_ok!(bus.publish(format!("failure {i}"), None));
        assert!(!record.id.is_empty());
        assert_eq!(record.status(), ErrorStatus::Pending);
        assert_eq!(record.classification.error_type, ErrorType::Unknown);
        assert!(ids.insert(record.id));
    }
    assert_eq!(bus.queue_len(), 50);

    bus.stop().await;
}

#[tokio::test]
async fn test_statistics_counted_at_publish_and_batch_is_bounded() {
    let bus = started_bus(test_config().with_batch_size(100));

    for i in 0..150 {
        assert_ok!(bus.publish(format!("distinct error {i}"), None));
    }
    assert_eq!(bus.statistics().total_errors, 150);

    let report = bus.drain().await;
    assert_eq!(report.processed, 100);
    assert_eq!(report.remaining, 50);
    assert_eq!(bus.queue_len(), 50);

    let report = bus.drain().await;
    assert_eq!(report.processed, 50);
    assert_eq!(report.remaining, 0);
    assert_eq!(bus.statistics().processing.processed, 150);

    bus.stop().await;
}

#[tokio::test]
async fn test_context_dimensions_feed_statistics() {
    let bus = started_bus(test_config());

    for tenant in ["acme", "acme", "globex"] {
        let fragment = ErrorContextFragment::new()
            .with_tenant(tenant)
            .with_user("u-1");
        assert_ok!(bus.publish("boom", Some(fragment)));
    }

    let stats = bus.statistics();
    assert_eq!(stats.count_for_tenant("acme"), 2);
    assert_eq!(stats.count_for_tenant("globex"), 1);
    assert_eq!(stats.errors_by_user.get("u-1"), Some(&3));
    assert_eq!(stats.count_for_type(ErrorType::Unknown), 3);

    bus.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers_are_all_counted() {
    let bus = started_bus(test_config());

    let mut tasks = Vec::new();
    for task in 0..16 {
        let bus = bus.clone();
        tasks.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for i in 0..50 {
                let fragment = ErrorContextFragment::new().with_tenant(format!("tenant-{}", task % 4));
                let record = bus.publish(format!("task {task} error {i}"), Some(fragment)).unwrap();
                ids.push(record.id);
            }
            ids
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        for id in task.await.unwrap() {
            assert!(ids.insert(id));
        }
    }

    assert_eq!(ids.len(), 800);
    assert_eq!(bus.queue_len(), 800);
    let stats = bus.statistics();
    assert_eq!(stats.total_errors, 800);
    assert_eq!(stats.count_for_tenant("tenant-0"), 200);
    assert_eq!(stats.count_for_type(ErrorType::Unknown), 800);

    bus.stop().await;
}

// ============================================================================
// Handler ordering and registration
// ============================================================================

#[tokio::test]
async fn test_handlers_run_in_descending_priority() {
    let bus = started_bus(test_config());
    bus.subscribe(Arc::new(RecordingHandler::new("low", 10)));
    bus.subscribe(Arc::new(RecordingHandler::new("high", 100)));
    bus.subscribe(Arc::new(RecordingHandler::new("mid", 50)));

    let record = assert_ok!(bus.publish("ordered", None));
    bus.drain().await;

    let record = bus.record(&record.id).unwrap();
    assert_eq!(record.status(), ErrorStatus::Handled);
    assert_eq!(step_names(&record, StepKind::Logging), vec!["high", "mid", "low"]);

    bus.stop().await;
}

#[tokio::test]
async fn test_unsubscribe_applies_to_already_queued_records() {
    let bus = started_bus(test_config());
    let keep = RecordingHandler::new("keep", 0);
    let gone = RecordingHandler::new("gone", 0);
    let gone_calls = gone.calls.clone();
    bus.subscribe(Arc::new(keep));
    bus.subscribe(Arc::new(gone));

    let record = assert_ok!(bus.publish("queued before unsubscribe", None));
    assert!(bus.unsubscribe("gone"));
    assert!(!bus.unsubscribe("gone"));
    bus.drain().await;

    let record = bus.record(&record.id).unwrap();
    assert_eq!(step_names(&record, StepKind::Logging), vec!["keep"]);
    assert_eq!(gone_calls.load(Ordering::SeqCst), 0);

    bus.stop().await;
}

#[tokio::test]
async fn test_registering_same_name_replaces_previous_handler() {
    let bus = started_bus(test_config());
    bus.subscribe(Arc::new(RecordingHandler::new("dup", 100).tagged("first")));
    let replaced = bus.subscribe(Arc::new(RecordingHandler::new("dup", 1).tagged("second")));
    assert!(replaced.is_some());
    assert_eq!(bus.handler_names(), vec!["dup"]);

    let record = assert_ok!(bus.publish("last write wins", None));
    bus.drain().await;

    let record = bus.record(&record.id).unwrap();
    let steps: Vec<_> = record.steps_of(StepKind::Logging).collect();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].result, Some(json!({ "tag": "second" })));

    bus.stop().await;
}

#[tokio::test]
async fn test_registering_same_name_replaces_previous_notifier() {
    let bus = started_bus(test_config());
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    bus.add_notifier(Arc::new(CountingNotifier::new(first.clone()).named("pager")));
    let replaced = bus.add_notifier(Arc::new(CountingNotifier::new(second.clone()).named("pager")));
    assert!(replaced.is_some());
    assert_eq!(bus.notifier_names(), vec!["pager"]);

    let record = assert_ok!(bus.publish("notify once", None));
    bus.drain().await;

    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    let record = bus.record(&record.id).unwrap();
    assert_eq!(step_names(&record, StepKind::Notification), vec!["pager"]);

    bus.stop().await;
}

#[tokio::test]
async fn test_removed_notifier_skips_already_queued_records() {
    let bus = started_bus(test_config());
    let kept = Arc::new(AtomicUsize::new(0));
    let removed = Arc::new(AtomicUsize::new(0));
    bus.add_notifier(Arc::new(CountingNotifier::new(kept.clone()).named("kept")));
    bus.add_notifier(Arc::new(CountingNotifier::new(removed.clone()).named("removed")));

    let record = assert_ok!(bus.publish("queued before removal", None));
    assert!(bus.remove_notifier("removed"));
    assert!(!bus.remove_notifier("removed"));
    bus.drain().await;

    assert_eq!(kept.load(Ordering::SeqCst), 1);
    assert_eq!(removed.load(Ordering::SeqCst), 0);
    let record = bus.record(&record.id).unwrap();
    assert_eq!(step_names(&record, StepKind::Notification), vec!["kept"]);

    bus.stop().await;
}

#[tokio::test]
async fn test_removed_recovery_skips_already_queued_records() {
    let bus = started_bus(test_config());
    let recovered = Arc::new(AtomicUsize::new(0));
    bus.add_classifier(Arc::new(FixedClassifier { recoverable: true }));
    bus.add_recovery(Arc::new(CountingRecovery {
        calls: recovered.clone(),
    }));

    let record = assert_ok!(bus.publish("recoverable but unattended", None));
    assert!(record.classification.recoverable);
    assert!(bus.remove_recovery("counting-recovery"));
    assert!(bus.recovery_names().is_empty());
    bus.drain().await;

    assert_eq!(recovered.load(Ordering::SeqCst), 0);
    let record = bus.record(&record.id).unwrap();
    assert_eq!(record.status(), ErrorStatus::Handled);
    assert_eq!(record.steps_of(StepKind::Recovery).count(), 0);
    assert_eq!(bus.statistics().recovery.attempts, 0);

    bus.stop().await;
}

#[tokio::test]
async fn test_removed_classifier_falls_back_to_unknown() {
    let bus = started_bus(test_config());
    bus.add_classifier(Arc::new(FixedClassifier { recoverable: true }));

    let before = assert_ok!(bus.publish("classified", None));
    assert_eq!(before.classification.error_type, ErrorType::ExternalService);

    assert!(bus.remove_classifier("fixed"));
    assert!(!bus.remove_classifier("fixed"));
    let after = assert_ok!(bus.publish("unclassified", None));
    assert_eq!(after.classification.error_type, ErrorType::Unknown);
    assert_eq!(after.classification.code, "UNKNOWN_ERROR");

    // Classification happens at publish, so the earlier record keeps its own.
    bus.drain().await;
    let before = bus.record(&before.id).unwrap();
    assert_eq!(before.classification.error_type, ErrorType::ExternalService);

    let stats = bus.statistics();
    assert_eq!(stats.count_for_type(ErrorType::ExternalService), 1);
    assert_eq!(stats.count_for_type(ErrorType::Unknown), 1);

    bus.stop().await;
}

// ============================================================================
// Stage isolation
// ============================================================================

#[tokio::test]
async fn test_failing_handler_does_not_block_later_stages() {
    let bus = started_bus(test_config());
    let notified = Arc::new(AtomicUsize::new(0));
    let recovered = Arc::new(AtomicUsize::new(0));

    bus.add_classifier(Arc::new(FixedClassifier { recoverable: true }));
    bus.subscribe(Arc::new(FailingHandler));
    bus.add_notifier(Arc::new(CountingNotifier::new(notified.clone())));
    bus.add_recovery(Arc::new(CountingRecovery {
        calls: recovered.clone(),
    }));

    for i in 0..1000 {
        assert_ok!(bus.publish(format!("upstream failure {i}"), None));
    }
    while bus.queue_len() > 0 {
        let report = bus.drain().await;
        assert_eq!(report.failed, 0);
    }

    assert_eq!(notified.load(Ordering::SeqCst), 1000);
    assert_eq!(recovered.load(Ordering::SeqCst), 1000);

    let stats = bus.statistics();
    assert_eq!(stats.processing.processed, 1000);
    assert_eq!(stats.processing.successful, 1000);
    assert_eq!(stats.notification.attempts, 1000);
    assert_eq!(stats.recovery.successful, 1000);

    let records = bus.retained_records();
    assert_eq!(records.len(), 1000);
    for record in &records {
        assert_eq!(record.status(), ErrorStatus::Handled);
        let handler_step = record.steps_of(StepKind::Logging).next().unwrap();
        assert_eq!(handler_step.outcome, StepOutcome::Failed);
        assert_eq!(handler_step.error.as_deref(), Some("handler always fails"));
        assert_eq!(record.steps_of(StepKind::Notification).count(), 1);
        assert_eq!(record.steps_of(StepKind::Recovery).count(), 1);
    }

    // Later batches are unaffected.
    for _ in 0..10 {
        assert_ok!(bus.publish("after the storm", None));
    }
    let report = bus.drain().await;
    assert_eq!(report.processed, 10);
    assert_eq!(report.handled, 10);

    bus.stop().await;
}

#[tokio::test]
async fn test_slow_handler_is_cut_off_by_processing_timeout() {
    let config = test_config().with_processing_timeout(Duration::from_millis(50));
    let bus = started_bus(config);
    bus.subscribe(Arc::new(SlowHandler));

    let record = assert_ok!(bus.publish("slow path", None));
    bus.drain().await;

    let record = bus.record(&record.id).unwrap();
    assert_eq!(record.status(), ErrorStatus::Handled);
    let step = record.steps_of(StepKind::Logging).next().unwrap();
    assert_eq!(step.outcome, StepOutcome::Failed);
    assert!(step.error.as_deref().unwrap().starts_with("timed out"));

    bus.stop().await;
}

#[tokio::test]
async fn test_no_recovery_for_unrecoverable_errors() {
    let bus = started_bus(test_config());
    let recovered = Arc::new(AtomicUsize::new(0));
    bus.add_classifier(Arc::new(FixedClassifier { recoverable: false }));
    bus.add_recovery(Arc::new(CountingRecovery {
        calls: recovered.clone(),
    }));

    let record = assert_ok!(bus.publish("not recoverable", None));
    bus.drain().await;

    let record = bus.record(&record.id).unwrap();
    assert_eq!(record.steps_of(StepKind::Recovery).count(), 0);
    assert_eq!(recovered.load(Ordering::SeqCst), 0);
    assert_eq!(bus.statistics().recovery.attempts, 0);

    bus.stop().await;
}

#[tokio::test]
async fn test_disabled_stages_are_skipped() {
    let bus = started_bus(test_config());
    let notified = Arc::new(AtomicUsize::new(0));
    let recovered = Arc::new(AtomicUsize::new(0));
    bus.add_classifier(Arc::new(FixedClassifier { recoverable: true }));
    bus.add_notifier(Arc::new(CountingNotifier::new(notified.clone())));
    bus.add_recovery(Arc::new(CountingRecovery {
        calls: recovered.clone(),
    }));

    assert_ok!(bus.configure(
        &BusConfigPatch::new()
            .enable_notification(false)
            .enable_recovery(false)
    ));
    let record = assert_ok!(bus.publish("quiet", None));
    bus.drain().await;

    let record = bus.record(&record.id).unwrap();
    assert_eq!(record.status(), ErrorStatus::Handled);
    assert_eq!(notified.load(Ordering::SeqCst), 0);
    assert_eq!(recovered.load(Ordering::SeqCst), 0);

    bus.stop().await;
}

// ============================================================================
// Configuration at runtime
// ============================================================================

#[tokio::test]
async fn test_disabling_a_running_bus_keeps_queue_until_reenabled() {
    let bus = started_bus(test_config());
    bus.subscribe(Arc::new(RecordingHandler::new("rec", 0)));

    assert_ok!(bus.configure(&BusConfigPatch::new().enabled(false)));

    // Publishing still classifies, queues and counts.
    let record = assert_ok!(bus.publish("while disabled", None));
    assert_eq!(bus.statistics().total_errors, 1);
    assert_eq!(bus.queue_len(), 1);

    let report = bus.drain().await;
    assert!(report.skipped);
    assert_eq!(report.processed, 0);
    assert_eq!(bus.queue_len(), 1);
    assert_eq!(bus.record(&record.id).unwrap().status(), ErrorStatus::Pending);

    assert_ok!(bus.configure(&BusConfigPatch::new().enabled(true)));
    let report = bus.drain().await;
    assert_eq!(report.processed, 1);
    assert_eq!(bus.record(&record.id).unwrap().status(), ErrorStatus::Handled);

    bus.stop().await;
}

#[tokio::test]
async fn test_stop_drains_remaining_records() {
    let bus = started_bus(test_config());
    for i in 0..5 {
        assert_ok!(bus.publish(format!("pending {i}"), None));
    }

    bus.stop().await;

    assert!(!bus.is_running());
    assert_eq!(bus.queue_len(), 0);
    assert_eq!(bus.statistics().processing.processed, 5);
    assert!(matches!(bus.publish("late", None), Err(BusError::NotStarted)));
}

#[tokio::test]
async fn test_scheduled_tick_drains_without_manual_calls() {
    let bus = started_bus(BusConfig::default().with_batch_interval(Duration::from_millis(20)));
    let record = assert_ok!(bus.publish("picked up by the tick", None));

    let mut handled = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if bus.record(&record.id).map(|r| r.status()) == Some(ErrorStatus::Handled) {
            handled = true;
            break;
        }
    }
    assert!(handled);

    bus.stop().await;
}

#[tokio::test]
async fn test_scheduled_ticks_never_overlap_a_running_drain() {
    let bus = started_bus(BusConfig::default().with_batch_interval(Duration::from_millis(20)));
    let gauge = GaugeHandler::new(Duration::from_millis(150));
    let calls = gauge.calls.clone();
    let max_active = gauge.max_active.clone();
    bus.subscribe(Arc::new(gauge));

    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(assert_ok!(bus.publish(format!("slow record {i}"), None)).id);
    }

    // A manual drain competes with ticks firing every 20ms while it runs.
    let manual = tokio::spawn({
        let bus = bus.clone();
        async move { bus.drain().await }
    });
    assert!(eventually(|| bus.retained_len() == 4).await);
    assert_ok!(manual.await);

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert_eq!(bus.statistics().processing.processed, 4);
    for id in &ids {
        let record = bus.record(id).unwrap();
        assert_eq!(record.status(), ErrorStatus::Handled);
        assert_eq!(step_names(&record, StepKind::Logging), vec!["gauge"]);
    }

    bus.stop().await;
}

#[tokio::test]
async fn test_record_is_visible_while_in_flight() {
    let bus = started_bus(test_config());
    let gauge = GaugeHandler::new(Duration::from_millis(300));
    let calls = gauge.calls.clone();
    bus.subscribe(Arc::new(gauge));

    let id = assert_ok!(bus.publish("watched", None)).id;
    let drain = tokio::spawn({
        let bus = bus.clone();
        async move { bus.drain().await }
    });

    assert!(eventually(|| calls.load(Ordering::SeqCst) == 1).await);
    assert_eq!(bus.queue_len(), 0);
    assert_eq!(bus.in_flight_len(), 1);
    let seen = bus.record(&id).unwrap();
    assert_eq!(seen.status(), ErrorStatus::Pending);

    let report = assert_ok!(drain.await);
    assert_eq!(report.processed, 1);
    assert_eq!(bus.in_flight_len(), 0);
    assert_eq!(bus.record(&id).unwrap().status(), ErrorStatus::Handled);

    bus.stop().await;
}

// ============================================================================
// Retention
// ============================================================================

#[tokio::test]
async fn test_retention_is_capped_by_record_count() {
    let bus = started_bus(test_config().with_max_retained_records(2));

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(assert_ok!(bus.publish(format!("retained {i}"), None)).id);
    }
    let report = bus.drain().await;
    assert_eq!(report.processed, 5);

    assert_eq!(bus.retained_len(), 2);
    assert!(bus.record(&ids[0]).is_none());
    assert!(bus.record(&ids[2]).is_none());
    assert!(bus.record(&ids[3]).is_some());
    assert!(bus.record(&ids[4]).is_some());
    // Evicted records still count.
    assert_eq!(bus.statistics().processing.processed, 5);

    bus.stop().await;
}

// ============================================================================
// Statistics snapshots
// ============================================================================

#[tokio::test]
async fn test_statistics_snapshots_are_stable() {
    let bus = started_bus(test_config());
    assert_ok!(bus.publish("one", None));
    bus.drain().await;

    let first = bus.statistics();
    let second = bus.statistics();
    assert_eq!(first, second);

    bus.stop().await;
}
