//! The error bus.
//!
//! [`ErrorBus`] accepts published errors, classifies them synchronously and
//! queues the resulting records. A periodic drain tick (see
//! [`DrainScheduler`]) pops bounded batches and runs each record through the
//! handler, notifier and recovery stages.
//!
//! ```no_run
//! use std::sync::Arc;
//! use faultbus::bus::ErrorBus;
//! use faultbus::classify::PatternClassifier;
//! use faultbus::config::BusConfig;
//! use faultbus::handlers::LoggingHandler;
//!
//! # async fn run() -> Result<(), faultbus::error::BusError> {
//! let bus = ErrorBus::new(BusConfig::default())?;
//! bus.add_classifier(Arc::new(PatternClassifier::new()));
//! bus.subscribe(Arc::new(LoggingHandler::new()));
//! bus.start()?;
//!
//! let record = bus.publish("connection refused", None)?;
//! println!("queued {}", record.id);
//!
//! bus.stop().await;
//! # Ok(())
//! # }
//! ```

mod pipeline;
mod retention;
mod scheduler;

pub use pipeline::DrainReport;
pub use scheduler::DrainScheduler;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::classify::{self, Classifier, DEFAULT_CLASSIFIER};
use crate::config::{BusConfig, BusConfigPatch};
use crate::error::{
    BusError, ErrorClassification, ErrorContext, ErrorContextFragment, ErrorRecord,
    ProcessingStep, RaisedError, StepKind,
};
use crate::handlers::ErrorHandler;
use crate::notify::ErrorNotifier;
use crate::recovery::RecoveryStrategy;
use crate::registry::Registry;
use crate::stats::{Statistics, StatisticsCollector};
use retention::RetentionStore;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct BusInner {
    config: RwLock<BusConfig>,
    classifiers: RwLock<Registry<dyn Classifier>>,
    handlers: RwLock<Registry<dyn ErrorHandler>>,
    notifiers: RwLock<Registry<dyn ErrorNotifier>>,
    strategies: RwLock<Registry<dyn RecoveryStrategy>>,
    queue: Mutex<VecDeque<ErrorRecord>>,
    /// Records popped by the running tick, as they were when popped.
    in_flight: Mutex<HashMap<String, ErrorRecord>>,
    retained: Mutex<RetentionStore>,
    stats: StatisticsCollector,
    running: AtomicBool,
    scheduler: Mutex<Option<DrainScheduler>>,
    /// Single-flight guard: at most one drain tick runs at a time.
    drain_guard: tokio::sync::Mutex<()>,
}

/// Handle to an error bus. Clones share the same bus.
#[derive(Clone)]
pub struct ErrorBus {
    inner: Arc<BusInner>,
}

impl Default for ErrorBus {
    fn default() -> Self {
        Self::with_valid_config(BusConfig::default())
    }
}

impl ErrorBus {
    /// Creates a stopped bus with empty registries.
    ///
    /// Fails with [`BusError::Config`] if `config` does not validate.
    pub fn new(config: BusConfig) -> Result<Self, BusError> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config: RwLock::new(config),
                classifiers: RwLock::new(Registry::new()),
                handlers: RwLock::new(Registry::new()),
                notifiers: RwLock::new(Registry::new()),
                strategies: RwLock::new(Registry::new()),
                queue: Mutex::new(VecDeque::new()),
                in_flight: Mutex::new(HashMap::new()),
                retained: Mutex::new(RetentionStore::new()),
                stats: StatisticsCollector::new(),
                running: AtomicBool::new(false),
                scheduler: Mutex::new(None),
                drain_guard: tokio::sync::Mutex::new(()),
            }),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the periodic drain tick. Must be called inside a tokio runtime.
    ///
    /// Calling `start` on a running bus logs a warning and does nothing.
    pub fn start(&self) -> Result<(), BusError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(BusError::NoRuntime);
        }

        let mut scheduler = lock(&self.inner.scheduler);
        if self.inner.running.load(Ordering::SeqCst) {
            warn!("Error bus already started");
            return Ok(());
        }

        let period = {
            let config = read(&self.inner.config);
            config.validate()?;
            config.batch_interval
        };
        self.inner.running.store(true, Ordering::SeqCst);
        let weak = Arc::downgrade(&self.inner);
        *scheduler = Some(DrainScheduler::start(period, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => {
                        inner.scheduled_tick().await;
                        true
                    }
                    None => false,
                }
            }
        }));

        info!(batch_interval_ms = period.as_millis() as u64, "Error bus started");
        Ok(())
    }

    /// Stops the drain tick and runs one best-effort final drain.
    ///
    /// Calling `stop` on a stopped bus logs a warning and does nothing. The
    /// final drain is skipped while the bus is disabled.
    pub async fn stop(&self) {
        let scheduler = {
            let mut scheduler = lock(&self.inner.scheduler);
            if !self.inner.running.swap(false, Ordering::SeqCst) {
                warn!("Error bus is not running");
                return;
            }
            scheduler.take()
        };

        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }

        let report = self.drain().await;
        if report.failed > 0 {
            warn!(
                failed = report.failed,
                remaining = report.remaining,
                "Final drain finished with failures"
            );
        }
        info!(
            processed = report.processed,
            remaining = report.remaining,
            "Error bus stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Classifies and queues an error.
    ///
    /// Fails with [`BusError::NotStarted`] if the bus is not running; nothing
    /// is queued in that case.
    pub fn publish(
        &self,
        error: impl Into<RaisedError>,
        fragment: Option<ErrorContextFragment>,
    ) -> Result<ErrorRecord, BusError> {
        if !self.is_running() {
            return Err(BusError::NotStarted);
        }

        let error = error.into();
        let context = ErrorContext::from_fragment(fragment.unwrap_or_default());
        let enable_classification = read(&self.inner.config).enable_classification;

        let (classification, step) = if enable_classification {
            let result = classify::classify(&read(&self.inner.classifiers), &error, &context);
            let step = result.to_step();
            (result.classification, step)
        } else {
            (
                ErrorClassification::unknown(error.message.clone()),
                ProcessingStep::skipped(
                    DEFAULT_CLASSIFIER,
                    StepKind::Classification,
                    "classification disabled",
                ),
            )
        };

        let mut record = ErrorRecord::new(error, context, classification);
        record.push_step(step);

        self.inner.stats.record_published(&record);
        lock(&self.inner.queue).push_back(record.clone());

        debug!(
            error_id = %record.id,
            tenant_id = record.tenant_id().unwrap_or("-"),
            error_type = %record.classification.error_type,
            severity = %record.classification.severity,
            "Error published"
        );
        Ok(record)
    }

    /// Runs one drain tick now and waits for it.
    ///
    /// Shares the single-flight guard with the scheduled tick, so it waits
    /// for a tick already in progress instead of running concurrently.
    pub async fn drain(&self) -> DrainReport {
        let _guard = self.inner.drain_guard.lock().await;
        self.inner.drain_locked().await
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a handler, replacing any handler with the same name.
    pub fn subscribe(&self, handler: Arc<dyn ErrorHandler>) -> Option<Arc<dyn ErrorHandler>> {
        write(&self.inner.handlers).register(handler)
    }

    /// Removes a handler. Returns false if none was registered under `name`.
    pub fn unsubscribe(&self, name: &str) -> bool {
        write(&self.inner.handlers).remove(name).is_some()
    }

    pub fn add_classifier(&self, classifier: Arc<dyn Classifier>) -> Option<Arc<dyn Classifier>> {
        write(&self.inner.classifiers).register(classifier)
    }

    pub fn remove_classifier(&self, name: &str) -> bool {
        write(&self.inner.classifiers).remove(name).is_some()
    }

    pub fn add_notifier(&self, notifier: Arc<dyn ErrorNotifier>) -> Option<Arc<dyn ErrorNotifier>> {
        write(&self.inner.notifiers).register(notifier)
    }

    pub fn remove_notifier(&self, name: &str) -> bool {
        write(&self.inner.notifiers).remove(name).is_some()
    }

    pub fn add_recovery(
        &self,
        strategy: Arc<dyn RecoveryStrategy>,
    ) -> Option<Arc<dyn RecoveryStrategy>> {
        write(&self.inner.strategies).register(strategy)
    }

    pub fn remove_recovery(&self, name: &str) -> bool {
        write(&self.inner.strategies).remove(name).is_some()
    }

    /// Handler names in execution order.
    pub fn handler_names(&self) -> Vec<String> {
        read(&self.inner.handlers).names()
    }

    pub fn classifier_names(&self) -> Vec<String> {
        read(&self.inner.classifiers).names()
    }

    pub fn notifier_names(&self) -> Vec<String> {
        read(&self.inner.notifiers).names()
    }

    pub fn recovery_names(&self) -> Vec<String> {
        read(&self.inner.strategies).names()
    }

    // =========================================================================
    // Configuration and inspection
    // =========================================================================

    /// Merges `patch` over the current configuration and returns the result.
    ///
    /// An invalid result is rejected and the configuration is left unchanged.
    /// A new `batch_interval` applies on the next `start`.
    pub fn configure(&self, patch: &BusConfigPatch) -> Result<BusConfig, BusError> {
        let mut config = write(&self.inner.config);
        let merged = config.merged(patch);
        merged.validate()?;
        *config = merged.clone();
        debug!(?patch, "Configuration updated");
        Ok(merged)
    }

    pub fn configuration(&self) -> BusConfig {
        read(&self.inner.config).clone()
    }

    /// Snapshot of the statistics.
    pub fn statistics(&self) -> Statistics {
        self.inner.stats.snapshot()
    }

    /// Number of records waiting for a drain tick.
    pub fn queue_len(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    /// Looks up a record by id: queued, being processed, or retained.
    ///
    /// A record inside a running tick is returned as it was when popped
    /// (still PENDING); its steps become visible once the record finishes.
    pub fn record(&self, id: &str) -> Option<ErrorRecord> {
        // Same order records move in: queue, in flight, retained.
        if let Some(record) = lock(&self.inner.queue).iter().find(|r| r.id == id) {
            return Some(record.clone());
        }
        if let Some(record) = lock(&self.inner.in_flight).get(id) {
            return Some(record.clone());
        }
        lock(&self.inner.retained).get(id).cloned()
    }

    /// Number of records popped by the running tick and not yet finished.
    pub fn in_flight_len(&self) -> usize {
        lock(&self.inner.in_flight).len()
    }

    /// Number of finished records currently retained.
    pub fn retained_len(&self) -> usize {
        lock(&self.inner.retained).len()
    }

    /// Finished records still inside the retention time, oldest first.
    pub fn retained_records(&self) -> Vec<ErrorRecord> {
        lock(&self.inner.retained).list()
    }
}
