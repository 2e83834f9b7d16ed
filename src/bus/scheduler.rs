//! Periodic drain scheduling.
//!
//! The scheduler owns one spawned tokio task that calls a tick function on a
//! fixed period until it is stopped or the tick asks to stop. The first tick
//! fires one full period after start.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// A cancellable periodic task.
pub struct DrainScheduler {
    period: Duration,
    /// Flag to signal the background task to stop.
    stop_flag: Arc<AtomicBool>,
    /// Wakes the task so `stop` does not wait for the next period.
    wake: Arc<Notify>,
    /// Handle to the background task.
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl DrainScheduler {
    /// Spawns the periodic task on the current tokio runtime.
    ///
    /// `tick` returns `false` to end the schedule from inside.
    pub fn start<F, Fut>(period: Duration, tick: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());

        let task_stop = Arc::clone(&stop_flag);
        let task_wake = Arc::clone(&wake);
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            // A slow tick pushes the next one back instead of bursting.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = task_wake.notified() => {}
                }

                if task_stop.load(Ordering::SeqCst) {
                    break;
                }

                if !tick().await {
                    debug!("Drain schedule ended by tick");
                    break;
                }
            }
        });

        Self {
            period,
            stop_flag,
            wake,
            task_handle: Mutex::new(Some(handle)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the background task is still alive.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the task and waits for it to finish.
    ///
    /// A tick that is already running completes first.
    pub async fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.wake.notify_one();

        let handle = self
            .task_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for DrainScheduler {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }
}
