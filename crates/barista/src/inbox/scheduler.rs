//! Periodic ingestion passes with a single-flight guard.
//!
//! At most one pass runs at a time. A tick that fires while a pass is in
//! flight is dropped, never queued. `start`, `stop` and `update_interval`
//! are serialized, so the last call decides whether the timer is armed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::engine::{IngestionEngine, PassSummary};
use super::error::Result;

/// Longest accepted poll interval: one week.
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Scheduler state as reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_minutes: Option<u64>,
    pub in_flight: bool,
}

struct ArmedTimer {
    interval_minutes: u64,
    /// The tick loop only; passes run in their own tasks.
    ticks: JoinHandle<()>,
}

/// Owns the poll timer and the in-flight flag for one engine.
pub struct SchedulerHandle {
    engine: Arc<IngestionEngine>,
    in_flight: Arc<AtomicBool>,
    /// Held for the whole of a start, stop or update.
    lifecycle: Mutex<()>,
    timer: Mutex<Option<ArmedTimer>>,
}

/// Clears the in-flight flag when the pass ends, however it ends.
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Runs a pass unless one is already in flight.
async fn guarded_pass(
    engine: &IngestionEngine,
    in_flight: &Arc<AtomicBool>,
) -> Option<Result<PassSummary>> {
    let _guard = InFlightGuard::acquire(in_flight)?;
    Some(engine.run_pass().await)
}

impl SchedulerHandle {
    pub fn new(engine: Arc<IngestionEngine>) -> Self {
        Self {
            engine,
            in_flight: Arc::new(AtomicBool::new(false)),
            lifecycle: Mutex::new(()),
            timer: Mutex::new(None),
        }
    }

    /// Starts polling every `interval_minutes`.
    ///
    /// Zero leaves the scheduler stopped without running a pass. Otherwise
    /// one pass runs before this returns and the timer is armed after it.
    /// Intervals above [`MAX_INTERVAL_MINUTES`] are clamped.
    pub async fn start(&self, interval_minutes: u64) {
        let _lifecycle = self.lifecycle.lock().await;
        self.start_locked(interval_minutes).await;
    }

    /// Disarms the timer. Idempotent; a pass already in flight finishes.
    /// A start still running its first pass completes before this takes
    /// effect, so the scheduler ends up stopped.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.disarm_current().await;
    }

    /// Tears down the timer and starts again with the new interval, even
    /// when it is unchanged.
    pub async fn update_interval(&self, interval_minutes: u64) {
        let _lifecycle = self.lifecycle.lock().await;
        self.disarm_current().await;
        self.start_locked(interval_minutes).await;
    }

    /// Runs a pass now, or returns `None` when one is already in flight.
    pub async fn run_pass_guarded(&self) -> Option<Result<PassSummary>> {
        guarded_pass(&self.engine, &self.in_flight).await
    }

    pub async fn status(&self) -> SchedulerStatus {
        let interval_minutes = self.timer.lock().await.as_ref().map(|t| t.interval_minutes);
        SchedulerStatus {
            running: interval_minutes.is_some(),
            interval_minutes,
            in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }

    async fn start_locked(&self, interval_minutes: u64) {
        if interval_minutes == 0 {
            info!("Email polling disabled (interval 0)");
            self.disarm_current().await;
            return;
        }

        let interval_minutes = if interval_minutes > MAX_INTERVAL_MINUTES {
            warn!(
                "Poll interval {} minute(s) is too long, using {}",
                interval_minutes, MAX_INTERVAL_MINUTES
            );
            MAX_INTERVAL_MINUTES
        } else {
            interval_minutes
        };

        info!("Starting email polling every {} minute(s)", interval_minutes);
        log_pass(self.run_pass_guarded().await);
        self.arm(interval_minutes).await;
    }

    async fn disarm_current(&self) {
        if let Some(timer) = self.timer.lock().await.take() {
            disarm(timer);
            info!("Email polling stopped");
        }
    }

    async fn arm(&self, interval_minutes: u64) {
        let period = interval_period(interval_minutes);
        let engine = Arc::clone(&self.engine);
        let in_flight = Arc::clone(&self.in_flight);

        let ticks = tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer.tick().await; // the first tick completes immediately

            loop {
                timer.tick().await;
                // A slow pass must not hold back the timer; the guard drops
                // ticks that overlap it.
                let engine = Arc::clone(&engine);
                let in_flight = Arc::clone(&in_flight);
                tokio::spawn(async move {
                    log_pass(guarded_pass(&engine, &in_flight).await);
                });
            }
        });

        let armed = ArmedTimer {
            interval_minutes,
            ticks,
        };
        if let Some(previous) = self.timer.lock().await.replace(armed) {
            disarm(previous);
        }
    }
}

fn interval_period(interval_minutes: u64) -> Duration {
    Duration::from_secs(interval_minutes.clamp(1, MAX_INTERVAL_MINUTES) * 60)
}

/// Stops the tick loop. A pass it already spawned runs to completion.
fn disarm(timer: ArmedTimer) {
    timer.ticks.abort();
}

fn log_pass(outcome: Option<Result<PassSummary>>) {
    match outcome {
        None => warn!("Previous email pass still running, skipping this one"),
        Some(Err(e)) => error!("Email pass failed: {}", e),
        Some(Ok(_)) => {}
    }
}
