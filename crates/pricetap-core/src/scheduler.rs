//! Drift-corrected periodic driver for collection runs.
//!
//! One loop task per [`Scheduler`]. Each tick runs a collection, measures how
//! long it took and sleeps only the remainder of the interval, so start
//! instants stay on cadence. A tick that overruns the interval is followed
//! immediately by the next one. Runs execute inside their own task so a panic
//! is contained to the tick that raised it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::clock;
use crate::collector::{Collect, CollectionOutcome, CollectionStatus};
use crate::UtcDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Every candidate resolved and the batch was stored.
    Success,
    /// Some symbols unresolved, or storage unavailable.
    Partial,
    /// Storage rejected the batch or the run panicked.
    Failure,
}

/// Record of one tick, kept for status reporting only.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub sequence: u64,
    pub started_at: UtcDateTime,
    pub duration_ms: u64,
    pub outcome: CycleOutcome,
    pub candidates: usize,
    pub resolved: usize,
    pub persisted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub cycle_count: u64,
    pub failed_cycles: u64,
    pub overruns: u64,
    /// Seconds since the loop last started; frozen at the stop instant once stopped.
    pub total_runtime_secs: f64,
    pub interval_secs: u64,
    pub last_cycle: Option<CycleReport>,
}

#[derive(Debug, Default)]
struct SchedulerShared {
    running: AtomicBool,
    cycle_count: AtomicU64,
    failed_cycles: AtomicU64,
    overruns: AtomicU64,
    window: Mutex<RunWindow>,
    last_cycle: Mutex<Option<CycleReport>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct RunWindow {
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

impl SchedulerShared {
    fn window(&self) -> std::sync::MutexGuard<'_, RunWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, report: CycleReport) {
        *self.last_cycle.lock().unwrap_or_else(PoisonError::into_inner) = Some(report);
    }

    fn runtime(&self) -> Duration {
        let window = *self.window();
        match (window.started_at, window.stopped_at) {
            (Some(started), Some(stopped)) => stopped.saturating_duration_since(started),
            (Some(started), None) => started.elapsed(),
            _ => Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct LoopControl {
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

pub struct Scheduler {
    collector: Arc<dyn Collect>,
    interval: Duration,
    force_all: bool,
    shared: Arc<SchedulerShared>,
    control: Mutex<LoopControl>,
}

impl Scheduler {
    pub fn new(collector: Arc<dyn Collect>, interval: Duration, force_all: bool) -> Self {
        Self {
            collector,
            interval,
            force_all,
            shared: Arc::new(SchedulerShared::default()),
            control: Mutex::new(LoopControl::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Spawn the loop. Returns `false` when a loop is already active.
    ///
    /// Must be called from within a tokio runtime. A loop that was stopped but
    /// is still finishing its last run is awaited before the new one ticks.
    pub fn start(&self) -> bool {
        let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        if control.stop_tx.is_some() {
            tracing::debug!("scheduler already running");
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let draining = control.task.take();
        self.shared.running.store(true, Ordering::SeqCst);

        let task = tokio::spawn(run_loop(
            Arc::clone(&self.collector),
            self.interval,
            self.force_all,
            Arc::clone(&self.shared),
            stop_rx,
            draining,
        ));

        control.stop_tx = Some(stop_tx);
        control.task = Some(task);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            force_all = self.force_all,
            "scheduler started"
        );
        true
    }

    /// Signal the loop to exit. A pending sleep is cut short; a run in flight
    /// finishes first. Returns `false` when nothing was running.
    pub fn stop(&self) -> bool {
        let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(stop_tx) = control.stop_tx.take() else {
            return false;
        };

        let _ = stop_tx.send(true);
        self.shared.running.store(false, Ordering::SeqCst);
        tracing::info!("scheduler stop requested");
        true
    }

    /// Stop and wait for the loop task to exit.
    pub async fn stop_and_wait(&self) {
        self.stop();
        let task = self
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .task
            .take();

        if let Some(task) = task {
            if let Err(error) = task.await {
                tracing::error!(%error, "scheduler loop ended abnormally");
            }
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.is_running(),
            cycle_count: self.shared.cycle_count.load(Ordering::SeqCst),
            failed_cycles: self.shared.failed_cycles.load(Ordering::SeqCst),
            overruns: self.shared.overruns.load(Ordering::SeqCst),
            total_runtime_secs: self.shared.runtime().as_secs_f64(),
            interval_secs: self.interval.as_secs(),
            last_cycle: self
                .shared
                .last_cycle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    collector: Arc<dyn Collect>,
    interval: Duration,
    force_all: bool,
    shared: Arc<SchedulerShared>,
    mut stop_rx: watch::Receiver<bool>,
    draining: Option<JoinHandle<()>>,
) {
    if let Some(previous) = draining {
        let _ = previous.await;
    }

    *shared.window() = RunWindow {
        started_at: Some(Instant::now()),
        stopped_at: None,
    };

    loop {
        if *stop_rx.borrow() {
            break;
        }

        let tick_start = Instant::now();
        let sequence = shared.cycle_count.load(Ordering::SeqCst) + 1;
        tracing::info!(sequence, "collection cycle started");

        let report = run_cycle(&collector, force_all, sequence).await;
        let elapsed = tick_start.elapsed();

        shared.cycle_count.fetch_add(1, Ordering::SeqCst);
        if report.outcome == CycleOutcome::Failure {
            shared.failed_cycles.fetch_add(1, Ordering::SeqCst);
        }
        tracing::info!(
            sequence,
            outcome = ?report.outcome,
            duration_ms = report.duration_ms,
            "collection cycle finished"
        );
        shared.record(report);

        if elapsed >= interval {
            shared.overruns.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(
                sequence,
                elapsed_ms = clock::millis(elapsed),
                interval_ms = clock::millis(interval),
                "collection cycle overran its interval"
            );
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval - elapsed) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    shared.window().stopped_at = Some(Instant::now());
    tracing::info!("scheduler stopped");
}

async fn run_cycle(collector: &Arc<dyn Collect>, force_all: bool, sequence: u64) -> CycleReport {
    let started_at = UtcDateTime::now();
    let tick_start = Instant::now();
    let collector = Arc::clone(collector);
    let result = tokio::spawn(async move { collector.collect(force_all).await }).await;
    let duration_ms = clock::millis(tick_start.elapsed());

    match result {
        Ok(outcome) => report_from_outcome(sequence, duration_ms, outcome),
        Err(error) => {
            tracing::error!(sequence, %error, "collection cycle failed");
            CycleReport {
                sequence,
                started_at,
                duration_ms,
                outcome: CycleOutcome::Failure,
                candidates: 0,
                resolved: 0,
                persisted: 0,
                error: Some(error.to_string()),
            }
        }
    }
}

fn report_from_outcome(sequence: u64, duration_ms: u64, outcome: CollectionOutcome) -> CycleReport {
    let (cycle_outcome, error) = match &outcome.status {
        CollectionStatus::StorageFailed(message) => {
            tracing::error!(sequence, error = %message, "collection cycle failed");
            (CycleOutcome::Failure, Some(message.clone()))
        }
        CollectionStatus::StorageUnavailable => {
            (CycleOutcome::Partial, Some(String::from("storage unavailable")))
        }
        CollectionStatus::Success if !outcome.missing.is_empty() => (CycleOutcome::Partial, None),
        CollectionStatus::Success => (CycleOutcome::Success, None),
    };

    CycleReport {
        sequence,
        started_at: outcome.started_at,
        duration_ms,
        outcome: cycle_outcome,
        candidates: outcome.candidates.len(),
        resolved: outcome.resolved.len(),
        persisted: outcome.persisted,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    struct CountingCollector {
        calls: AtomicU64,
    }

    impl Collect for CountingCollector {
        fn collect(&self, force_all: bool) -> Pin<Box<dyn Future<Output = CollectionOutcome> + Send + '_>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                CollectionOutcome {
                    started_at: UtcDateTime::now(),
                    force_all,
                    candidates: Vec::new(),
                    resolved: Vec::new(),
                    missing: Vec::new(),
                    persisted: 0,
                    duration_ms: 0,
                    status: CollectionStatus::StorageUnavailable,
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn storage_outage_is_a_partial_cycle() {
        let collector = Arc::new(CountingCollector {
            calls: AtomicU64::new(0),
        });
        let scheduler = Scheduler::new(collector.clone(), Duration::from_secs(10), true);

        assert!(scheduler.start());
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.stop_and_wait().await;

        let status = scheduler.status();
        assert_eq!(status.cycle_count, 1);
        assert_eq!(status.failed_cycles, 0);
        let last = status.last_cycle.expect("one cycle");
        assert_eq!(last.outcome, CycleOutcome::Partial);
        assert_eq!(collector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_start_is_a_no_op() {
        let scheduler = Scheduler::new(
            Arc::new(CountingCollector {
                calls: AtomicU64::new(0),
            }),
            Duration::from_secs(10),
            true,
        );

        assert!(!scheduler.stop());
        scheduler.stop_and_wait().await;
        assert!(!scheduler.status().running);
        assert_eq!(scheduler.status().total_runtime_secs, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn runtime_freezes_after_stop() {
        let scheduler = Scheduler::new(
            Arc::new(CountingCollector {
                calls: AtomicU64::new(0),
            }),
            Duration::from_secs(10),
            true,
        );

        scheduler.start();
        tokio::time::sleep(Duration::from_secs(25)).await;
        scheduler.stop_and_wait().await;
        let frozen = scheduler.status().total_runtime_secs;
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(frozen >= 25.0);
        assert_eq!(scheduler.status().total_runtime_secs, frozen);
        assert_eq!(scheduler.status().cycle_count, 3);
    }
}
