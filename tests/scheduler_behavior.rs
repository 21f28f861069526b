//! Behavior-driven tests for the periodic scheduler
//!
//! These tests verify HOW the scheduler holds cadence, reacts to overruns,
//! survives failing cycles and honours start/stop. Time is paused so
//! durations are exact.

use pricetap_core::{
    Collect, CollectionOutcome, CollectionStatus, CycleOutcome, Scheduler, UtcDateTime,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Collector that takes a fixed time per run and records start instants.
struct TimedCollector {
    run_for: Duration,
    panic_on_call: Option<u64>,
    calls: AtomicU64,
    finished: AtomicU64,
    starts: Mutex<Vec<Instant>>,
}

impl TimedCollector {
    fn new(run_for: Duration) -> Self {
        Self {
            run_for,
            panic_on_call: None,
            calls: AtomicU64::new(0),
            finished: AtomicU64::new(0),
            starts: Mutex::new(Vec::new()),
        }
    }

    fn panicking_on(mut self, call: u64) -> Self {
        self.panic_on_call = Some(call);
        self
    }

    fn gaps(&self) -> Vec<Duration> {
        let starts = self.starts.lock().expect("starts lock");
        starts
            .windows(2)
            .map(|pair| pair[1].duration_since(pair[0]))
            .collect()
    }
}

impl Collect for TimedCollector {
    fn collect(&self, force_all: bool) -> Pin<Box<dyn Future<Output = CollectionOutcome> + Send + '_>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.starts.lock().expect("starts lock").push(Instant::now());
            if self.panic_on_call == Some(call) {
                panic!("storage call raised on cycle {call}");
            }

            tokio::time::sleep(self.run_for).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            CollectionOutcome {
                started_at: UtcDateTime::now(),
                force_all,
                candidates: Vec::new(),
                resolved: Vec::new(),
                missing: Vec::new(),
                persisted: 0,
                duration_ms: 0,
                status: CollectionStatus::Success,
            }
        })
    }
}

// =============================================================================
// Scheduler: Cadence
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_run_is_shorter_than_interval_system_holds_the_cadence() {
    // Given: A 60s interval and runs that take 5s
    let collector = Arc::new(TimedCollector::new(Duration::from_secs(5)));
    let scheduler = Scheduler::new(collector.clone(), Duration::from_secs(60), true);

    // When: The scheduler runs for two and a half intervals
    scheduler.start();
    tokio::time::sleep(Duration::from_secs(150)).await;
    scheduler.stop_and_wait().await;

    // Then: Run starts are exactly one interval apart
    assert_eq!(
        collector.gaps(),
        vec![Duration::from_secs(60), Duration::from_secs(60)]
    );
    assert_eq!(scheduler.status().overruns, 0);
}

#[tokio::test(start_paused = true)]
async fn when_run_overruns_interval_system_starts_next_tick_immediately() {
    // Given: A 60s interval and runs that take 70s
    let collector = Arc::new(TimedCollector::new(Duration::from_secs(70)));
    let scheduler = Scheduler::new(collector.clone(), Duration::from_secs(60), true);

    // When: The scheduler runs for a little over two runs
    scheduler.start();
    tokio::time::sleep(Duration::from_secs(150)).await;
    scheduler.stop_and_wait().await;

    // Then: Each run starts as soon as the previous ends and overruns are counted
    let gaps = collector.gaps();
    assert_eq!(gaps[..2], [Duration::from_secs(70), Duration::from_secs(70)]);
    assert!(scheduler.status().overruns >= 2);
}

// =============================================================================
// Scheduler: Start and Stop
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_start_is_called_twice_system_runs_a_single_loop() {
    // Given: A 10s interval with instant runs
    let collector = Arc::new(TimedCollector::new(Duration::ZERO));
    let scheduler = Scheduler::new(collector.clone(), Duration::from_secs(10), true);

    // When: start() is called twice in a row
    let first = scheduler.start();
    let second = scheduler.start();
    tokio::time::sleep(Duration::from_secs(35)).await;

    // Then: Only one loop ticks (t = 0, 10, 20, 30)
    assert!(first);
    assert!(!second);
    assert_eq!(collector.calls.load(Ordering::SeqCst), 4);
    assert!(scheduler.status().running);

    // And stop() leaves the scheduler not running
    assert!(scheduler.stop());
    assert!(!scheduler.status().running);
    scheduler.stop_and_wait().await;
}

#[tokio::test(start_paused = true)]
async fn when_stop_arrives_during_sleep_system_exits_without_waiting_the_interval() {
    // Given: An hour-long interval
    let collector = Arc::new(TimedCollector::new(Duration::ZERO));
    let scheduler = Scheduler::new(collector.clone(), Duration::from_secs(3600), true);
    scheduler.start();
    tokio::time::sleep(Duration::from_secs(1)).await;

    // When: The scheduler is stopped during its sleep
    let stop_requested = Instant::now();
    scheduler.stop_and_wait().await;

    // Then: The loop exits at once
    assert_eq!(stop_requested.elapsed(), Duration::ZERO);
    assert_eq!(collector.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn when_stop_arrives_mid_run_system_lets_the_run_finish() {
    // Given: Runs that take 30s
    let collector = Arc::new(TimedCollector::new(Duration::from_secs(30)));
    let scheduler = Scheduler::new(collector.clone(), Duration::from_secs(60), true);
    scheduler.start();
    tokio::time::sleep(Duration::from_secs(5)).await;

    // When: The scheduler is stopped while the first run is in flight
    scheduler.stop_and_wait().await;

    // Then: That run completed and no further run started
    assert_eq!(collector.finished.load(Ordering::SeqCst), 1);
    assert_eq!(collector.calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.status().cycle_count, 1);
}

#[tokio::test(start_paused = true)]
async fn when_restarted_after_stop_system_keeps_counting() {
    // Given: A scheduler that ran one cycle and was stopped
    let collector = Arc::new(TimedCollector::new(Duration::ZERO));
    let scheduler = Scheduler::new(collector.clone(), Duration::from_secs(10), true);
    scheduler.start();
    tokio::time::sleep(Duration::from_secs(1)).await;
    scheduler.stop();

    // When: It is started again
    let restarted = scheduler.start();
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Then: A new loop runs and the cycle count continues
    assert!(restarted);
    assert_eq!(scheduler.status().cycle_count, 2);
    scheduler.stop_and_wait().await;
}

// =============================================================================
// Scheduler: Failure Tolerance
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_a_cycle_panics_system_continues_with_the_next_tick() {
    // Given: A collector whose second run panics
    let collector = Arc::new(TimedCollector::new(Duration::from_secs(1)).panicking_on(2));
    let scheduler = Scheduler::new(collector.clone(), Duration::from_secs(10), true);

    // When: The scheduler runs across the failing tick
    scheduler.start();
    tokio::time::sleep(Duration::from_secs(35)).await;
    scheduler.stop_and_wait().await;

    // Then: Counting continued past the failure, which is recorded
    let status = scheduler.status();
    assert_eq!(status.cycle_count, 4);
    assert_eq!(status.failed_cycles, 1);
    assert_eq!(
        status.last_cycle.map(|cycle| cycle.outcome),
        Some(CycleOutcome::Success)
    );
    assert_eq!(collector.finished.load(Ordering::SeqCst), 3);
}
