//! One collection run: pick candidates, resolve each, persist the batch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::calendar::{ExchangeCalendar, InstrumentRegistry, TargetSet};
use crate::clock::{self, Clock};
use crate::resolver::{PriceResolver, ResolvedPrice};
use crate::store::PriceStore;
use crate::{PricePoint, StoreError, Symbol, UtcDateTime};

/// How the persistence step of a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CollectionStatus {
    /// Batch stored, or there was nothing to store.
    Success,
    /// Storage failed its liveness check; the batch was dropped.
    StorageUnavailable,
    /// Storage rejected the batch.
    StorageFailed(String),
}

/// Summary of a single collection run.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionOutcome {
    pub started_at: UtcDateTime,
    pub force_all: bool,
    pub candidates: Vec<Symbol>,
    pub resolved: Vec<ResolvedPrice>,
    pub missing: Vec<Symbol>,
    pub persisted: usize,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub status: CollectionStatus,
}

impl CollectionOutcome {
    /// Every resolved point reached storage.
    pub fn is_complete(&self) -> bool {
        self.status == CollectionStatus::Success
    }
}

/// Anything the scheduler can drive once per tick.
pub trait Collect: Send + Sync + 'static {
    fn collect(&self, force_all: bool) -> Pin<Box<dyn Future<Output = CollectionOutcome> + Send + '_>>;
}

pub struct Collector {
    calendar: Arc<ExchangeCalendar>,
    registry: Arc<InstrumentRegistry>,
    targets: Arc<TargetSet>,
    resolver: Arc<PriceResolver>,
    store: Arc<dyn PriceStore>,
    clock: Arc<dyn Clock>,
    max_concurrency: usize,
}

impl Collector {
    pub fn new(
        calendar: Arc<ExchangeCalendar>,
        registry: Arc<InstrumentRegistry>,
        targets: Arc<TargetSet>,
        resolver: Arc<PriceResolver>,
        store: Arc<dyn PriceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            calendar,
            registry,
            targets,
            resolver,
            store,
            clock,
            max_concurrency: 4,
        }
    }

    /// Bound on symbols resolved at the same time.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Symbols a run would collect at `now`.
    ///
    /// Forced runs, and runs while every exchange is closed, take the whole target
    /// set; otherwise only targets whose exchange is open.
    pub fn candidates(&self, force_all: bool, now: UtcDateTime) -> Vec<Symbol> {
        let active = self.calendar.active_symbols(&self.registry, now);

        if force_all || active.is_empty() {
            self.targets
                .iter()
                .filter(|symbol| self.registry.contains(symbol))
                .cloned()
                .collect()
        } else {
            active
                .into_iter()
                .filter(|symbol| self.targets.contains(symbol))
                .collect()
        }
    }

    pub async fn run(&self, force_all: bool) -> CollectionOutcome {
        let started = Instant::now();
        let started_at = self.clock.now();
        let candidates = self.candidates(force_all, started_at);

        if candidates.is_empty() {
            tracing::info!(force_all, "no candidate symbols, nothing to collect");
            return CollectionOutcome {
                started_at,
                force_all,
                candidates,
                resolved: Vec::new(),
                missing: Vec::new(),
                persisted: 0,
                duration_ms: elapsed_ms(started),
                status: CollectionStatus::Success,
            };
        }

        tracing::info!(
            force_all,
            candidates = candidates.len(),
            "collecting prices"
        );

        let results = stream::iter(candidates.clone())
            .map(|symbol| {
                let resolver = Arc::clone(&self.resolver);
                async move { resolver.resolve(&symbol).await }
            })
            .buffered(self.max_concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut resolved = Vec::with_capacity(results.len());
        let mut missing = Vec::new();
        let mut points = Vec::with_capacity(results.len());
        for (symbol, result) in candidates.iter().zip(results) {
            let Some(price) = result else {
                missing.push(symbol.clone());
                continue;
            };
            match PricePoint::new(symbol.clone(), price.price, started_at) {
                Ok(point) => {
                    points.push(point);
                    resolved.push(price);
                }
                Err(error) => {
                    tracing::warn!(%symbol, %error, "discarding resolved price");
                    missing.push(symbol.clone());
                }
            }
        }

        let (persisted, status) = self.persist(points).await;

        let outcome = CollectionOutcome {
            started_at,
            force_all,
            candidates,
            resolved,
            missing,
            persisted,
            duration_ms: elapsed_ms(started),
            status,
        };
        tracing::info!(
            candidates = outcome.candidates.len(),
            resolved = outcome.resolved.len(),
            missing = outcome.missing.len(),
            persisted = outcome.persisted,
            duration_ms = outcome.duration_ms,
            "collection run finished"
        );
        outcome
    }

    async fn persist(&self, points: Vec<PricePoint>) -> (usize, CollectionStatus) {
        if points.is_empty() {
            tracing::warn!("no prices resolved, skipping write");
            return (0, CollectionStatus::Success);
        }

        let store = Arc::clone(&self.store);
        let write = tokio::task::spawn_blocking(move || {
            if !store.is_connected() {
                return Err(StoreError::Disconnected);
            }
            store.bulk_insert(&points)
        })
        .await;

        match write {
            Ok(Ok(persisted)) => {
                tracing::info!(persisted, "stored price batch");
                (persisted, CollectionStatus::Success)
            }
            Ok(Err(StoreError::Disconnected)) => {
                tracing::warn!("price store unavailable, skipping write");
                (0, CollectionStatus::StorageUnavailable)
            }
            Ok(Err(error)) => {
                tracing::error!(%error, "failed to store price batch");
                (0, CollectionStatus::StorageFailed(error.to_string()))
            }
            Err(error) => {
                tracing::error!(%error, "price store task aborted");
                (0, CollectionStatus::StorageFailed(error.to_string()))
            }
        }
    }
}

impl Collect for Collector {
    fn collect(&self, force_all: bool) -> Pin<Box<dyn Future<Output = CollectionOutcome> + Send + '_>> {
        Box::pin(self.run(force_all))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    clock::millis(started.elapsed())
}
