//! Facade over the acquisition pipeline.
//!
//! Every shared component is built once here and handed out as an `Arc`.
//! The accessors are thin; no pipeline logic lives in this module.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::calendar::{ExchangeCalendar, ExchangeStatus, InstrumentRegistry, TargetSet};
use crate::circuit_breaker::CircuitBreaker;
use crate::clock::{Clock, SystemClock};
use crate::collector::{CollectionOutcome, Collector};
use crate::config::{Settings, Universe};
use crate::http_client::ReqwestHttpClient;
use crate::provider::{MarketDataProvider, YahooProvider};
use crate::resolver::{PriceResolver, Strategy};
use crate::scheduler::{Scheduler, SchedulerStatus};
use crate::store::{DisconnectedStore, PriceStore};
use crate::throttling::RequestThrottle;
use crate::{CoreError, ExchangeCode, LatestPrice, StoreError, Symbol, UtcDateTime};

/// Runtime knobs for [`PriceService::assemble`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub interval: Duration,
    pub force_all: bool,
    pub max_concurrency: usize,
    pub chain: Vec<Strategy>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            force_all: true,
            max_concurrency: 4,
            chain: Strategy::default_chain(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarStatus {
    pub timestamp: UtcDateTime,
    pub exchanges: Vec<ExchangeStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolEntry {
    pub symbol: Symbol,
    pub exchange: ExchangeCode,
    pub target: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolListing {
    pub symbols: Vec<SymbolEntry>,
    pub exchanges: Vec<ExchangeCode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub database_connected: bool,
    pub scheduler_running: bool,
}

pub struct PriceService {
    calendar: Arc<ExchangeCalendar>,
    registry: Arc<InstrumentRegistry>,
    targets: Arc<TargetSet>,
    store: Arc<dyn PriceStore>,
    collector: Arc<Collector>,
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
}

impl PriceService {
    /// Build the production pipeline: Yahoo over reqwest, DuckDB storage.
    ///
    /// A database that cannot be opened is logged and replaced with a
    /// [`DisconnectedStore`]; collection still runs without writes.
    pub fn from_settings(settings: &Settings) -> Result<Self, CoreError> {
        let universe = settings.validate()?;
        let interval = settings.collection_interval()?;

        let http_client = ReqwestHttpClient::new(&settings.provider.http_client_config())?;
        let provider = YahooProvider::new(
            Arc::new(http_client),
            Arc::new(CircuitBreaker::new(
                settings.provider.circuit_breaker_config(),
            )),
            RequestThrottle::per_minute(settings.provider.requests_per_minute),
            settings.provider.timeout_ms,
        );

        let warehouse_config = settings.warehouse.warehouse_config();
        let store: Arc<dyn PriceStore> =
            match pricetap_warehouse::Warehouse::open(warehouse_config.clone()) {
                Ok(warehouse) => Arc::new(warehouse),
                Err(error) => {
                    tracing::warn!(
                        path = %warehouse_config.db_path.display(),
                        %error,
                        "price store unavailable, continuing without persistence"
                    );
                    Arc::new(DisconnectedStore)
                }
            };

        Ok(Self::assemble(
            universe,
            Arc::new(provider),
            store,
            Arc::new(SystemClock),
            PipelineOptions {
                interval,
                force_all: settings.collection.force_all,
                max_concurrency: settings.collection.max_concurrency,
                chain: settings.provider.strategy_chain(),
            },
        ))
    }

    /// Wire the pipeline from already-built parts.
    pub fn assemble(
        universe: Universe,
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn PriceStore>,
        clock: Arc<dyn Clock>,
        options: PipelineOptions,
    ) -> Self {
        let calendar = Arc::new(universe.calendar);
        let registry = Arc::new(universe.registry);
        let targets = Arc::new(universe.targets);
        let resolver = Arc::new(PriceResolver::with_chain(provider, options.chain));

        let collector = Arc::new(
            Collector::new(
                Arc::clone(&calendar),
                Arc::clone(&registry),
                Arc::clone(&targets),
                resolver,
                Arc::clone(&store),
                Arc::clone(&clock),
            )
            .with_max_concurrency(options.max_concurrency),
        );
        let scheduler = Scheduler::new(collector.clone(), options.interval, options.force_all);

        Self {
            calendar,
            registry,
            targets,
            store,
            collector,
            scheduler,
            clock,
        }
    }

    pub fn start_scheduler(&self) -> bool {
        self.scheduler.start()
    }

    pub fn stop_scheduler(&self) -> bool {
        self.scheduler.stop()
    }

    /// Stop the loop, wait for its last run, then release storage.
    pub async fn shutdown(&self) {
        self.scheduler.stop_and_wait().await;
        let store = Arc::clone(&self.store);
        if let Err(error) = tokio::task::spawn_blocking(move || store.close()).await {
            tracing::warn!(%error, "failed to close price store");
        }
    }

    pub fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    pub fn calendar_status(&self) -> CalendarStatus {
        let now = self.clock.now();
        CalendarStatus {
            timestamp: now,
            exchanges: self.calendar.exchange_reports(now),
        }
    }

    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.calendar
            .active_symbols(&self.registry, self.clock.now())
    }

    /// One collection run outside the scheduler's cadence.
    pub async fn collect_now(&self, force_all: bool) -> CollectionOutcome {
        self.collector.run(force_all).await
    }

    pub async fn latest_prices(
        &self,
        symbols: Option<Vec<Symbol>>,
    ) -> Result<Vec<LatestPrice>, StoreError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.latest_prices(symbols.as_deref()))
            .await
            .map_err(|error| StoreError::Backend(error.to_string()))?
    }

    pub fn symbols(&self) -> SymbolListing {
        SymbolListing {
            symbols: self
                .registry
                .iter()
                .map(|(symbol, exchange)| SymbolEntry {
                    symbol: symbol.clone(),
                    exchange: exchange.clone(),
                    target: self.targets.contains(symbol),
                })
                .collect(),
            exchanges: self.calendar.exchanges().cloned().collect(),
        }
    }

    pub async fn health(&self) -> HealthReport {
        let store = Arc::clone(&self.store);
        let database_connected = tokio::task::spawn_blocking(move || store.is_connected())
            .await
            .unwrap_or(false);
        let scheduler_running = self.scheduler.is_running();

        HealthReport {
            healthy: database_connected && scheduler_running,
            database_connected,
            scheduler_running,
        }
    }
}
