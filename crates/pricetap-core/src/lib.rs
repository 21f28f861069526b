//! # Pricetap Core
//!
//! Acquisition pipeline for periodic last-price sampling across exchanges.
//!
//! ## Overview
//!
//! - **Exchange calendar** deciding which instruments are eligible right now
//! - **Fallback price resolver** walking a chain of provider strategies
//! - **Collection run** fanning resolution out over the eligible symbols
//! - **Scheduler** holding a fixed cadence across runs
//! - **Price store** seam over the DuckDB warehouse
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`calendar`] | Trading hours, instrument registry, target set |
//! | [`circuit_breaker`] | Circuit breaker for upstream calls |
//! | [`clock`] | Injectable time source |
//! | [`collector`] | One collect-and-persist run |
//! | [`config`] | Layered settings and validation |
//! | [`domain`] | Symbols, timestamps, prices |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP transport seam |
//! | [`provider`] | Market data provider trait and Yahoo implementation |
//! | [`resolver`] | Cascading price resolution |
//! | [`scheduler`] | Drift-corrected periodic loop |
//! | [`service`] | Facade used by the CLI |
//! | [`store`] | Persistence gateway trait |
//! | [`throttling`] | Request rate limiting |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Scheduler     │
//! └────────┬────────┘
//!          │ every tick
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Collection Run  │────▶│ Exchange Calendar│
//! └────────┬────────┘     └──────────────────┘
//!          │ per symbol
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Price Resolver  │────▶│ Yahoo Provider   │
//! └────────┬────────┘     └──────────────────┘
//!          │ batch
//!          ▼
//! ┌─────────────────┐
//! │   Price Store   │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Upstream failures never escape the resolver; a symbol that cannot be
//! priced is simply missing from the run. Storage problems are reported in
//! the run outcome. Only [`ConfigError`] is fatal.

pub mod calendar;
pub mod circuit_breaker;
pub mod clock;
pub mod collector;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod provider;
pub mod resolver;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod throttling;

// Calendar
pub use calendar::{ExchangeCalendar, ExchangeHours, ExchangeStatus, InstrumentRegistry, TargetSet};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use clock::{Clock, FixedClock, SystemClock};

// Collection and scheduling
pub use collector::{Collect, CollectionOutcome, CollectionStatus, Collector};
pub use scheduler::{CycleOutcome, CycleReport, Scheduler, SchedulerStatus};

pub use config::{Settings, Universe};

// Domain models
pub use domain::{
    is_usable_price, price_from_f64, ExchangeCode, Granularity, LatestPrice, Period, PricePoint,
    PriceSeries, QuoteSnapshot, Symbol, UtcDateTime, PRICE_SCALE,
};

// Error types
pub use error::{ConfigError, CoreError, StoreError, ValidationError};

// HTTP client types
pub use http_client::{HttpClient, HttpClientConfig, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

// Providers
pub use provider::{MarketDataProvider, ProviderFuture, SourceError, SourceErrorKind, YahooProvider};

pub use resolver::{PriceResolver, ResolvedPrice, Strategy};
pub use service::{CalendarStatus, HealthReport, PipelineOptions, PriceService, SymbolEntry, SymbolListing};
pub use store::{DisconnectedStore, PriceStore};
pub use throttling::RequestThrottle;

// Warehouse (re-exported from pricetap-warehouse)
pub use pricetap_warehouse::{Warehouse, WarehouseConfig, WarehouseError};
