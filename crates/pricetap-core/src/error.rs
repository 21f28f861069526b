use rust_decimal::Decimal;
use thiserror::Error;

/// Validation errors for domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("exchange code must be 1-8 uppercase ASCII letters: '{value}'")]
    InvalidExchangeCode { value: String },

    #[error("invalid granularity '{value}', expected one of 1m, 2m, 5m, 15m, 1d")]
    InvalidGranularity { value: String },
    #[error("invalid period '{value}', expected one of 1d, 5d, 1mo, 1y")]
    InvalidPeriod { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("price for '{symbol}' must be positive, got {value}")]
    InvalidPrice { symbol: String, value: Decimal },
}

/// Startup configuration errors. Every variant is fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unknown timezone '{timezone}' for exchange '{exchange}'")]
    UnknownTimezone { exchange: String, timezone: String },

    #[error("invalid {field} time '{value}' for exchange '{exchange}', expected HH:MM")]
    InvalidTimeOfDay {
        exchange: String,
        field: &'static str,
        value: String,
    },

    #[error("exchange '{exchange}' opens at {open} but closes at {close}")]
    OpenNotBeforeClose {
        exchange: String,
        open: String,
        close: String,
    },

    #[error("invalid weekend day '{value}' for exchange '{exchange}'")]
    InvalidWeekday { exchange: String, value: String },

    #[error("exchange '{exchange}' must name two distinct weekend days, got {count}")]
    WeekendDays { exchange: String, count: usize },

    #[error("symbol '{symbol}' maps to exchange '{exchange}' which has no trading hours")]
    UnknownExchange { symbol: String, exchange: String },

    #[error("symbol '{symbol}' is listed under both '{first}' and '{second}'")]
    DuplicateSymbol {
        symbol: String,
        first: String,
        second: String,
    },

    #[error("target symbol '{symbol}' is not in the instrument registry")]
    TargetNotRegistered { symbol: String },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
}

/// Persistence gateway errors surfaced to the collector.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("price store is not connected")]
    Disconnected,

    #[error("price store failure: {0}")]
    Backend(String),
}

impl From<pricetap_warehouse::WarehouseError> for StoreError {
    fn from(error: pricetap_warehouse::WarehouseError) -> Self {
        match error {
            pricetap_warehouse::WarehouseError::Disconnected => Self::Disconnected,
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Warehouse(#[from] pricetap_warehouse::WarehouseError),

    #[error("http client error: {0}")]
    HttpClient(String),
}
