//! Upstream market-data provider contract.
//!
//! A provider answers three kinds of request: a per-symbol price history, a
//! loosely-typed quote snapshot, and a multi-symbol batch history. Empty or
//! partially populated payloads are valid answers; only transport, protocol
//! and decoding problems are errors.

pub mod yahoo;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::{Granularity, Period, PriceSeries, QuoteSnapshot, Symbol};

pub use yahoo::{YahooAuthManager, YahooProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceErrorKind {
    Unavailable,
    RateLimited,
    InvalidRequest,
    Internal,
}

/// Structured provider failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Upstream data source used by the price resolver.
pub trait MarketDataProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Close series for one symbol.
    fn history<'a>(
        &'a self,
        symbol: &'a Symbol,
        period: Period,
        granularity: Granularity,
    ) -> ProviderFuture<'a, PriceSeries>;

    /// Fast quote snapshot for one symbol.
    fn quote_snapshot<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, QuoteSnapshot>;

    /// Close series for several symbols through the provider's batch endpoint.
    ///
    /// Symbols the provider knows nothing about are simply absent from the map.
    fn batch_history<'a>(
        &'a self,
        symbols: &'a [Symbol],
        period: Period,
        granularity: Granularity,
    ) -> ProviderFuture<'a, BTreeMap<Symbol, PriceSeries>>;
}
