//! Cascading price resolution.
//!
//! A [`PriceResolver`] walks an ordered chain of [`Strategy`] values, finest
//! data first, and stops at the first one that yields a usable observation
//! (present, finite, positive). Strategy failures never escape: they are
//! logged and the next strategy is tried. Exhausting the chain yields `None`.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::clock;
use crate::provider::{MarketDataProvider, SourceError};
use crate::{price_from_f64, Granularity, Period, QuoteSnapshot, Symbol};

/// Quote snapshot fields probed for a price, in priority order.
pub const QUOTE_PRICE_FIELDS: [&str; 8] = [
    "lastPrice",
    "last_price",
    "regularMarketPrice",
    "currentPrice",
    "previousClose",
    "previous_close",
    "regularMarketPreviousClose",
    "chartPreviousClose",
];

/// One way of obtaining a price from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Per-symbol history; take the last usable close.
    History {
        period: Period,
        granularity: Granularity,
    },
    /// Fast quote snapshot; take the first present field from [`QUOTE_PRICE_FIELDS`].
    Quote,
    /// Multi-symbol batch endpoint, requested for the one symbol.
    Batch {
        period: Period,
        granularity: Granularity,
    },
}

impl Strategy {
    pub const fn history(period: Period, granularity: Granularity) -> Self {
        Self::History {
            period,
            granularity,
        }
    }

    pub const fn batch(period: Period, granularity: Granularity) -> Self {
        Self::Batch {
            period,
            granularity,
        }
    }

    /// Default chain: intraday bars for today, then daily closes, then the quote
    /// snapshot, then longer daily lookbacks, then the batch path.
    pub fn default_chain() -> Vec<Self> {
        let mut chain = Granularity::INTRADAY
            .into_iter()
            .map(|granularity| Self::history(Period::OneDay, granularity))
            .collect::<Vec<_>>();
        chain.extend([
            Self::history(Period::FiveDays, Granularity::OneDay),
            Self::Quote,
            Self::history(Period::OneMonth, Granularity::OneDay),
            Self::history(Period::OneYear, Granularity::OneDay),
            Self::batch(Period::FiveDays, Granularity::OneDay),
            Self::batch(Period::OneMonth, Granularity::OneDay),
        ]);
        chain
    }

    /// Default chain with the given history query promoted to the front.
    pub fn chain_starting_with(period: Period, granularity: Granularity) -> Vec<Self> {
        let primary = Self::history(period, granularity);
        let mut chain = vec![primary.clone()];
        chain.extend(
            Self::default_chain()
                .into_iter()
                .filter(|strategy| *strategy != primary),
        );
        chain
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::History {
                period,
                granularity,
            } => write!(f, "history:{period}/{granularity}"),
            Self::Quote => f.write_str("quote"),
            Self::Batch {
                period,
                granularity,
            } => write!(f, "batch:{period}/{granularity}"),
        }
    }
}

/// A price obtained by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPrice {
    pub symbol: Symbol,
    pub price: Decimal,
    /// Label of the strategy that produced the price, e.g. `history:1d/5m`.
    pub strategy: String,
    /// Strategies tried, including the successful one.
    pub attempts: usize,
    pub latency_ms: u64,
}

pub struct PriceResolver {
    provider: Arc<dyn MarketDataProvider>,
    chain: Vec<Strategy>,
}

impl PriceResolver {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self::with_chain(provider, Strategy::default_chain())
    }

    pub fn with_chain(provider: Arc<dyn MarketDataProvider>, chain: Vec<Strategy>) -> Self {
        Self { provider, chain }
    }

    pub fn chain(&self) -> &[Strategy] {
        &self.chain
    }

    /// Best-effort current price for `symbol`, or `None` once every strategy failed.
    pub async fn resolve(&self, symbol: &Symbol) -> Option<ResolvedPrice> {
        let started = Instant::now();

        for (index, strategy) in self.chain.iter().enumerate() {
            match self.attempt(strategy, symbol).await {
                Ok(Some(price)) => {
                    tracing::debug!(
                        %symbol,
                        strategy = %strategy,
                        attempts = index + 1,
                        %price,
                        "resolved price"
                    );
                    return Some(ResolvedPrice {
                        symbol: symbol.clone(),
                        price,
                        strategy: strategy.to_string(),
                        attempts: index + 1,
                        latency_ms: clock::millis(started.elapsed()),
                    });
                }
                Ok(None) => {
                    tracing::debug!(%symbol, strategy = %strategy, "no usable observation");
                }
                Err(error) => {
                    tracing::debug!(
                        %symbol,
                        strategy = %strategy,
                        provider = self.provider.name(),
                        code = error.code(),
                        error = %error.message(),
                        "strategy failed"
                    );
                }
            }
        }

        tracing::warn!(
            %symbol,
            attempts = self.chain.len(),
            "no strategy produced a usable price"
        );
        None
    }

    async fn attempt(
        &self,
        strategy: &Strategy,
        symbol: &Symbol,
    ) -> Result<Option<Decimal>, SourceError> {
        let observation = match *strategy {
            Strategy::History {
                period,
                granularity,
            } => self
                .provider
                .history(symbol, period, granularity)
                .await?
                .last_usable(),
            Strategy::Quote => {
                let snapshot = self.provider.quote_snapshot(symbol).await?;
                price_field(&snapshot)
            }
            Strategy::Batch {
                period,
                granularity,
            } => self
                .provider
                .batch_history(std::slice::from_ref(symbol), period, granularity)
                .await?
                .remove(symbol)
                .and_then(|series| series.last_usable()),
        };

        Ok(observation.and_then(price_from_f64))
    }
}

/// Value of the first present alias in the snapshot. A present but unusable value
/// ends the search; later aliases are not consulted.
fn price_field(snapshot: &QuoteSnapshot) -> Option<f64> {
    QUOTE_PRICE_FIELDS
        .iter()
        .find_map(|field| snapshot.get(*field).filter(|value| !value.is_null()))
        .and_then(serde_json::Value::as_f64)
}
