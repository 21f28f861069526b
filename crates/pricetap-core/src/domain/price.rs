use std::collections::BTreeMap;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{Symbol, UtcDateTime, ValidationError};

/// Fractional digits kept for every stored price.
pub const PRICE_SCALE: u32 = 4;

/// True when an upstream observation can be used as a price.
pub fn is_usable_price(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Convert a usable observation into a decimal rounded to [`PRICE_SCALE`] digits.
pub fn price_from_f64(value: f64) -> Option<Decimal> {
    if !is_usable_price(value) {
        return None;
    }

    let price = Decimal::from_f64(value)?
        .round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    (price > Decimal::ZERO).then_some(price)
}

/// One collected price, stamped with the collection run's start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricePoint {
    symbol: Symbol,
    price: Decimal,
    timestamp: UtcDateTime,
}

impl PricePoint {
    pub fn new(symbol: Symbol, price: Decimal, timestamp: UtcDateTime) -> Result<Self, ValidationError> {
        if price <= Decimal::ZERO {
            return Err(ValidationError::InvalidPrice {
                symbol: symbol.to_string(),
                value: price,
            });
        }

        Ok(Self {
            symbol,
            price: price.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero),
            timestamp,
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn timestamp(&self) -> UtcDateTime {
        self.timestamp
    }
}

/// Newest stored price for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPrice {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: String,
}

/// Close observations returned by a history request, oldest first.
///
/// Missing bars stay in the series as `None`; NaN is kept as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    pub timestamps: Vec<i64>,
    pub closes: Vec<Option<f64>>,
}

impl PriceSeries {
    pub fn from_closes(closes: Vec<Option<f64>>) -> Self {
        Self {
            timestamps: Vec::new(),
            closes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    /// The most recent observation that is present, finite and positive.
    pub fn last_usable(&self) -> Option<f64> {
        self.closes
            .iter()
            .rev()
            .flatten()
            .copied()
            .find(|value| is_usable_price(*value))
    }
}

/// Loosely-typed fast quote payload keyed by upstream field name.
pub type QuoteSnapshot = BTreeMap<String, serde_json::Value>;
