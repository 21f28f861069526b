mod interval;
mod price;
mod symbol;
mod timestamp;

pub use interval::{Granularity, Period};
pub use price::{
    is_usable_price, price_from_f64, LatestPrice, PricePoint, PriceSeries, QuoteSnapshot,
    PRICE_SCALE,
};
pub use symbol::{ExchangeCode, Symbol};
pub use timestamp::UtcDateTime;
