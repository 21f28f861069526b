use pricetap_warehouse::{PriceRecord, Warehouse};

use crate::{LatestPrice, PricePoint, StoreError, Symbol};

/// Persistence gateway used by the collector.
///
/// Implementations are blocking; async callers move calls onto the blocking pool.
pub trait PriceStore: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Write the whole batch or nothing. An empty batch succeeds without touching storage.
    fn bulk_insert(&self, points: &[PricePoint]) -> Result<usize, StoreError>;

    /// Newest stored price per symbol; `None` means every symbol.
    fn latest_prices(&self, symbols: Option<&[Symbol]>) -> Result<Vec<LatestPrice>, StoreError>;

    fn close(&self) {}
}

impl PriceStore for Warehouse {
    fn is_connected(&self) -> bool {
        Warehouse::is_connected(self)
    }

    fn bulk_insert(&self, points: &[PricePoint]) -> Result<usize, StoreError> {
        let records = points
            .iter()
            .map(|point| PriceRecord {
                symbol: point.symbol().to_string(),
                price: point.price(),
                timestamp: point.timestamp().format_storage(),
            })
            .collect::<Vec<_>>();

        Ok(self.insert_prices(&records)?)
    }

    fn latest_prices(&self, symbols: Option<&[Symbol]>) -> Result<Vec<LatestPrice>, StoreError> {
        let filter = symbols.map(|symbols| {
            symbols
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        });

        let rows = Warehouse::latest_prices(self, filter.as_deref())?;
        Ok(rows
            .into_iter()
            .map(|row| LatestPrice {
                symbol: row.symbol,
                price: row.price,
                timestamp: row.timestamp,
            })
            .collect())
    }

    fn close(&self) {
        Warehouse::close(self);
    }
}

/// Stand-in used when the database could not be opened at startup.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisconnectedStore;

impl PriceStore for DisconnectedStore {
    fn is_connected(&self) -> bool {
        false
    }

    fn bulk_insert(&self, points: &[PricePoint]) -> Result<usize, StoreError> {
        if points.is_empty() {
            return Ok(0);
        }
        Err(StoreError::Disconnected)
    }

    fn latest_prices(&self, _symbols: Option<&[Symbol]>) -> Result<Vec<LatestPrice>, StoreError> {
        Err(StoreError::Disconnected)
    }
}
