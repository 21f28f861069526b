//! # Pricetap Warehouse
//!
//! DuckDB-backed storage for collected price points.
//!
//! ## Overview
//!
//! The warehouse owns one table, `price_points`, and exposes the handful of
//! operations the collector needs:
//!
//! - **Bulk insert**: one transaction per batch, all-or-nothing
//! - **Latest price per symbol**: newest row by timestamp for each symbol
//! - **Liveness**: a cheap probe used before every write
//!
//! All values are bound as statement parameters, never interpolated.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pricetap_warehouse::{PriceRecord, Warehouse, WarehouseConfig};
//! use rust_decimal::Decimal;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open(WarehouseConfig::default())?;
//!
//!     warehouse.insert_prices(&[PriceRecord {
//!         symbol: String::from("AAPL"),
//!         price: Decimal::new(1_893_100, 4),
//!         timestamp: String::from("2024-03-05 15:00:00"),
//!     }])?;
//!
//!     for row in warehouse.latest_prices(None)? {
//!         println!("{} {} {}", row.symbol, row.price, row.timestamp);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `price_points` | One row per collected (symbol, price, timestamp) |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ::duckdb::{params_from_iter, Connection, ToSql};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

pub use duckdb::{DuckDbConnectionManager, PooledConnection};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The warehouse was closed and no longer accepts operations.
    #[error("warehouse connection is closed")]
    Disconnected,

    /// A row was rejected before reaching the database, or could not be decoded.
    #[error("invalid price data: {0}")]
    InvalidData(String),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            db_path: resolve_pricetap_home().join("prices.duckdb"),
            max_pool_size: 4,
        }
    }
}

/// A price point ready to be written.
///
/// `timestamp` is a UTC wall-clock string in `YYYY-MM-DD HH:MM:SS` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRecord {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: String,
}

/// Newest stored price for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestPriceRecord {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: String,
}

/// The main warehouse interface for price storage.
#[derive(Clone)]
pub struct Warehouse {
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Open a warehouse, creating the parent directory and applying migrations.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = DuckDbConnectionManager::open(config.db_path, config.max_pool_size)?;
        let warehouse = Self { manager };
        warehouse.initialize()?;
        tracing::info!(path = %warehouse.db_path().display(), "warehouse opened");
        Ok(warehouse)
    }

    /// Initialize the database schema.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Report whether the database currently answers a trivial query.
    pub fn is_connected(&self) -> bool {
        if self.manager.is_closed() {
            return false;
        }

        match self.manager.acquire() {
            Ok(connection) => connection
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Release every connection. Later operations fail with [`WarehouseError::Disconnected`].
    pub fn close(&self) {
        self.manager.close();
        tracing::info!("warehouse closed");
    }

    /// Insert a batch of price points inside one transaction.
    ///
    /// An empty batch is a successful no-op. Any failing row rolls back the whole batch.
    pub fn insert_prices(&self, rows: &[PriceRecord]) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        if let Some(row) = rows.iter().find(|row| row.price <= Decimal::ZERO) {
            return Err(WarehouseError::InvalidData(format!(
                "price for '{}' must be positive, got {}",
                row.symbol, row.price
            )));
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let mut statement = connection.prepare(
                "INSERT INTO price_points (symbol, price, ts) \
                 VALUES (?, CAST(? AS DECIMAL(18, 4)), CAST(? AS TIMESTAMP))",
            )?;

            for row in rows {
                let price = row.price.to_string();
                let params: [&dyn ToSql; 3] = [&row.symbol, &price, &row.timestamp];
                statement.execute(params.as_slice())?;
            }

            Ok(rows.len())
        })();

        finalize_transaction(&connection, result)
    }

    /// Newest row per symbol, ordered by symbol.
    ///
    /// `None` returns every stored symbol; `Some(&[])` returns nothing.
    pub fn latest_prices(
        &self,
        symbols: Option<&[String]>,
    ) -> Result<Vec<LatestPriceRecord>, WarehouseError> {
        if matches!(symbols, Some(filter) if filter.is_empty()) {
            return Ok(Vec::new());
        }

        let filter_clause = match symbols {
            Some(filter) => format!(
                "WHERE symbol IN ({})",
                vec!["?"; filter.len()].join(", ")
            ),
            None => String::new(),
        };
        let sql = format!(
            "SELECT symbol, CAST(price AS VARCHAR), strftime(ts, '%Y-%m-%d %H:%M:%S') \
             FROM ( \
                 SELECT symbol, price, ts, \
                        ROW_NUMBER() OVER ( \
                            PARTITION BY symbol ORDER BY ts DESC, created_at DESC \
                        ) AS row_rank \
                 FROM price_points {filter_clause} \
             ) ranked \
             WHERE row_rank = 1 \
             ORDER BY symbol"
        );

        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(&sql)?;
        let raw_rows = statement
            .query_map(params_from_iter(symbols.unwrap_or_default()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw_rows
            .into_iter()
            .map(|(symbol, price, timestamp)| {
                let price = Decimal::from_str(&price).map_err(|error| {
                    WarehouseError::InvalidData(format!(
                        "stored price '{price}' for '{symbol}' is not decimal: {error}"
                    ))
                })?;
                Ok(LatestPriceRecord {
                    symbol,
                    price,
                    timestamp,
                })
            })
            .collect()
    }

    /// Total number of stored price points.
    pub fn price_count(&self) -> Result<u64, WarehouseError> {
        let connection = self.manager.acquire()?;
        let count: i64 =
            connection.query_row("SELECT COUNT(*) FROM price_points", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Resolve the pricetap home directory from environment or default.
fn resolve_pricetap_home() -> PathBuf {
    if let Some(path) = env::var_os("PRICETAP_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".pricetap");
    }

    PathBuf::from(".pricetap")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_warehouse(temp: &tempfile::TempDir) -> Warehouse {
        Warehouse::open(WarehouseConfig {
            db_path: temp.path().join("data").join("prices.duckdb"),
            max_pool_size: 2,
        })
        .expect("warehouse open")
    }

    fn record(symbol: &str, price: &str, timestamp: &str) -> PriceRecord {
        PriceRecord {
            symbol: symbol.to_owned(),
            price: Decimal::from_str(price).expect("decimal"),
            timestamp: timestamp.to_owned(),
        }
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);

        assert_eq!(warehouse.insert_prices(&[]).expect("insert"), 0);
        assert_eq!(warehouse.price_count().expect("count"), 0);
    }

    #[test]
    fn latest_prices_pick_newest_timestamp_per_symbol() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);

        warehouse
            .insert_prices(&[
                record("AAPL", "189.3100", "2024-03-05 15:00:00"),
                record("MSFT", "402.1000", "2024-03-05 15:00:00"),
            ])
            .expect("first batch");
        warehouse
            .insert_prices(&[record("AAPL", "190.0500", "2024-03-05 15:00:10")])
            .expect("second batch");

        let latest = warehouse.latest_prices(None).expect("latest");

        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].symbol, "AAPL");
        assert_eq!(latest[0].price, Decimal::from_str("190.05").expect("decimal"));
        assert_eq!(latest[0].timestamp, "2024-03-05 15:00:10");
        assert_eq!(latest[1].symbol, "MSFT");
    }

    #[test]
    fn latest_prices_honours_symbol_filter() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);
        warehouse
            .insert_prices(&[
                record("AAPL", "189.31", "2024-03-05 15:00:00"),
                record("005930.KS", "73400", "2024-03-05 05:00:00"),
            ])
            .expect("insert");

        let filtered = warehouse
            .latest_prices(Some(&[String::from("005930.KS")]))
            .expect("filtered");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].symbol, "005930.KS");

        let none = warehouse.latest_prices(Some(&[])).expect("empty filter");
        assert!(none.is_empty());
    }

    #[test]
    fn stored_prices_keep_their_decimal_value() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);
        warehouse
            .insert_prices(&[record("NVDA", "875.1234", "2024-03-05 15:00:00")])
            .expect("insert");

        let latest = warehouse.latest_prices(None).expect("latest");
        assert_eq!(latest[0].price, Decimal::from_str("875.1234").expect("decimal"));
    }

    #[test]
    fn non_positive_price_rejects_whole_batch() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);

        let error = warehouse
            .insert_prices(&[
                record("AAPL", "189.31", "2024-03-05 15:00:00"),
                record("TSLA", "0", "2024-03-05 15:00:00"),
            ])
            .expect_err("must reject");

        assert!(matches!(error, WarehouseError::InvalidData(_)));
        assert_eq!(warehouse.price_count().expect("count"), 0);
    }

    #[test]
    fn malformed_timestamp_rolls_back_transaction() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);

        let error = warehouse
            .insert_prices(&[
                record("AAPL", "189.31", "2024-03-05 15:00:00"),
                record("MSFT", "402.10", "not-a-timestamp"),
            ])
            .expect_err("must fail");

        assert!(matches!(error, WarehouseError::DuckDb(_)));
        assert_eq!(warehouse.price_count().expect("count"), 0);
    }

    #[test]
    fn closed_warehouse_reports_disconnected() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);
        assert!(warehouse.is_connected());

        warehouse.close();

        assert!(!warehouse.is_connected());
        let error = warehouse
            .insert_prices(&[record("AAPL", "189.31", "2024-03-05 15:00:00")])
            .expect_err("closed");
        assert!(matches!(error, WarehouseError::Disconnected));
    }
}
