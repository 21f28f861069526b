//! `DuckDB` connection pool management.
//!
//! All pooled connections are cloned from one primary handle so they share a
//! single database instance. Closing the pool drops every handle and makes
//! later acquisitions fail with [`WarehouseError::Disconnected`].

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ::duckdb::Connection;

use crate::WarehouseError;

struct PoolState {
    primary: Option<Connection>,
    idle: Vec<Connection>,
}

struct PoolInner {
    db_path: PathBuf,
    max_pool_size: usize,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A connection pool manager for `DuckDB` connections.
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    inner: Arc<PoolInner>,
}

impl DuckDbConnectionManager {
    /// Open the database file and create a pool around it.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or configured.
    pub fn open(path: impl Into<PathBuf>, max_pool_size: usize) -> Result<Self, WarehouseError> {
        let db_path = path.into();
        let primary = Connection::open(&db_path)?;
        configure_connection(&primary)?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                db_path,
                max_pool_size: max_pool_size.max(1),
                state: Mutex::new(PoolState {
                    primary: Some(primary),
                    idle: Vec::new(),
                }),
            }),
        })
    }

    /// Acquire a connection from the pool, cloning a new handle when none is idle.
    ///
    /// # Errors
    /// Returns [`WarehouseError::Disconnected`] once the pool has been closed.
    pub fn acquire(&self) -> Result<PooledConnection, WarehouseError> {
        let mut state = self.inner.lock();
        let connection = match state.idle.pop() {
            Some(connection) => connection,
            None => {
                let primary = state.primary.as_ref().ok_or(WarehouseError::Disconnected)?;
                let connection = primary.try_clone()?;
                configure_connection(&connection)?;
                connection
            }
        };
        drop(state);

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    /// Drop the primary handle and every idle connection.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        state.idle.clear();
        state.primary = None;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().primary.is_none()
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.inner.db_path.as_path()
    }
}

/// A pooled connection that returns to the pool when dropped.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        match self.connection.as_ref() {
            Some(connection) => connection,
            None => unreachable!("pooled connection is only taken on drop"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.connection.as_mut() {
            Some(connection) => connection,
            None => unreachable!("pooled connection is only taken on drop"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let mut state = self.pool.lock();
        // A closed pool must not be resurrected by connections still in flight.
        if state.primary.is_some() && state.idle.len() < self.pool.max_pool_size {
            state.idle.push(connection);
        }
    }
}

fn configure_connection(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")
}
