//! Durable storage for quotedeck: watchlist items, price alerts, alert
//! trigger events, and last-known-good market snapshots, all in one DuckDB
//! file behind a small connection pool.

pub mod duckdb;
pub mod migrations;

mod alerts;
mod lkg;
mod watchlist;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::Connection;
use thiserror::Error;

pub use crate::duckdb::{ConnectionPool, PooledConnection};
pub use alerts::{AlertFilter, AlertSpec, AlertUpdate, EventQuery, NewAlert};
pub use watchlist::WatchlistItem;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] quotedeck_core::ValidationError),

    #[error("invalid symbol format: '{0}'")]
    InvalidSymbol(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: resolve_db_path(),
            max_pool_size: 4,
        }
    }
}

fn resolve_db_path() -> PathBuf {
    if let Ok(path) = env::var("QUOTEDECK_DB_PATH") {
        let path = path.trim();
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    let home = env::var("HOME").unwrap_or_else(|_| String::from("."));
    PathBuf::from(home).join(".quotedeck").join("quotedeck.duckdb")
}

/// Handle to the database; cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: ConnectionPool,
}

impl Store {
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(StoreConfig::default())
    }

    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let pool = ConnectionPool::new(config.db_path, config.max_pool_size);
        let store = Self { pool };
        {
            let connection = store.connection()?;
            migrations::apply_migrations(&connection)?;
        }
        Ok(store)
    }

    /// Open a store at an explicit path, for tooling and tests.
    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open(StoreConfig {
            db_path: path.into(),
            max_pool_size: 4,
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }

    pub(crate) fn connection(&self) -> Result<PooledConnection, StoreError> {
        Ok(self.pool.acquire()?)
    }
}

/// Run `work` inside a transaction, rolling back on error.
pub(crate) fn in_transaction<T>(
    connection: &Connection,
    work: impl FnOnce() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    connection.execute_batch("BEGIN TRANSACTION")?;
    match work() {
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
