//! DuckDB connection pooling.
//!
//! The store is read-mostly with short writes, so a small pool of idle
//! connections is enough. Connections return to the pool on drop unless it
//! is already at capacity.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::duckdb::Connection;

struct PoolInner {
    db_path: PathBuf,
    capacity: usize,
    idle: Mutex<Vec<Connection>>,
}

/// Shared handle to a pool of DuckDB connections over one database file.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                db_path: path.into(),
                capacity: capacity.max(1),
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Take an idle connection or open a new one.
    ///
    /// # Errors
    /// Fails when the database file cannot be opened.
    ///
    /// # Panics
    /// Panics if the pool mutex was poisoned by a previous panic.
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        let idle = {
            let mut idle = self.inner.idle.lock().expect("connection pool mutex poisoned");
            idle.pop()
        };

        let connection = match idle {
            Some(connection) => connection,
            None => open_connection(self.inner.db_path.as_path())?,
        };

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.inner.db_path.as_path()
    }
}

/// A connection that rejoins the pool when dropped.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("pooled connection already released")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("pooled connection already released")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        let mut idle = self.pool.idle.lock().expect("connection pool mutex poisoned");
        if idle.len() < self.pool.capacity {
            idle.push(connection);
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection, ::duckdb::Error> {
    let connection = Connection::open(path)?;
    connection.execute_batch("PRAGMA disable_progress_bar;")?;
    Ok(connection)
}
