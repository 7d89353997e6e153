//! SQLite connection management
//!
//! A mutex-wrapped connection rather than a pooled one: operations here
//! are short single-statement or single-transaction units scoped around
//! the streaming window, never held across it.

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;

use loess_config::StorageConfig;
use loess_core::{StoreError, StoreResult};

use crate::schema;

/// Thread-safe SQLite connection wrapper.
#[derive(Clone)]
pub struct SqlitePool {
    conn: Arc<Mutex<Connection>>,
    memory: bool,
}

impl SqlitePool {
    pub fn new(config: &StorageConfig) -> StoreResult<Self> {
        tracing::info!(path = ?config.path, "Opening SQLite database");

        let conn = if config.is_memory() {
            Connection::open_in_memory().map_err(db_err)?
        } else {
            if let Some(parent) = config.path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Database(format!("failed to create data directory: {e}"))
                })?;
            }
            Connection::open(&config.path).map_err(db_err)?
        };

        let pool = Self {
            conn: Arc::new(Mutex::new(conn)),
            memory: config.is_memory(),
        };
        pool.initialize()?;
        Ok(pool)
    }

    /// In-memory database for tests.
    pub fn memory() -> StoreResult<Self> {
        Self::new(&StorageConfig::memory())
    }

    pub fn with_connection<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn with_connection_mut<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T>,
    {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }

    fn initialize(&self) -> StoreResult<()> {
        self.with_connection(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
            if !self.memory {
                conn.pragma_update(None, "journal_mode", "WAL").map_err(db_err)?;
            }
            schema::apply(conn)
        })
    }
}

/// Uniform rusqlite error mapping.
pub(crate) fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}
