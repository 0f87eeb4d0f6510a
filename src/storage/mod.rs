//! SQL storage backend.
//!
//! A thin wrapper over an `r2d2` pool of SQLite connections. Repositories
//! (credentials, tasks) only see two primitives:
//!
//! - [`Database::execute`] for writes, returning rows affected and the last
//!   inserted row id
//! - [`Database::query`] for reads, mapping each row through a closure
//!
//! Constraint violations are surfaced as [`StorageError::UniqueViolation`] so
//! callers can tell a duplicate apart from any other failure without string
//! matching.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Params, Row};

use crate::error::StorageError;

/// Default maximum number of pooled connections for file-backed databases.
pub const DEFAULT_POOL_SIZE: u32 = 8;

/// Result of a write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Number of rows inserted, updated or deleted
    pub rows_affected: usize,

    /// Row id of the most recent successful insert on the connection
    pub last_insert_id: i64,
}

/// Pooled SQLite database handle.
///
/// Cloning is cheap; all clones share the same pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open (or create) a database file with the default pool size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA busy_timeout = 5000;",
            )
        });
        let pool = Pool::builder().max_size(DEFAULT_POOL_SIZE).build(manager)?;
        Ok(Self { pool })
    }

    /// Create a private in-memory database.
    ///
    /// Every SQLite `:memory:` connection is its own database, so the pool is
    /// pinned to one long-lived connection.
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        Ok(Self { pool })
    }

    /// Run one or more schema statements.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StorageError> {
        let conn = self.pool.get()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Execute a single write statement.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<WriteOutcome, StorageError> {
        let conn = self.pool.get()?;
        let rows_affected = conn.execute(sql, params)?;
        Ok(WriteOutcome {
            rows_affected,
            last_insert_id: conn.last_insert_rowid(),
        })
    }

    /// Run a query and map every returned row.
    pub fn query<T, P, F>(&self, sql: &str, params: P, map_row: F) -> Result<Vec<T>, StorageError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Run a query expected to return at most one row.
    pub fn query_optional<T, P, F>(
        &self,
        sql: &str,
        params: P,
        map_row: F,
    ) -> Result<Option<T>, StorageError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        Ok(self.query(sql, params, map_row)?.into_iter().next())
    }
}
