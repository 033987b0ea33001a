//! Async SQLite executor using a dedicated background thread.
//!
//! This module provides an async-friendly interface to SQLite that:
//! - Uses a single dedicated thread for all SQLite operations
//! - Sends queries through a channel (non-blocking from caller's perspective)
//! - Keeps the Tokio runtime free for other async work
//!
//! # Design Principles
//!
//! 1. **Single writer**: SQLite serializes writes anyway, so one thread is optimal
//! 2. **No blocking in async context**: Callers await results without blocking threads
//! 3. **Predictable latency**: Queries execute in FIFO order
//! 4. **DB-only operations**: Only SQL queries should run inside `call()` - never
//!    a bus publish, codec work, or anything else that can stall the thread
//!
//! # Example
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//!
//! // Execute a query - runs on dedicated thread, caller awaits result
//! let batch = db.call(move |conn| {
//!     queries::claim_outbox_batch(conn, &tenant, &owner, 200, lease)
//! }).await?;
//!
//! // WRONG: Don't publish to the bus inside call()
//! // db.call(|conn| {
//! //     let batch = queries::claim_outbox_batch(conn, ...)?;
//! //     bus.publish(&batch)  // NO! Publish outside, then resolve
//! // }).await;
//! ```

use crate::{migrations, DatabaseError, DatabaseResult};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

/// Convert a tokio_rusqlite::Error to DatabaseError.
fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> DatabaseError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => DatabaseError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => DatabaseError::Connection("Connection closed".to_string()),
        other => DatabaseError::Connection(other.to_string()),
    }
}

/// Async SQLite database with a dedicated executor thread.
///
/// All operations are sent to a single background thread via channel.
/// This avoids blocking the Tokio runtime and provides predictable
/// query ordering (FIFO). Clones share the same connection, so every
/// projector instance, the write path, and the idempotency store all
/// funnel through one serialized writer.
#[derive(Clone)]
pub struct AsyncDatabase {
    conn: Connection,
    path: String,
}

impl AsyncDatabase {
    /// Open a database at the given path.
    ///
    /// This will:
    /// - Create the database file if it doesn't exist
    /// - Enable WAL mode and performance pragmas
    /// - Run any pending migrations
    /// - Start the dedicated executor thread
    pub async fn open(path: &Path) -> DatabaseResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();
        let path_for_open = path_str.clone();

        info!(path = %path_str, "Opening async database");

        // Open connection - this spawns the dedicated background thread
        let conn = Connection::open(&path_for_open)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        // Configure pragmas for performance
        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA cache_size = -64000;
                PRAGMA temp_store = MEMORY;
                PRAGMA mmap_size = 268435456;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        // Run migrations
        conn.call(|conn| {
            migrations::run_migrations(conn)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        info!(path = %path_str, "Async database initialized with WAL mode");

        Ok(Self {
            conn,
            path: path_str,
        })
    }

    /// Execute a closure on the database connection.
    ///
    /// The closure runs on the dedicated SQLite thread. The caller's async
    /// task is parked (not blocked) until the result is ready.
    ///
    /// Inside the closure, you may ONLY run SQL and lightweight row mapping.
    /// Bus publishes, codec decoding, and heavy computation belong outside;
    /// they would stall the single DB thread and starve every other caller.
    pub async fn call<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        // Inner type: Result<DatabaseResult<T>, tokio_rusqlite::Error>.
        // tokio_rusqlite::Error implements From<rusqlite::Error>, so the
        // closure wraps our DatabaseResult inside its Ok variant.
        let outer_result = self.conn
            .call(move |conn| {
                let inner_result = f(conn);
                Ok(inner_result)
            })
            .await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Execute a closure with a mutable connection.
    ///
    /// Required for multi-statement transactions (`Connection::transaction`
    /// needs `&mut`). The write path uses this to commit a business mutation
    /// and its outbox rows atomically.
    pub async fn call_mut<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let outer_result = self.conn
            .call(move |conn| {
                let inner_result = f(conn);
                Ok(inner_result)
            })
            .await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Execute a closure that returns a rusqlite::Result.
    ///
    /// Convenience method for simple queries that only produce rusqlite errors.
    pub async fn call_sqlite<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        // Use ? to convert rusqlite::Error to tokio_rusqlite::Error
        self.conn
            .call(move |conn| Ok(f(conn)?))
            .await
            .map_err(from_tokio_rusqlite)
    }

    /// Get the database file path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check if the database is healthy by executing a simple query.
    pub async fn health_check(&self) -> DatabaseResult<()> {
        self.call_sqlite(|conn| {
            conn.execute_batch("SELECT 1")
        })
        .await?;
        debug!("Database health check passed");
        Ok(())
    }

    /// Close the database connection.
    ///
    /// This will wait for any pending operations to complete,
    /// then shut down the executor thread.
    pub async fn close(self) -> DatabaseResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to close database: {:?}", e)))?;
        info!(path = %self.path, "Database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_async_database_open() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let db = AsyncDatabase::open(&db_path).await.unwrap();
        assert!(db.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_open_runs_migrations() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test_migrated.db");

        let db = AsyncDatabase::open(&db_path).await.unwrap();

        let version: i32 = db
            .call_sqlite(|conn| {
                conn.query_row("SELECT MAX(version) FROM migrations", [], |row| row.get(0))
            })
            .await
            .unwrap();

        assert_eq!(version, migrations::CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_concurrent_writes_are_serialized() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test_concurrent.db");

        let db = AsyncDatabase::open(&db_path).await.unwrap();

        db.call_sqlite(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS counter (id INTEGER PRIMARY KEY, val INTEGER);
                 INSERT INTO counter (val) VALUES (0);"
            )
        })
        .await
        .unwrap();

        let mut handles = vec![];
        for _ in 0..10 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                db.call_sqlite(|conn| {
                    conn.execute("UPDATE counter SET val = val + 1 WHERE id = 1", [])
                })
                .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let count: i32 = db
            .call(|conn| {
                conn.query_row("SELECT val FROM counter WHERE id = 1", [], |row| row.get(0))
                    .map_err(DatabaseError::from)
            })
            .await
            .unwrap();

        assert_eq!(count, 10);
    }

    #[tokio::test]
    async fn test_call_mut_transaction_rolls_back() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test_tx.db");

        let db = AsyncDatabase::open(&db_path).await.unwrap();

        let result: DatabaseResult<()> = db
            .call_mut(|conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO outbox (id, tenant_id, event_type, topic, payload, created_at)
                     VALUES ('tx-test', 't1', 'e', 'topic', '{}', '2026-01-01T00:00:00+00:00')",
                    [],
                )?;
                // Dropping the transaction without commit rolls it back
                drop(tx);
                Err(DatabaseError::InvalidData("forced".to_string()))
            })
            .await;

        assert!(result.is_err());

        let count: i64 = db
            .call_sqlite(|conn| {
                conn.query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))
            })
            .await
            .unwrap();

        assert_eq!(count, 0);
    }
}
