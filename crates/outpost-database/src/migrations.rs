//! Database migrations.
//!
//! This module contains all SQL migrations for the database schema.
//! Migrations are run in order and tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    // Create migrations tracking table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_outbox(conn)?;
    }
    if current_version < 2 {
        migrate_v2_idempotency(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: outbox table.
///
/// `claimed_by`/`claimed_until` form the claim lease that stands in for
/// row-level skip-locked selection: a row is claimable when its lease is
/// absent or expired. The composite index serves the projector's poll query.
fn migrate_v1_outbox(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: outbox");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS outbox (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            aggregate_id TEXT,
            event_type TEXT NOT NULL,
            topic TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'new',
            retry_cnt INTEGER NOT NULL DEFAULT 0,
            claimed_by TEXT,
            claimed_until TEXT,
            last_error TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_outbox_tenant_status_created
            ON outbox(tenant_id, status, created_at);
        CREATE INDEX IF NOT EXISTS idx_outbox_status_created
            ON outbox(status, created_at);
        ",
    )?;

    record_migration(conn, 1, "outbox")?;
    Ok(())
}

/// V2: idempotency table.
///
/// `(tenant_id, idempotency_key)` is the uniqueness scope. The expiry index
/// serves the cleanup sweep.
fn migrate_v2_idempotency(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: idempotency");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS idempotency (
            tenant_id TEXT NOT NULL,
            idempotency_key TEXT NOT NULL,
            operation TEXT NOT NULL,
            request_hash TEXT,
            response TEXT,
            status_code INTEGER NOT NULL DEFAULT 0,
            state TEXT NOT NULL DEFAULT 'completed',
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            PRIMARY KEY (tenant_id, idempotency_key)
        );

        CREATE INDEX IF NOT EXISTS idx_idempotency_tenant_expires
            ON idempotency(tenant_id, expires_at);
        ",
    )?;

    record_migration(conn, 2, "idempotency")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_successfully() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        // Verify tables exist
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"outbox".to_string()));
        assert!(tables.contains(&"idempotency".to_string()));
        assert!(tables.contains(&"migrations".to_string()));
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        // Should not error
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM migrations", [], |row| row.get(0))
            .unwrap();

        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_outbox_table_columns() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let columns: Vec<String> = conn
            .prepare("PRAGMA table_info(outbox)")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(1)) // Column 1 is name
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for expected in [
            "id",
            "tenant_id",
            "aggregate_id",
            "event_type",
            "topic",
            "payload",
            "status",
            "retry_cnt",
            "claimed_by",
            "claimed_until",
            "last_error",
            "created_at",
        ] {
            assert!(
                columns.contains(&expected.to_string()),
                "{} column should exist",
                expected
            );
        }
    }

    #[test]
    fn test_idempotency_composite_key_rejects_duplicates() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO idempotency (tenant_id, idempotency_key, operation, created_at, expires_at)
             VALUES ('t1', 'k1', 'op', '2026-01-01T00:00:00+00:00', '2026-01-02T00:00:00+00:00')",
            [],
        )
        .unwrap();

        // Same key in another tenant is fine
        conn.execute(
            "INSERT INTO idempotency (tenant_id, idempotency_key, operation, created_at, expires_at)
             VALUES ('t2', 'k1', 'op', '2026-01-01T00:00:00+00:00', '2026-01-02T00:00:00+00:00')",
            [],
        )
        .unwrap();

        // Same (tenant, key) pair is not
        let dup = conn.execute(
            "INSERT INTO idempotency (tenant_id, idempotency_key, operation, created_at, expires_at)
             VALUES ('t1', 'k1', 'op', '2026-01-01T00:00:00+00:00', '2026-01-02T00:00:00+00:00')",
            [],
        );
        assert!(dup.is_err());
    }
}
