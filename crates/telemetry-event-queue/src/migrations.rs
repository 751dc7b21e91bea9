//! Queue database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::QueueResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> QueueResult<()> {
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

    if current_version >= CURRENT_VERSION {
        debug!(current_version, "Queue schema up to date");
        return Ok(());
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running queue migrations");

    if current_version < 1 {
        migrate_v1_retry_queue(conn)?;
    }
    if current_version < 2 {
        migrate_v2_last_attempt(conn)?;
    }

    info!("Queue migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> QueueResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: Retry queue table.
fn migrate_v1_retry_queue(conn: &Connection) -> QueueResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE retry_queue (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            payload TEXT NOT NULL,
            reason TEXT,
            created_at TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX idx_retry_queue_created_at ON retry_queue(created_at, seq);
        ",
    )?;
    record_migration(conn, 1, "retry_queue")
}

/// V2: Track the last failed attempt for backoff.
fn migrate_v2_last_attempt(conn: &Connection) -> QueueResult<()> {
    conn.execute_batch("ALTER TABLE retry_queue ADD COLUMN last_attempt_at TEXT;")?;
    record_migration(conn, 2, "retry_queue_last_attempt")
}
