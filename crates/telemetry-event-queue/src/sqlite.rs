//! SQLite-backed event store.
//!
//! All statements run on the dedicated `tokio-rusqlite` thread; decoding
//! of payloads happens back on the caller's task.

use crate::{migrations, EventStore, QueueError, QueueResult, QueuedEvent, TelemetryEvent};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

/// Convert a tokio_rusqlite::Error to QueueError.
fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> QueueError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => QueueError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => QueueError::Connection("Connection closed".to_string()),
        other => QueueError::Connection(other.to_string()),
    }
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> QueueResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| QueueError::InvalidData(format!("bad timestamp {raw:?}: {e}")))
}

/// A row as read from disk, before payload decoding.
struct RawRow {
    id: String,
    payload: Option<String>,
    reason: Option<String>,
    created_at: Option<String>,
    retry_count: i64,
    last_attempt_at: Option<String>,
}

impl RawRow {
    fn decode(self) -> QueueResult<QueuedEvent> {
        let payload = self
            .payload
            .ok_or_else(|| QueueError::InvalidData("payload is not text".to_string()))?;
        let event: TelemetryEvent = serde_json::from_str(&payload)?;
        let created_at = self
            .created_at
            .ok_or_else(|| QueueError::InvalidData("created_at is not text".to_string()))?;
        let retry_count = u32::try_from(self.retry_count)
            .map_err(|_| QueueError::InvalidData(format!("bad retry_count {}", self.retry_count)))?;
        let last_attempt_at = self
            .last_attempt_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;

        Ok(QueuedEvent {
            id: self.id,
            event,
            reason: self.reason,
            timestamp: parse_timestamp(&created_at)?,
            retry_count,
            last_attempt_at,
        })
    }
}

/// Event store persisted in a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
    path: String,
}

impl SqliteStore {
    /// Open a store at the given path.
    ///
    /// Creates the file and parent directories if needed, enables WAL mode
    /// and runs pending migrations.
    pub async fn open(path: &Path) -> QueueResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening retry queue database");

        let conn = Connection::open(path)
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        Self::migrate(&conn).await?;

        Ok(Self {
            conn,
            path: path_str,
        })
    }

    /// Open an in-memory store for testing.
    pub async fn open_in_memory() -> QueueResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        Self::migrate(&conn).await?;

        Ok(Self {
            conn,
            path: ":memory:".to_string(),
        })
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    async fn migrate(conn: &Connection) -> QueueResult<()> {
        conn.call(|conn| Ok(migrations::run_migrations(conn)))
            .await
            .map_err(from_tokio_rusqlite)?
            .map_err(|e| QueueError::Migration(e.to_string()))
    }

    async fn drop_corrupt(&self, ids: Vec<String>) -> QueueResult<()> {
        let dropped = self
            .conn
            .call(move |conn| {
                let mut count = 0;
                for id in &ids {
                    count += conn.execute("DELETE FROM retry_queue WHERE id = ?1", params![id])?;
                }
                Ok(count)
            })
            .await
            .map_err(from_tokio_rusqlite)?;

        warn!(count = dropped, "Dropped corrupt retry queue records");
        Ok(())
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn insert(&self, event: &QueuedEvent) -> QueueResult<()> {
        let payload = serde_json::to_string(&event.event)?;
        let id = event.id.clone();
        let reason = event.reason.clone();
        let created_at = format_timestamp(event.timestamp);
        let retry_count = i64::from(event.retry_count);
        let last_attempt_at = event.last_attempt_at.map(format_timestamp);

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO retry_queue (id, payload, reason, created_at, retry_count, last_attempt_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![id, payload, reason, created_at, retry_count, last_attempt_at],
                )?;
                Ok(())
            })
            .await
            .map_err(from_tokio_rusqlite)
    }

    async fn load_all(&self) -> QueueResult<Vec<QueuedEvent>> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, payload, reason, created_at, retry_count, last_attempt_at
                     FROM retry_queue ORDER BY created_at ASC, seq ASC",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(RawRow {
                            id: row.get(0)?,
                            payload: row.get_ref(1)?.as_str().ok().map(str::to_owned),
                            reason: row.get_ref(2)?.as_str().ok().map(str::to_owned),
                            created_at: row.get_ref(3)?.as_str().ok().map(str::to_owned),
                            retry_count: row.get_ref(4)?.as_i64().unwrap_or(-1),
                            last_attempt_at: row.get_ref(5)?.as_str().ok().map(str::to_owned),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(from_tokio_rusqlite)?;

        let mut events = Vec::with_capacity(rows.len());
        let mut corrupt = Vec::new();
        for row in rows {
            let id = row.id.clone();
            match row.decode() {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(event_id = %id, error = %e, "Skipping corrupt retry queue record");
                    corrupt.push(id);
                }
            }
        }

        if !corrupt.is_empty() {
            if let Err(e) = self.drop_corrupt(corrupt).await {
                warn!(error = %e, "Failed to drop corrupt retry queue records");
            }
        }

        debug!(count = events.len(), "Loaded retry queue");
        Ok(events)
    }

    async fn record_failure(
        &self,
        id: &str,
        error: Option<&str>,
        attempted_at: DateTime<Utc>,
    ) -> QueueResult<bool> {
        let id = id.to_string();
        let error = error.map(str::to_string);
        let attempted_at = format_timestamp(attempted_at);

        let updated = self
            .conn
            .call(move |conn| {
                let count = conn.execute(
                    "UPDATE retry_queue
                     SET retry_count = retry_count + 1,
                         reason = COALESCE(?2, reason),
                         last_attempt_at = ?3
                     WHERE id = ?1",
                    params![id, error, attempted_at],
                )?;
                Ok(count)
            })
            .await
            .map_err(from_tokio_rusqlite)?;

        Ok(updated > 0)
    }

    async fn remove(&self, id: &str) -> QueueResult<bool> {
        let id = id.to_string();
        let removed = self
            .conn
            .call(move |conn| {
                let count = conn.execute("DELETE FROM retry_queue WHERE id = ?1", params![id])?;
                Ok(count)
            })
            .await
            .map_err(from_tokio_rusqlite)?;

        Ok(removed > 0)
    }

    async fn remove_expired(
        &self,
        max_retries: u32,
        created_before: DateTime<Utc>,
    ) -> QueueResult<usize> {
        let max_retries = i64::from(max_retries);
        let cutoff = format_timestamp(created_before);

        self.conn
            .call(move |conn| {
                let count = conn.execute(
                    "DELETE FROM retry_queue WHERE retry_count >= ?1 OR created_at < ?2",
                    params![max_retries, cutoff],
                )?;
                Ok(count)
            })
            .await
            .map_err(from_tokio_rusqlite)
    }

    async fn remove_oldest_beyond(&self, cap: usize) -> QueueResult<usize> {
        self.conn
            .call(move |conn| {
                let total: i64 =
                    conn.query_row("SELECT COUNT(*) FROM retry_queue", [], |row| row.get(0))?;
                let excess = total - cap as i64;
                if excess <= 0 {
                    return Ok(0);
                }

                let count = conn.execute(
                    "DELETE FROM retry_queue WHERE seq IN (
                        SELECT seq FROM retry_queue ORDER BY created_at ASC, seq ASC LIMIT ?1
                     )",
                    params![excess],
                )?;
                Ok(count)
            })
            .await
            .map_err(from_tokio_rusqlite)
    }

    async fn count(&self) -> QueueResult<usize> {
        let count: i64 = self
            .conn
            .call(|conn| {
                let count = conn.query_row("SELECT COUNT(*) FROM retry_queue", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .map_err(from_tokio_rusqlite)?;

        Ok(count as usize)
    }
}
