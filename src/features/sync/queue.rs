//! Outbox storage and management.
//!
//! Pending writes are replayed strictly in enqueue order (by row id).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use super::operation::{PendingWrite, WriteMethod, WriteStatus};
use crate::error::FocusError;
use crate::storage::Database;

/// Outbox of writes waiting for the remote store.
///
/// Every process-local drainer shares one `OutboxQueue` and must hold
/// [`OutboxQueue::drain_guard`] while replaying, so a write is never sent by
/// two drains at once.
pub struct OutboxQueue {
    db: Arc<Database>,
    drain_lock: Mutex<()>,
}

const SELECT_COLUMNS: &str = "SELECT id, method, url, headers, body, created_at, attempts,
                                     last_attempt, last_error, status
                              FROM outbox";

impl OutboxQueue {
    /// Create an outbox over a shared database connection.
    #[must_use]
    pub fn with_database(db: Arc<Database>) -> Self {
        Self {
            db,
            drain_lock: Mutex::new(()),
        }
    }

    /// Wait for exclusive replay rights over this outbox.
    pub async fn drain_guard(&self) -> MutexGuard<'_, ()> {
        self.drain_lock.lock().await
    }

    /// Append a write to the outbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be saved.
    pub fn enqueue(&self, write: &mut PendingWrite) -> Result<(), FocusError> {
        let headers = serde_json::to_string(&write.headers)?;
        let conn = self.db.connection();

        conn.execute(
            r"INSERT INTO outbox (method, url, headers, body, created_at, attempts, status)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                write.method.to_string(),
                write.url,
                headers,
                write.body,
                write.created_at.to_rfc3339(),
                write.attempts,
                write.status.to_string(),
            ],
        )
        .map_err(|e| FocusError::Database(format!("Failed to enqueue write: {e}")))?;

        write.id = Some(conn.last_insert_rowid());
        Ok(())
    }

    /// Get pending writes in enqueue order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_pending(&self, limit: usize) -> Result<Vec<PendingWrite>, FocusError> {
        let conn = self.db.connection();

        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_COLUMNS} WHERE status = 'pending' ORDER BY id ASC LIMIT ?1"
            ))
            .map_err(|e| FocusError::Database(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([limit], row_to_write)
            .map_err(|e| FocusError::Database(format!("Failed to query pending writes: {e}")))?;

        let mut writes = Vec::new();
        for row in rows {
            writes.push(row.map_err(|e| FocusError::Database(e.to_string()))?);
        }

        Ok(writes)
    }

    /// Get all writes with a given status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_by_status(&self, status: WriteStatus) -> Result<Vec<PendingWrite>, FocusError> {
        let conn = self.db.connection();

        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE status = ?1 ORDER BY id ASC"))
            .map_err(|e| FocusError::Database(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([status.to_string()], row_to_write)
            .map_err(|e| FocusError::Database(format!("Failed to query writes: {e}")))?;

        let mut writes = Vec::new();
        for row in rows {
            writes.push(row.map_err(|e| FocusError::Database(e.to_string()))?);
        }

        Ok(writes)
    }

    /// Get a specific write by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: i64) -> Result<Option<PendingWrite>, FocusError> {
        let conn = self.db.connection();

        conn.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), [id], row_to_write)
            .optional()
            .map_err(|e| FocusError::Database(format!("Failed to query write: {e}")))
    }

    /// Mark a write as accepted by the remote store.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_completed(&self, id: i64) -> Result<(), FocusError> {
        let conn = self.db.connection();

        conn.execute(
            r"UPDATE outbox SET status = 'completed', last_attempt = ?1, last_error = NULL,
              attempts = attempts + 1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )
        .map_err(|e| FocusError::Database(format!("Failed to mark write completed: {e}")))?;

        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// With `max_attempts` set, a write that reaches the limit is
    /// dead-lettered (status `failed`). Returns whether that happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn record_failure(
        &self,
        id: i64,
        error: &str,
        max_attempts: Option<u32>,
    ) -> Result<bool, FocusError> {
        let conn = self.db.connection();

        conn.execute(
            r"UPDATE outbox SET
              last_attempt = ?1,
              last_error = ?2,
              attempts = attempts + 1
              WHERE id = ?3",
            params![Utc::now().to_rfc3339(), error, id],
        )
        .map_err(|e| FocusError::Database(format!("Failed to record attempt: {e}")))?;

        let Some(limit) = max_attempts else {
            return Ok(false);
        };

        let rows = conn
            .execute(
                "UPDATE outbox SET status = 'failed' WHERE id = ?1 AND attempts >= ?2",
                params![id, limit],
            )
            .map_err(|e| FocusError::Database(format!("Failed to dead-letter write: {e}")))?;

        Ok(rows > 0)
    }

    /// Put dead-lettered writes back in the queue.
    ///
    /// Retried writes keep their original position. Returns the number of
    /// writes reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn retry_failed(&self, id: Option<i64>) -> Result<usize, FocusError> {
        let conn = self.db.connection();

        let result = match id {
            Some(id) => conn.execute(
                "UPDATE outbox SET status = 'pending', attempts = 0 WHERE id = ?1 AND status = 'failed'",
                [id],
            ),
            None => conn.execute(
                "UPDATE outbox SET status = 'pending', attempts = 0 WHERE status = 'failed'",
                [],
            ),
        };

        result.map_err(|e| FocusError::Database(format!("Failed to reset writes: {e}")))
    }

    /// Delete completed writes older than the specified age.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn cleanup(&self, max_age_hours: i64) -> Result<usize, FocusError> {
        let conn = self.db.connection();
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours);

        conn.execute(
            "DELETE FROM outbox WHERE status = 'completed' AND created_at < ?1",
            [cutoff.to_rfc3339()],
        )
        .map_err(|e| FocusError::Database(format!("Failed to cleanup writes: {e}")))
    }

    /// Remove every entry, pending ones included.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self) -> Result<usize, FocusError> {
        let conn = self.db.connection();

        conn.execute("DELETE FROM outbox", [])
            .map_err(|e| FocusError::Database(format!("Failed to clear outbox: {e}")))
    }

    /// Get outbox statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stats(&self) -> Result<QueueStats, FocusError> {
        let conn = self.db.connection();

        let count = |status: &str| -> Result<i64, FocusError> {
            conn.query_row(
                "SELECT COUNT(*) FROM outbox WHERE status = ?1",
                [status],
                |row| row.get(0),
            )
            .map_err(|e| FocusError::Database(format!("Failed to count {status}: {e}")))
        };

        let pending = count("pending")?;
        let completed = count("completed")?;
        let failed = count("failed")?;

        let oldest_pending: Option<String> = conn
            .query_row(
                "SELECT created_at FROM outbox WHERE status = 'pending' ORDER BY id ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| FocusError::Database(format!("Failed to get oldest pending: {e}")))?;

        Ok(QueueStats {
            pending,
            completed,
            failed,
            oldest_pending: oldest_pending
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|t| t.with_timezone(&Utc)),
        })
    }

    /// Check if there are any pending writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn has_pending(&self) -> Result<bool, FocusError> {
        let conn = self.db.connection();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM outbox WHERE status = 'pending'", [], |row| {
                row.get(0)
            })
            .map_err(|e| FocusError::Database(format!("Failed to check pending: {e}")))?;

        Ok(count > 0)
    }
}

/// Outbox statistics.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    /// Number of pending writes
    pub pending: i64,
    /// Number of completed writes
    pub completed: i64,
    /// Number of dead-lettered writes
    pub failed: i64,
    /// Oldest pending write timestamp
    pub oldest_pending: Option<DateTime<Utc>>,
}

fn row_to_write(row: &Row<'_>) -> Result<PendingWrite, rusqlite::Error> {
    let id: i64 = row.get(0)?;
    let method: String = row.get(1)?;
    let url: String = row.get(2)?;
    let headers_json: String = row.get(3)?;
    let body: Option<String> = row.get(4)?;
    let created_at_str: String = row.get(5)?;
    let attempts: u32 = row.get(6)?;
    let last_attempt_str: Option<String> = row.get(7)?;
    let last_error: Option<String> = row.get(8)?;
    let status_str: String = row.get(9)?;

    let headers = serde_json::from_str(&headers_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map_or_else(|_| Utc::now(), |t| t.with_timezone(&Utc));

    let last_attempt = last_attempt_str.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .ok()
    });

    Ok(PendingWrite {
        id: Some(id),
        method: WriteMethod::parse(&method),
        url,
        headers,
        body,
        created_at,
        attempts,
        last_attempt,
        last_error,
        status: WriteStatus::from_str(&status_str),
    })
}
