//! Local durable session cache.
//!
//! Mirrors the session log into SQLite, keyed by session id. On startup the
//! tracker is rebuilt from here, and rows fetched from the remote store are
//! merged in by last-write-wins on `updated_at`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::session::Session;
use crate::error::FocusError;
use crate::storage::Database;

const SELECT_COLUMNS: &str = "SELECT id, owner_id, item_ref, item_label, start_time, end_time,
                                     elapsed_ms, is_running, updated_at
                              FROM sessions";

/// SQLite-backed cache of sessions.
pub struct SessionCache {
    db: Arc<Database>,
}

impl SessionCache {
    /// Create a cache over a shared database connection.
    #[must_use]
    pub const fn with_database(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be written.
    pub fn put(&self, session: &Session) -> Result<(), FocusError> {
        let conn = self.db.connection();

        conn.execute(
            r"INSERT OR REPLACE INTO sessions
              (id, owner_id, item_ref, item_label, start_time, end_time,
               elapsed_ms, is_running, updated_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session.id,
                session.owner_id,
                session.item_ref,
                session.item_label,
                session.start_time.timestamp_millis(),
                session.end_time.map(|t| t.timestamp_millis()),
                session.elapsed_ms,
                session.is_running,
                session.updated_at.timestamp_millis(),
            ],
        )
        .map_err(|e| FocusError::Database(format!("Failed to save session: {e}")))?;

        Ok(())
    }

    /// Get a session by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: &str) -> Result<Option<Session>, FocusError> {
        let conn = self.db.connection();

        conn.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), [id], row_to_session)
            .optional()
            .map_err(|e| FocusError::Database(format!("Failed to query session: {e}")))
    }

    /// Sessions belonging to `owner_id`; `None` selects rows recorded while
    /// signed out.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_for_owner(&self, owner_id: Option<&str>) -> Result<Vec<Session>, FocusError> {
        let conn = self.db.connection();

        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_COLUMNS} WHERE owner_id IS ?1 ORDER BY start_time ASC"
            ))
            .map_err(|e| FocusError::Database(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([owner_id], row_to_session)
            .map_err(|e| FocusError::Database(format!("Failed to query sessions: {e}")))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| FocusError::Database(e.to_string()))
    }

    /// Merge sessions into the cache, keeping whichever copy of each row has
    /// the later `updated_at`. Ties keep the cached row.
    ///
    /// Returns the number of rows inserted or replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if a row cannot be written.
    pub fn merge(&self, sessions: &[Session]) -> Result<usize, FocusError> {
        let conn = self.db.connection();
        let mut changed = 0;

        for session in sessions {
            changed += conn
                .execute(
                    r"INSERT INTO sessions
                      (id, owner_id, item_ref, item_label, start_time, end_time,
                       elapsed_ms, is_running, updated_at)
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                      ON CONFLICT(id) DO UPDATE SET
                        owner_id = excluded.owner_id,
                        item_ref = excluded.item_ref,
                        item_label = excluded.item_label,
                        start_time = excluded.start_time,
                        end_time = excluded.end_time,
                        elapsed_ms = excluded.elapsed_ms,
                        is_running = excluded.is_running,
                        updated_at = excluded.updated_at
                      WHERE excluded.updated_at > sessions.updated_at",
                    params![
                        session.id,
                        session.owner_id,
                        session.item_ref,
                        session.item_label,
                        session.start_time.timestamp_millis(),
                        session.end_time.map(|t| t.timestamp_millis()),
                        session.elapsed_ms,
                        session.is_running,
                        session.updated_at.timestamp_millis(),
                    ],
                )
                .map_err(|e| FocusError::Database(format!("Failed to merge session: {e}")))?;
        }

        Ok(changed)
    }

    /// Number of cached sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> Result<usize, FocusError> {
        let conn = self.db.connection();

        conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .map_err(|e| FocusError::Database(format!("Failed to count sessions: {e}")))
    }
}

fn millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_session(row: &Row<'_>) -> Result<Session, rusqlite::Error> {
    let start_time: i64 = row.get(4)?;
    let end_time: Option<i64> = row.get(5)?;
    let updated_at: i64 = row.get(8)?;

    Ok(Session {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        item_ref: row.get(2)?,
        item_label: row.get(3)?,
        start_time: millis(start_time),
        end_time: end_time.map(millis),
        elapsed_ms: row.get(6)?,
        is_running: row.get(7)?,
        updated_at: millis(updated_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cache() -> SessionCache {
        SessionCache::with_database(Arc::new(Database::open_in_memory().unwrap()))
    }

    fn session(item: &str, owner: Option<&str>, start_ms: i64) -> Session {
        Session::start(item, item, owner.map(str::to_string), millis(start_ms))
    }

    #[test]
    fn test_put_and_get() {
        let cache = cache();
        let mut s = session("proj-1", Some("owner-1"), 1_000);
        cache.put(&s).unwrap();

        assert_eq!(cache.get(&s.id).unwrap(), Some(s.clone()));

        s.elapsed_ms = 600_000;
        s.is_running = false;
        s.end_time = Some(millis(601_000));
        cache.put(&s).unwrap();

        let loaded = cache.get(&s.id).unwrap().unwrap();
        assert_eq!(loaded.elapsed_ms, 600_000);
        assert!(!loaded.is_running);
        assert_eq!(loaded.end_time, Some(millis(601_000)));
        assert_eq!(cache.count().unwrap(), 1);
    }

    #[test]
    fn test_get_missing() {
        assert!(cache().get("nope").unwrap().is_none());
    }

    #[test]
    fn test_all_for_owner() {
        let cache = cache();
        cache.put(&session("a", Some("owner-1"), 2_000)).unwrap();
        cache.put(&session("b", Some("owner-2"), 1_000)).unwrap();
        cache.put(&session("c", None, 3_000)).unwrap();
        cache.put(&session("d", Some("owner-1"), 1_000)).unwrap();

        let owned: Vec<_> = cache
            .all_for_owner(Some("owner-1"))
            .unwrap()
            .into_iter()
            .map(|s| s.item_ref)
            .collect();
        assert_eq!(owned, vec!["d", "a"]);

        let anonymous = cache.all_for_owner(None).unwrap();
        assert_eq!(anonymous.len(), 1);
        assert_eq!(anonymous[0].item_ref, "c");

        assert_eq!(cache.count().unwrap(), 4);
    }

    #[test]
    fn test_merge_last_write_wins() {
        let cache = cache();
        let local = session("a", Some("owner-1"), 1_000);
        cache.put(&local).unwrap();

        // Older remote copy loses
        let mut stale = local.clone();
        stale.elapsed_ms = 5;
        stale.updated_at = local.updated_at - Duration::seconds(10);
        assert_eq!(cache.merge(&[stale]).unwrap(), 0);
        assert_eq!(cache.get(&local.id).unwrap().unwrap().elapsed_ms, 0);

        // Newer remote copy wins, unknown rows are inserted
        let mut fresh = local.clone();
        fresh.elapsed_ms = 42;
        fresh.updated_at = local.updated_at + Duration::seconds(10);
        let other = session("b", Some("owner-1"), 9_000);
        assert_eq!(cache.merge(&[fresh, other]).unwrap(), 2);
        assert_eq!(cache.get(&local.id).unwrap().unwrap().elapsed_ms, 42);
        assert_eq!(cache.count().unwrap(), 2);
    }
}
