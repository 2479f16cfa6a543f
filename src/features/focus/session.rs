//! Focus session records.
//!
//! A [`Session`] is one timed interval of work against a work item. It may
//! span several pause/resume cycles: `start_time` always marks the most recent
//! resume point and `elapsed_ms` holds everything folded in before it.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Observable state of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No active session.
    Idle,
    /// A session is accruing time.
    Running,
    /// A session exists but is not accruing time.
    Paused,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Paused => write!(f, "Paused"),
        }
    }
}

/// A focus session as stored in the log, the local cache and the remote
/// `sessions` table.
///
/// Instants travel as milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unique id.
    pub id: String,
    /// Owner the row belongs to, when signed in.
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Work-item reference.
    pub item_ref: String,
    /// Work-item display label.
    pub item_label: String,
    /// Most recent resume point.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    /// Set only once the session has been ended.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub end_time: Option<DateTime<Utc>>,
    /// Accumulated duration, not counting time since `start_time` while running.
    pub elapsed_ms: i64,
    /// Whether the session is currently accruing time.
    pub is_running: bool,
    /// Last mutation, used for last-write-wins merges.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a running session starting at `now`.
    #[must_use]
    pub fn start(
        item_ref: impl Into<String>,
        item_label: impl Into<String>,
        owner_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            item_ref: item_ref.into(),
            item_label: item_label.into(),
            start_time: now,
            end_time: None,
            elapsed_ms: 0,
            is_running: true,
            updated_at: now,
        }
    }

    /// True elapsed duration at `now`.
    #[must_use]
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> i64 {
        if self.is_running {
            self.elapsed_ms + running_delta(self.start_time, now)
        } else {
            self.elapsed_ms
        }
    }

    /// Whether the session has been ended.
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    /// State implied by this record alone.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        if self.is_ended() {
            SessionState::Idle
        } else if self.is_running {
            SessionState::Running
        } else {
            SessionState::Paused
        }
    }

    /// Get start time in local timezone.
    #[must_use]
    pub fn start_time_local(&self) -> DateTime<Local> {
        self.start_time.with_timezone(&Local)
    }
}

/// Denormalized view of the open session.
///
/// The tracker keeps this in step with the session's log entry; it exists so
/// the hot path (status polling) does not search the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    /// Id of the log entry this points at.
    pub session_id: String,
    /// Work-item reference.
    pub item_ref: String,
    /// Most recent resume point.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    /// Folded elapsed time.
    pub elapsed_ms: i64,
    /// Whether time is accruing.
    pub is_running: bool,
}

impl ActiveSession {
    /// Snapshot the mutable fields of `session`.
    #[must_use]
    pub fn of(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            item_ref: session.item_ref.clone(),
            start_time: session.start_time,
            elapsed_ms: session.elapsed_ms,
            is_running: session.is_running,
        }
    }

    /// Time accrued since the last resume, not yet folded into `elapsed_ms`.
    #[must_use]
    pub fn live_delta(&self, now: DateTime<Utc>) -> i64 {
        if self.is_running {
            running_delta(self.start_time, now)
        } else {
            0
        }
    }

    /// True elapsed duration at `now`.
    #[must_use]
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> i64 {
        self.elapsed_ms + self.live_delta(now)
    }

    /// Running or paused.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        if self.is_running {
            SessionState::Running
        } else {
            SessionState::Paused
        }
    }
}

/// Milliseconds between `since` and `now`, never negative.
///
/// A wall clock stepping backwards must not subtract focus time.
pub(crate) fn running_delta(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(since).num_milliseconds().max(0)
}
