//! Persistence intents and the HTTP-shaped writes they turn into.
//!
//! Tracker transitions emit [`PersistIntent`]s. The sync worker renders each
//! intent into one or more [`PendingWrite`]s, which is the form stored in the
//! outbox and replayed against the remote store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::FocusError;
use crate::features::focus::Session;

/// Remote table holding session rows.
pub const SESSIONS_TABLE: &str = "sessions";
/// Remote table holding per-day focus rollups.
pub const DAILY_STATS_TABLE: &str = "daily_focus_stats";

/// Something the tracker wants persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistIntent {
    /// Insert or replace a session row (start, pause, resume, end).
    UpsertSession(Session),
    /// Add `ms` to the `(owner_id, date)` rollup row.
    AddDailyFocus {
        /// Owner of the rollup row.
        owner_id: Option<String>,
        /// Local calendar date the focus time is booked on.
        date: NaiveDate,
        /// Milliseconds to add.
        ms: i64,
    },
}

impl PersistIntent {
    /// Owner identity the remote write would be made under.
    #[must_use]
    pub fn owner_id(&self) -> Option<&str> {
        match self {
            Self::UpsertSession(session) => session.owner_id.as_deref(),
            Self::AddDailyFocus { owner_id, .. } => owner_id.as_deref(),
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UpsertSession(_) => "upsert_session",
            Self::AddDailyFocus { .. } => "add_daily_focus",
        }
    }

    /// Render the intent as outbox entries.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::Parse` if the payload cannot be serialized.
    pub fn to_writes(&self) -> Result<Vec<PendingWrite>, FocusError> {
        match self {
            Self::UpsertSession(session) => {
                let body = serde_json::to_string(session)?;
                Ok(vec![PendingWrite::new(
                    WriteMethod::Post,
                    format!("/rest/v1/{SESSIONS_TABLE}?on_conflict=id"),
                    vec![(
                        "Prefer".to_string(),
                        "resolution=merge-duplicates".to_string(),
                    )],
                    Some(body),
                )])
            }
            Self::AddDailyFocus { owner_id, date, ms } => {
                let body = json!({
                    "p_owner_id": owner_id,
                    "p_date": date.format("%Y-%m-%d").to_string(),
                    "p_ms": ms,
                });
                Ok(vec![PendingWrite::new(
                    WriteMethod::Post,
                    format!("/rest/v1/rpc/increment_{DAILY_STATS_TABLE}"),
                    Vec::new(),
                    Some(body.to_string()),
                )])
            }
        }
    }
}

/// HTTP method of a pending write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WriteMethod {
    Post,
    Patch,
    Delete,
}

impl WriteMethod {
    /// Parse from the stored form. Unknown methods become `Post`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            _ => Self::Post,
        }
    }
}

impl std::fmt::Display for WriteMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        write!(f, "{s}")
    }
}

/// Status of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    /// Waiting to be replayed.
    Pending,
    /// Accepted by the remote store.
    Completed,
    /// Dead-lettered after reaching the attempt limit.
    Failed,
}

impl WriteStatus {
    /// Convert from string.
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// An HTTP-shaped write waiting in the outbox.
///
/// `url` is relative to the configured remote base URL. Credentials are not
/// stored; the remote store adds them when the write is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWrite {
    /// Database ID (None if not persisted)
    pub id: Option<i64>,
    /// HTTP method.
    pub method: WriteMethod,
    /// Path and query relative to the remote base URL.
    pub url: String,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<String>,
    /// When the write was created.
    pub created_at: DateTime<Utc>,
    /// Number of replay attempts so far.
    pub attempts: u32,
    /// Last replay attempt.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Error from the last failed attempt.
    pub last_error: Option<String>,
    /// Current status.
    pub status: WriteStatus,
}

impl PendingWrite {
    /// Create a new pending write.
    #[must_use]
    pub fn new(
        method: WriteMethod,
        url: impl Into<String>,
        headers: Vec<(String, String)>,
        body: Option<String>,
    ) -> Self {
        Self {
            id: None,
            method,
            url: url.into(),
            headers,
            body,
            created_at: Utc::now(),
            attempts: 0,
            last_attempt: None,
            last_error: None,
            status: WriteStatus::Pending,
        }
    }

    /// Short description for listings.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// Which persistence path an intent took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistOutcome {
    /// Written locally and accepted by the remote store.
    Synced,
    /// Written locally; the remote write waits in the outbox.
    QueuedOffline,
    /// Written locally; no owner identity, so no remote write was attempted.
    LocalOnly,
    /// Neither the local write nor the outbox accepted the intent.
    Failed,
}

impl std::fmt::Display for PersistOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Synced => "synced",
            Self::QueuedOffline => "queued offline",
            Self::LocalOnly => "local only",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}
