//! Error types for focuslog.

use thiserror::Error;

/// Errors surfaced by storage, configuration and the sync layer.
///
/// Session transitions never produce one of these; only the persistence
/// plumbing and the CLI do.
#[derive(Error, Debug)]
pub enum FocusError {
    /// `SQLite` failures (open, migrate, query).
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload (de)serialization errors.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote store rejected a request or could not be reached.
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Remote sync was requested without an owner identity.
    #[error("Not authenticated: no owner id configured")]
    NotAuthenticated,
}

impl From<serde_json::Error> for FocusError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<reqwest::Error> for FocusError {
    fn from(e: reqwest::Error) -> Self {
        Self::Remote(e.to_string())
    }
}

impl FocusError {
    /// Whether the error means the remote store is unreachable or refused the
    /// write, as opposed to a local failure.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::NotAuthenticated)
    }
}
