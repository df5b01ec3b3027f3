//! Error types for insight-core

use thiserror::Error;

/// Main error type for the insight-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A store connection lock was poisoned by a panicking writer
    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),

    /// Transient failure fetching raw rows for a report.
    ///
    /// Surfaced once to the caller so it can offer a retry; the loader
    /// never retries on its own.
    #[error("failed to fetch {what}: {message}")]
    Fetch { what: &'static str, message: String },

    /// Unknown event type string
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// Unknown time range string
    #[error("unknown time range: {0} (expected 7d, 30d or 90d)")]
    UnknownTimeRange(String),
}

impl Error {
    /// Returns true for failures the caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Fetch { .. })
    }
}

/// Result type alias for insight-core
pub type Result<T> = std::result::Result<T, Error>;
