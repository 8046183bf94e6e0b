//! Error types for storage and search operations.

use thiserror::Error;

/// Errors returned by [`Store`](crate::Store), [`ChangeFeed`](crate::ChangeFeed)
/// and [`SearchIndex`](crate::SearchIndex) implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The record is not a JSON object or carries a non-string key.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A record with the same key already exists.
    #[error("duplicate key {key} in table {table}")]
    Conflict {
        /// Table name.
        table: String,
        /// Conflicting key.
        key: String,
    },

    /// No record with the given key.
    #[error("record {key} not found in table {table}")]
    NotFound {
        /// Table name.
        table: String,
        /// Missing key.
        key: String,
    },

    /// A change feed fell behind and missed notifications.
    #[error("change feed lagged, {0} changes skipped")]
    Lagged(u64),

    /// Backend-specific failure (connection loss, query rejection).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Convenience type alias for storage results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
