//! Store error types.

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the batch store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool failure.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failure.
    #[error("migration error: {message}")]
    Migration {
        /// Failure description.
        message: String,
    },

    /// A stored row could not be decoded back into a record.
    #[error("corrupt snapshot for batch '{batch_id}': {message}")]
    Corrupt {
        /// Batch whose snapshot failed to decode.
        batch_id: String,
        /// Failure description.
        message: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
