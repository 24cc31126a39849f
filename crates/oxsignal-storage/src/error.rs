/// Errors that can occur within the storage layer.
///
/// Inherent [`crate::SqliteStore`] methods return this type; the
/// collaborator trait impls convert it into `anyhow::Error` at the
/// boundary.
///
/// # Examples
///
/// ```rust
/// use oxsignal_storage::error::StorageError;
///
/// let err = StorageError::InvalidColumn {
///     column: "severity",
///     message: "unknown severity: urgent".to_string(),
/// };
/// assert!(err.to_string().contains("severity"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failure (configuration bodies,
    /// alert indicator lists).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A text column held a value that does not parse into its domain type.
    #[error("Storage: invalid value in column '{column}': {message}")]
    InvalidColumn {
        column: &'static str,
        message: String,
    },
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
