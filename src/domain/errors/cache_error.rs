//! Cache storage error types.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Entry not found in cache.
    #[error("entry not found: {0}")]
    NotFound(String),
    /// I/O error during cache operation.
    #[error("io error: {0}")]
    IoError(String),
    /// Image could not be turned into storable bytes.
    #[error("serialization failed for {0}")]
    SerializationFailed(String),
    /// Background task failed to complete.
    #[error("cache task failed: {0}")]
    TaskFailed(String),
}

impl CacheError {
    /// Creates an I/O error with context.
    #[must_use]
    pub fn io(context: &str, err: &std::io::Error) -> Self {
        Self::IoError(format!("{context}: {err}"))
    }

    /// Returns whether the error only means the entry is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
