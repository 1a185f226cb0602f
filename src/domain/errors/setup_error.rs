//! Errors raised while assembling a retriever.

use thiserror::Error;

use super::{CacheError, DownloadError};

/// Failure to build the caches or transport of a retriever.
#[derive(Debug, Clone, Error)]
pub enum SetupError {
    /// The disk cache could not be opened.
    #[error("failed to open image cache: {0}")]
    Cache(#[from] CacheError),
    /// The HTTP transport could not be created.
    #[error("failed to create transport: {0}")]
    Transport(#[from] DownloadError),
}
