//! Retrieval error types.

use reqwest::Url;
use thiserror::Error;

use super::DownloadError;

/// Outcome errors of a retrieval request.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum RetrieveError {
    #[error("no cached image for key {key}")]
    CacheMiss { key: String },

    #[error("failed to download {url}: {source}")]
    DownloadFailed {
        url: Url,
        #[source]
        source: DownloadError,
    },

    #[error("failed to decode image: {reason}")]
    DecodeFailed { reason: String },

    #[error("retrieval was cancelled")]
    Cancelled,
}

impl RetrieveError {
    /// Creates cache miss error.
    #[must_use]
    pub fn cache_miss(key: impl Into<String>) -> Self {
        Self::CacheMiss { key: key.into() }
    }

    /// Creates download failed error.
    #[must_use]
    pub const fn download(url: Url, source: DownloadError) -> Self {
        Self::DownloadFailed { url, source }
    }

    /// Creates decode failed error.
    #[must_use]
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::DecodeFailed {
            reason: reason.into(),
        }
    }

    /// Returns whether the request failed because nothing was cached.
    #[must_use]
    pub const fn is_cache_miss(&self) -> bool {
        matches!(self, Self::CacheMiss { .. })
    }

    /// Returns whether error is network related.
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::DownloadFailed { source, .. } if source.is_network_error())
    }

    /// URL involved in the failure, if any.
    #[must_use]
    pub const fn url(&self) -> Option<&Url> {
        match self {
            Self::DownloadFailed { url, .. } => Some(url),
            _ => None,
        }
    }
}
