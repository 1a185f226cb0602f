//! Download error types.

use thiserror::Error;

/// Failure of a download session. Delivered to every observer, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum DownloadError {
    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("request timed out")]
    Timeout,

    #[error("unacceptable HTTP status {status}")]
    BadStatus { status: u16 },

    #[error("request modifier rejected the request")]
    RequestRejected,

    #[error("response body was empty")]
    EmptyBody,

    #[error("download session ended without a result")]
    SessionAborted,
}

impl DownloadError {
    /// Creates transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns whether the error came from the network layer.
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout | Self::BadStatus { .. }
        )
    }
}
