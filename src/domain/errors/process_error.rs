//! Image processor error types.

use thiserror::Error;

/// Failure of a single processing step.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum ProcessError {
    #[error("invalid processor parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("processing failed: {reason}")]
    Failed { reason: String },
}

impl ProcessError {
    /// Creates invalid parameters error.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            reason: reason.into(),
        }
    }

    /// Creates failed error.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}
