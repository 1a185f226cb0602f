//! Lifecycle of a single retrieval request.

/// State of a retrieval task. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskState {
    /// Cache lookups have been dispatched.
    #[default]
    Pending,
    /// A network fetch is in progress.
    Fetching,
    /// Downloaded bytes are being decoded and processed.
    Decoding,
    /// The image was delivered.
    Completed,
    /// An error was delivered.
    Failed,
    /// The task was cancelled before delivery.
    Cancelled,
}

impl TaskState {
    /// Returns true once the task reached a final state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true while the task is still working.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !self.is_terminal()
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Fetching => 1,
            Self::Decoding => 2,
            Self::Completed | Self::Failed | Self::Cancelled => 3,
        }
    }

    /// Returns true if moving from `self` to `next` is a forward transition.
    ///
    /// `Cancelled` is reachable from `Pending` and `Fetching` only.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, Self::Cancelled) {
            return matches!(self, Self::Pending | Self::Fetching);
        }
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Fetching => write!(f, "fetching"),
            Self::Decoding => write!(f, "decoding"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
