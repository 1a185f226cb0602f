//! Handle of a single retrieval request.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use reqwest::Url;
use tokio::task::AbortHandle;
use tracing::debug;
use uuid::Uuid;

use crate::domain::entities::{CacheKey, Resource, TaskState};

struct TaskInner {
    id: Uuid,
    url: Url,
    cache_key: CacheKey,
    state: Mutex<TaskState>,
    suppressed: AtomicBool,
    driver: Mutex<Option<AbortHandle>>,
}

/// Cancellable handle returned by a retrieval.
///
/// Clones refer to the same request.
#[derive(Clone)]
pub struct RetrieveTask {
    inner: Arc<TaskInner>,
}

impl std::fmt::Debug for RetrieveTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrieveTask")
            .field("id", &self.inner.id)
            .field("url", &self.inner.url.as_str())
            .field("state", &self.state())
            .finish()
    }
}

impl RetrieveTask {
    pub(crate) fn new(resource: &Resource) -> Self {
        Self::with_state(resource, TaskState::Pending)
    }

    /// A task that already delivered its result.
    pub(crate) fn completed(resource: &Resource) -> Self {
        Self::with_state(resource, TaskState::Completed)
    }

    fn with_state(resource: &Resource, state: TaskState) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                id: Uuid::new_v4(),
                url: resource.download_url().clone(),
                cache_key: resource.cache_key().clone(),
                state: Mutex::new(state),
                suppressed: AtomicBool::new(false),
                driver: Mutex::new(None),
            }),
        }
    }

    /// Unique id of this request.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// URL this request resolves; lets callers discard stale results.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Cache key of the requested resource.
    #[must_use]
    pub fn cache_key(&self) -> &CacheKey {
        &self.inner.cache_key
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        *self.inner.state.lock()
    }

    /// Returns true if the task was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    /// Cancels the request. The completion callback will not run.
    ///
    /// No-op once the task completed or failed. A task already decoding keeps
    /// its state and finishes, but its result is dropped.
    pub fn cancel(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.is_terminal() {
                return;
            }
            self.inner.suppressed.store(true, Ordering::Release);
            if !state.can_transition_to(TaskState::Cancelled) {
                debug!(
                    task = %self.inner.id,
                    state = %*state,
                    "Cancelled late, result will be dropped"
                );
                return;
            }
            *state = TaskState::Cancelled;
        }
        if let Some(driver) = self.inner.driver.lock().take() {
            driver.abort();
        }
        debug!(task = %self.inner.id, url = %self.inner.url, "Retrieval cancelled");
    }

    /// Whether callbacks for this task must no longer run.
    pub(crate) fn is_suppressed(&self) -> bool {
        self.inner.suppressed.load(Ordering::Acquire)
    }

    pub(crate) fn set_driver(&self, driver: AbortHandle) {
        let mut slot = self.inner.driver.lock();
        if self.is_cancelled() {
            driver.abort();
        } else {
            *slot = Some(driver);
        }
    }

    /// Moves to `next`; false if the transition is not allowed.
    pub(crate) fn advance(&self, next: TaskState) -> bool {
        let mut state = self.inner.state.lock();
        if state.can_transition_to(next) {
            *state = next;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource() -> Resource {
        Resource::from_url(Url::parse("https://example.com/cat.png").unwrap())
    }

    #[test]
    fn test_new_task_is_pending_with_unique_id() {
        let a = RetrieveTask::new(&resource());
        let b = RetrieveTask::new(&resource());
        assert_eq!(a.state(), TaskState::Pending);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.url().as_str(), "https://example.com/cat.png");
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let task = RetrieveTask::new(&resource());
        task.cancel();
        task.cancel();
        assert!(task.is_cancelled());
        assert!(!task.advance(TaskState::Completed));
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        let task = RetrieveTask::completed(&resource());
        task.cancel();
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[test]
    fn test_cancel_while_decoding_suppresses_delivery() {
        let task = RetrieveTask::new(&resource());
        assert!(task.advance(TaskState::Fetching));
        assert!(task.advance(TaskState::Decoding));
        assert!(!task.is_suppressed());

        task.cancel();

        assert_eq!(task.state(), TaskState::Decoding);
        assert!(task.is_suppressed());
        assert!(task.advance(TaskState::Completed));
    }

    #[test]
    fn test_cancel_after_completion_keeps_delivery() {
        let task = RetrieveTask::new(&resource());
        assert!(task.advance(TaskState::Completed));
        task.cancel();
        assert!(!task.is_suppressed());
    }

    #[test]
    fn test_clones_share_state() {
        let task = RetrieveTask::new(&resource());
        let clone = task.clone();
        clone.cancel();
        assert!(task.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_aborts_driver() {
        let task = RetrieveTask::new(&resource());
        let driver = tokio::spawn(std::future::pending::<()>());
        task.set_driver(driver.abort_handle());

        task.cancel();

        assert!(driver.await.unwrap_err().is_cancelled());
    }
}
