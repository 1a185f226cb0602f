//! Execution context for result callbacks.

use tokio::sync::mpsc;
use tracing::trace;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where retrieval callbacks run.
#[derive(Clone, Debug)]
pub enum CallbackQueue {
    /// Run on whichever task produced the result.
    Immediate,
    /// Run one after another on a dedicated task.
    Serial(SerialQueue),
}

impl CallbackQueue {
    /// Creates a new serial queue.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn serial() -> Self {
        Self::Serial(SerialQueue::new())
    }

    /// Schedules `job`.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        match self {
            Self::Immediate => job(),
            Self::Serial(queue) => queue.execute(Box::new(job)),
        }
    }
}

/// FIFO queue draining jobs on a single Tokio task.
#[derive(Clone)]
pub struct SerialQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl SerialQueue {
    /// Spawns the draining task.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                job();
            }
            trace!("Callback queue closed");
        });
        Self { sender }
    }

    fn execute(&self, job: Job) {
        // Runtime gone: run inline rather than lose the callback.
        if let Err(mpsc::error::SendError(job)) = self.sender.send(job) {
            job();
        }
    }
}

impl Default for SerialQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::sync::oneshot;

    #[test]
    fn test_immediate_runs_inline() {
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        CallbackQueue::Immediate.execute(move || *counter.lock() += 1);
        assert_eq!(*hits.lock(), 1);
    }

    #[tokio::test]
    async fn test_serial_preserves_order() {
        let queue = CallbackQueue::serial();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let seen = Arc::clone(&seen);
            queue.execute(move || seen.lock().push(i));
        }
        let (done_tx, done_rx) = oneshot::channel();
        queue.execute(move || {
            let _ = done_tx.send(());
        });

        done_rx.await.unwrap();
        assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
    }
}
