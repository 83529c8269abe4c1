use tokio::runtime::Handle;

use crate::error::{OraRsError, Result};

/// Runs blocking native calls off the event loop.
///
/// Backed by the blocking thread pool of a tokio runtime. The runtime can be
/// the one driving the event loop or a separate one dedicated to native work.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    runtime: Handle,
}

impl WorkerPool {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Uses the blocking pool of the runtime the caller is running on.
    ///
    /// # Panics
    /// Panics when called outside of a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Runs `work` on a pool thread and resolves with its return value.
    /// A panic inside `work` surfaces as a generic error.
    pub async fn submit<F, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.runtime
            .spawn_blocking(work)
            .await
            .map_err(|e| OraRsError::Error(format!("worker task failed: {}", e)))
    }
}
