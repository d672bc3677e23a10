//! Bounded pool for blocking privileged work
//!
//! Jobs are queued on the async runtime, wait for a semaphore permit, and
//! then run on the blocking thread pool. Dispatch never blocks the caller.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

/// Errors surfaced by a dispatched job
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,

    #[error("worker job failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Bounded set of workers for blocking jobs
#[derive(Debug, Clone)]
pub struct WorkerPool {
    runtime: Handle,
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool running at most `size` jobs at once on `runtime`
    pub fn new(runtime: Handle, size: usize) -> Self {
        let size = size.max(1);
        Self {
            runtime,
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Runtime the pool spawns onto
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Maximum number of concurrent jobs
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of jobs currently holding a worker
    pub fn busy(&self) -> usize {
        self.size.saturating_sub(self.permits.available_permits())
    }

    /// Queue `job` without waiting for it to start
    ///
    /// Safe to call from threads outside the runtime.
    pub fn dispatch<F, T>(&self, job: F) -> JoinHandle<Result<T, PoolError>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.runtime.spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|_| {
                warn!("job rejected, worker pool closed");
                PoolError::Closed
            })?;
            Ok::<T, PoolError>(tokio::task::spawn_blocking(job).await?)
        })
    }

    /// Refuse any job that has not yet acquired a worker
    pub fn close(&self) {
        self.permits.close();
    }
}
