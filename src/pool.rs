//! Bounded pool for blocking work.
//!
//! Jobs run on tokio's blocking threads, but at most `workers` of them at a
//! time. Callers beyond the bound wait for a permit in arrival order; nothing
//! is dropped.

use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::trace;

/// Recommended number of concurrent blocking jobs
pub const DEFAULT_WORKERS: usize = 10;

/// Worker pool errors
#[derive(Debug)]
pub enum PoolError {
    /// The permit semaphore was closed
    Closed,
    /// The job panicked or was cancelled
    Panicked(JoinError),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Closed => write!(f, "worker pool is closed"),
            PoolError::Panicked(e) => write!(f, "worker job failed: {e}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Fixed-size pool of blocking workers
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        WorkerPool {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` on a worker and wait for its result.
    ///
    /// The permit is owned by the job, so it is held until the job finishes
    /// even if the caller stops waiting.
    pub async fn run<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        trace!(
            available = self.permits.available_permits(),
            "Dispatching job to worker"
        );

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });

        handle.await.map_err(PoolError::Panicked)
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_result() {
        let pool = WorkerPool::new(2);
        let value = pool.run(|| 21 * 2).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_jobs_beyond_bound_queue() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..12 {
            let pool = pool.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    running.fetch_sub(1, Ordering::SeqCst);
                    i
                })
                .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(results, (0..12).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panicking_job() {
        let pool = WorkerPool::new(1);
        let result = pool.run(|| -> usize { panic!("scan failed") }).await;
        assert!(matches!(result, Err(PoolError::Panicked(_))));

        // The permit is released and the pool keeps working
        assert_eq!(pool.run(|| 1).await.unwrap(), 1);
    }

    #[test]
    fn test_default_workers() {
        assert_eq!(WorkerPool::default().workers(), DEFAULT_WORKERS);
    }
}
