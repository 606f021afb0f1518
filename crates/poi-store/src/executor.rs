//! Background execution helpers
//!
//! CPU-bound work goes to a rayon [`WorkerPool`] and is awaited through a
//! oneshot channel; async orchestration tasks go through [`spawn`].

use crate::{Result, StoreError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Spawn an async task on the current tokio runtime.
///
/// Used for reload tasks and for the detached downloads that outlive them.
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    // Tag spawned tasks so they can be told apart in profiler traces
    #[cfg(feature = "profiling")]
    {
        tokio::spawn(async move {
            profiling::scope!(
                "executor::spawn",
                format!("task_type={}", std::any::type_name::<F>()).as_str()
            );
            future.await
        })
    }
    #[cfg(not(feature = "profiling"))]
    {
        tokio::spawn(future)
    }
}

/// Pool of worker threads for decoding, cache writes and clustering
#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<rayon::ThreadPool>,
}

impl WorkerPool {
    /// Create a pool with `threads` workers; 0 picks one per CPU core
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("poi-worker-{i}"))
            .panic_handler(|_| tracing::error!("Worker task panicked"))
            .build()
            .map_err(|e| StoreError::Worker(e.to_string()))?;
        tracing::debug!(threads = pool.current_num_threads(), "Worker pool started");
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `task` on the pool and await its result
    ///
    /// The task starts right away, even if the returned future is never polled.
    pub fn run<F, R>(&self, task: F) -> impl Future<Output = Result<R>> + Send + 'static
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            // The receiver may be gone when the caller lost interest
            let _ = tx.send(task());
        });
        async move {
            rx.await
                .map_err(|_| StoreError::Worker("task panicked before completing".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_returns_result() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.threads(), 2);
        let sum = pool.run(|| (1..=10u32).sum::<u32>()).await.unwrap();
        assert_eq!(sum, 55);
    }

    #[tokio::test]
    async fn test_panicking_task_reports_error() {
        let pool = WorkerPool::new(1).unwrap();
        let result = pool.run(|| -> u32 { panic!("boom") }).await;
        assert!(matches!(result, Err(StoreError::Worker(_))));
        // The pool survives the panic
        assert_eq!(pool.run(|| 7).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_nested_parallelism_uses_pool() {
        let pool = WorkerPool::new(2).unwrap();
        let (a, b) = pool
            .run(|| rayon::join(|| rayon::current_num_threads(), || 3))
            .await
            .unwrap();
        assert_eq!((a, b), (2, 3));
    }

    #[tokio::test]
    async fn test_spawn_runs_task() {
        assert_eq!(spawn(async { 21 * 2 }).await.unwrap(), 42);
    }
}
