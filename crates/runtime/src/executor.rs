//! Rate-limited task executor.
//!
//! Every task first takes a token from the executor's [`TokenBucket`], then a
//! worker permit from a semaphore bounded by `max_workers`. The bucket bounds
//! throughput and the semaphore bounds concurrency. The executor never fails
//! a task itself; it only delays it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::rate_limit::TokenBucket;

#[derive(Debug)]
pub struct RateLimitedExecutor {
    name: String,
    max_workers: usize,
    bucket: TokenBucket,
    workers: Semaphore,
}

impl RateLimitedExecutor {
    /// * `name` - Label used in log fields.
    /// * `max_workers` - Maximum number of tasks in flight.
    /// * `capacity` - Requests admitted per `interval`.
    pub fn new(name: impl Into<String>, max_workers: usize, capacity: u32, interval: Duration) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            name: name.into(),
            max_workers,
            bucket: TokenBucket::new(capacity, interval),
            workers: Semaphore::new(max_workers),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Admit `task` and run it to completion on the caller's task.
    pub async fn run<F>(&self, task: F) -> F::Output
    where
        F: Future,
    {
        self.bucket.acquire().await;
        // The semaphore is never closed, so a permit is always granted.
        let _permit = self.workers.acquire().await.ok();
        tracing::trace!(
            pool = %self.name,
            in_flight = self.max_workers - self.workers.available_permits(),
            "Task admitted",
        );
        task.await
    }

    /// Admit `task` and run it on a spawned tokio task.
    pub fn submit<F>(self: &Arc<Self>, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let executor = Arc::clone(self);
        tokio::spawn(async move { executor.run(task).await })
    }
}
