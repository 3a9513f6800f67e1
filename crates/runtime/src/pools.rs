//! The two executor pools: one for source reads, one for target writes.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};

use crate::executor::RateLimitedExecutor;
use crate::pagination::PageCursor;

/// Which remote system a call goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Source,
    Target,
}

/// Independently tuned executors for the source and the target.
#[derive(Debug, Clone)]
pub struct Pools {
    source: Arc<RateLimitedExecutor>,
    target: Arc<RateLimitedExecutor>,
}

impl Pools {
    pub fn new(source: RateLimitedExecutor, target: RateLimitedExecutor) -> Self {
        Self {
            source: Arc::new(source),
            target: Arc::new(target),
        }
    }

    pub fn executor(&self, kind: PoolKind) -> &Arc<RateLimitedExecutor> {
        match kind {
            PoolKind::Source => &self.source,
            PoolKind::Target => &self.target,
        }
    }

    /// Run `task` through the named pool, suspending only the caller.
    pub async fn run_on<F>(&self, kind: PoolKind, task: F) -> F::Output
    where
        F: Future,
    {
        self.executor(kind).run(task).await
    }

    /// Lazily walk an offset/limit listing, one pool admission per page.
    ///
    /// Each call returns a fresh stream starting at offset 0. A fetch error
    /// is yielded once and ends the stream.
    pub fn stream_pages<'a, T, E, F, Fut>(
        &'a self,
        kind: PoolKind,
        limit: u32,
        fetch: F,
    ) -> impl Stream<Item = Result<Vec<T>, E>> + 'a
    where
        F: FnMut(u32, u32) -> Fut + 'a,
        Fut: Future<Output = Result<Vec<T>, E>> + 'a,
        T: 'a,
        E: 'a,
    {
        stream::unfold(
            (PageCursor::new(limit), fetch),
            move |(mut cursor, mut fetch)| async move {
                if cursor.is_exhausted() {
                    return None;
                }
                let page = self
                    .run_on(kind, fetch(cursor.limit(), cursor.offset()))
                    .await;
                match page {
                    Ok(items) => {
                        cursor.advance(items.len());
                        Some((Ok(items), (cursor, fetch)))
                    }
                    Err(e) => {
                        cursor.finish();
                        Some((Err(e), (cursor, fetch)))
                    }
                }
            },
        )
    }

    /// Drain [`Pools::stream_pages`] into one collection in page order.
    pub async fn collect_all<T, E, F, Fut>(&self, kind: PoolKind, limit: u32, fetch: F) -> Result<Vec<T>, E>
    where
        F: FnMut(u32, u32) -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        let pages = self.stream_pages(kind, limit, fetch);
        futures::pin_mut!(pages);
        let mut all = Vec::new();
        while let Some(page) = pages.try_next().await? {
            all.extend(page);
        }
        Ok(all)
    }
}
