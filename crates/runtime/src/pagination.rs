//! Offset/limit pagination state.
//!
//! A walk issues pages at `offset = 0, limit, 2 * limit, ...` and ends at the
//! first page holding fewer than `limit` items. A page holding *more* than
//! `limit` items is a protocol violation; it is logged and the walk goes on.

use std::future::Future;

/// Cursor over an offset/limit listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    limit: u32,
    offset: u32,
    calls: u32,
    exhausted: bool,
}

impl PageCursor {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            offset: 0,
            calls: 0,
            exhausted: false,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Offset of the next page to fetch.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Pages fetched so far.
    pub fn calls(&self) -> u32 {
        self.calls
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Record a fetched page of `received` items.
    pub fn advance(&mut self, received: usize) {
        self.calls += 1;
        let limit = self.limit as usize;
        if received > limit {
            tracing::error!(
                limit = self.limit,
                offset = self.offset,
                received,
                "Page holds more items than requested",
            );
        }
        if received < limit {
            self.exhausted = true;
        } else {
            self.offset = self.offset.saturating_add(self.limit);
        }
    }

    /// End the walk early, e.g. after a fetch error.
    pub fn finish(&mut self) {
        self.exhausted = true;
    }
}

/// Drive two collectors concurrently and merge their output into one
/// collection ordered by `key`. The sort is stable: items with equal keys
/// keep `a` before `b`.
pub async fn fan_in_sorted<T, E, K, A, B, F>(a: A, b: B, key: F) -> Result<Vec<T>, E>
where
    A: Future<Output = Result<Vec<T>, E>>,
    B: Future<Output = Result<Vec<T>, E>>,
    F: FnMut(&T) -> K,
    K: Ord,
{
    let (a, b) = tokio::join!(a, b);
    let mut merged = a?;
    merged.extend(b?);
    merged.sort_by_key(key);
    Ok(merged)
}
