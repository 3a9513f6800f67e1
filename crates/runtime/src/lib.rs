//! Concurrency and transport plumbing shared by the clients and the
//! pipeline: retry with backoff, token-bucket admission, the two executor
//! pools, pagination and HTTP response handling.

pub mod executor;
pub mod http;
pub mod pagination;
pub mod pools;
pub mod rate_limit;
pub mod retry;

pub use executor::RateLimitedExecutor;
pub use pagination::PageCursor;
pub use pools::{PoolKind, Pools};
pub use rate_limit::TokenBucket;
pub use retry::{RetryPolicy, RetryingCaller};
