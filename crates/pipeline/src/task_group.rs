//! Structured concurrency for stage children.

use std::future::Future;

use futures::future::join_all;

/// Await every task, then surface the first error in submission order.
///
/// A failing child never cancels its siblings: all of them run to
/// completion before the group returns.
pub async fn join_group<I, F, T, E>(tasks: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let results = join_all(tasks).await;
    let mut values = Vec::with_capacity(results.len());
    let mut first_error = None;
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(values),
    }
}
