//! Bounded concurrent processing helpers

use futures::stream::{self, Stream, StreamExt};

/// Run `processor` over `items` with at most `max_concurrent` futures in
/// flight, yielding results in completion order.
pub fn stream_concurrent<T, F, Fut, R>(
    items: impl IntoIterator<Item = T>,
    max_concurrent: usize,
    processor: F,
) -> impl Stream<Item = R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items)
        .map(processor)
        .buffer_unordered(max_concurrent.max(1))
}

/// Process items concurrently with a limit, collecting every result.
///
/// Results are in completion order, not submission order.
pub async fn process_concurrent<T, F, Fut, R>(
    items: impl IntoIterator<Item = T>,
    max_concurrent: usize,
    processor: F,
) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream_concurrent(items, max_concurrent, processor)
        .collect()
        .await
}

/// Worker count matching the machine's available parallelism
pub fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
