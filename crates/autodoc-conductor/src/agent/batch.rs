use futures::future::join_all;
use std::future::Future;
use tracing::debug;

/// Process `items` in fixed-size batches. Within a batch all futures run
/// concurrently; a batch fully resolves before the next one starts.
///
/// Results come back in input order. Callers merge them into shared state
/// only after this returns.
pub async fn run_batched<T, R, F, Fut>(items: Vec<T>, batch_size: usize, f: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let batch_size = batch_size.max(1);
    let total = items.len();
    let mut results = Vec::with_capacity(total);
    let mut iter = items.into_iter().peekable();
    let mut batch_no = 0usize;

    while iter.peek().is_some() {
        let batch: Vec<T> = iter.by_ref().take(batch_size).collect();
        batch_no += 1;
        debug!(batch = batch_no, size = batch.len(), total, "processing batch");
        results.extend(join_all(batch.into_iter().map(&f)).await);
    }
    results
}
