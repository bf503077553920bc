//! Fan-out/join over an ordered list of items.

use futures::future::join_all;
use std::future::Future;

/// Run `op` for every item at once and collect the outputs in input order.
///
/// All operations are started together with no concurrency cap. The output
/// vector always lines up with the input, whichever operation finishes
/// first, and an empty input resolves on its first poll. `op` cannot fail:
/// callers fold their errors into `R`, so one failing resource never holds
/// back its siblings.
pub async fn map_ordered<I, T, F, Fut, R>(items: I, op: F) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    let pending: Vec<Fut> = items.into_iter().map(op).collect();
    if pending.is_empty() {
        return Vec::new();
    }
    join_all(pending).await
}
