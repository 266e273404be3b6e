use std::future::Future;

/// First item whose predicate resolves to `true`, checked strictly in order.
///
/// Each predicate is awaited before the next item is looked at; the search stops at the
/// first hit. The predicate is never called for an empty input.
pub async fn async_find<I, F, Fut>(items: I, mut predicate: F) -> Option<I::Item>
where
    I: IntoIterator,
    F: FnMut(&I::Item) -> Fut,
    Fut: Future<Output = bool>,
{
    for item in items {
        if predicate(&item).await {
            return Some(item);
        }
    }
    None
}

/// First `Some` produced by `f`, trying items strictly in order.
pub async fn async_find_map<I, F, Fut, R>(items: I, mut f: F) -> Option<R>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Option<R>>,
{
    for item in items {
        if let Some(found) = f(item).await {
            return Some(found);
        }
    }
    None
}
