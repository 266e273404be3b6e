use std::{collections::BTreeMap, future::Future};

use pledge_model::ConcurrencyLimit;

use super::{Bounded, Flow};
use crate::error::LimitError;

impl Bounded {
    /// Keep the items whose predicate resolves to `true`, in original relative order.
    ///
    /// The predicate receives a clone of each item; the originals are returned.
    pub async fn filter<T, F, Fut, E>(&self, items: Vec<T>, predicate: F) -> Result<Vec<T>, LimitError<E>>
    where
        T: Clone,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<bool, E>> + Send + 'static,
        E: Send + 'static,
    {
        let mut keep = vec![false; items.len()];

        self.drive(items.clone(), predicate, |index, hit| {
            keep[index] = hit;
            Flow::Continue
        })
        .await?;

        Ok(items
            .into_iter()
            .zip(keep)
            .filter_map(|(item, hit)| hit.then_some(item))
            .collect())
    }

    /// Keyed variant of [`Bounded::filter`]: keeps the entries whose predicate resolves to `true`.
    ///
    /// The predicate receives clones of `(key, value)`; the key set of the result is a subset
    /// of the input key set.
    pub async fn filter_keyed<K, V, F, Fut, E>(
        &self,
        map: BTreeMap<K, V>,
        mut predicate: F,
    ) -> Result<BTreeMap<K, V>, LimitError<E>>
    where
        K: Ord + Clone,
        V: Clone,
        F: FnMut(K, V) -> Fut,
        Fut: Future<Output = Result<bool, E>> + Send + 'static,
        E: Send + 'static,
    {
        let entries: Vec<(K, V)> = map.into_iter().collect();
        let mut keep = vec![false; entries.len()];

        self.drive(
            entries.clone(),
            |(key, value)| predicate(key, value),
            |index, hit| {
                keep[index] = hit;
                Flow::Continue
            },
        )
        .await?;

        Ok(entries
            .into_iter()
            .zip(keep)
            .filter_map(|(entry, hit)| hit.then_some(entry))
            .collect())
    }

    /// `true` iff any predicate resolves to `true`.
    ///
    /// Once the first `true` is observed no further item is dispatched and the call resolves
    /// immediately. Predicates already in flight are not retracted: they keep running in the
    /// background (unless the context is cancelled) and their results are ignored.
    pub async fn some<I, F, Fut, E>(&self, items: I, predicate: F) -> Result<bool, LimitError<E>>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<bool, E>> + Send + 'static,
        E: Send + 'static,
    {
        let flow = self
            .drive(items.into_iter().collect(), predicate, |_, hit| {
                if hit { Flow::Halt } else { Flow::Continue }
            })
            .await?;

        Ok(flow == Flow::Halt)
    }
}

/// Shorthand for [`Bounded::filter`]; `limit` defaults to unbounded when `None`.
pub async fn filter<T, F, Fut, E>(
    items: Vec<T>,
    predicate: F,
    limit: Option<ConcurrencyLimit>,
) -> Result<Vec<T>, LimitError<E>>
where
    T: Clone,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<bool, E>> + Send + 'static,
    E: Send + 'static,
{
    Bounded::new(limit.unwrap_or_default())
        .filter(items, predicate)
        .await
}

/// Shorthand for [`Bounded::filter_keyed`]; `limit` defaults to unbounded when `None`.
pub async fn filter_keyed<K, V, F, Fut, E>(
    map: BTreeMap<K, V>,
    predicate: F,
    limit: Option<ConcurrencyLimit>,
) -> Result<BTreeMap<K, V>, LimitError<E>>
where
    K: Ord + Clone,
    V: Clone,
    F: FnMut(K, V) -> Fut,
    Fut: Future<Output = Result<bool, E>> + Send + 'static,
    E: Send + 'static,
{
    Bounded::new(limit.unwrap_or_default())
        .filter_keyed(map, predicate)
        .await
}

/// Shorthand for [`Bounded::some`]; `limit` defaults to unbounded when `None`.
pub async fn some<I, F, Fut, E>(
    items: I,
    predicate: F,
    limit: Option<ConcurrencyLimit>,
) -> Result<bool, LimitError<E>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<bool, E>> + Send + 'static,
    E: Send + 'static,
{
    Bounded::new(limit.unwrap_or_default())
        .some(items, predicate)
        .await
}
