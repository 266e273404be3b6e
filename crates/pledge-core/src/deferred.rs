//! Externally settled futures.
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

use crate::error::CallbackError;

/// Future half of a deferred value; resolves once its [`DeferredHandle`] is settled.
///
/// Dropping the handle without settling it fails the future with [`CallbackError::Dropped`].
#[derive(Debug)]
pub struct Deferred<T, E> {
    rx: oneshot::Receiver<Result<T, CallbackError<E>>>,
}

/// Settling half of a deferred value. Every settling method consumes the handle, so a
/// deferred settles at most once.
#[derive(Debug)]
pub struct DeferredHandle<T, E> {
    tx: oneshot::Sender<Result<T, CallbackError<E>>>,
}

impl<T, E> Deferred<T, E> {
    pub fn new() -> (Deferred<T, E>, DeferredHandle<T, E>) {
        let (tx, rx) = oneshot::channel();
        (Deferred { rx }, DeferredHandle { tx })
    }
}

impl<T, E> DeferredHandle<T, E> {
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(self, err: E) {
        self.settle(Err(err));
    }

    /// Settle with `outcome`. A no-op when the [`Deferred`] was already dropped.
    pub fn settle(self, outcome: Result<T, E>) {
        self.send(outcome.map_err(CallbackError::Failed));
    }

    fn send(self, outcome: Result<T, CallbackError<E>>) {
        let _ = self.tx.send(outcome);
    }

    /// Node-style completion: a present `err` wins over `value`. Without an error the future
    /// always resolves, with `T::default()` when no value was passed (`()` for void operations).
    pub fn call(self, err: Option<E>, value: Option<T>)
    where
        T: Default,
    {
        match err {
            Some(err) => self.reject(err),
            None => self.resolve(value.unwrap_or_default()),
        }
    }

    /// `true` once the [`Deferred`] side is gone and settling would be discarded.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T, E> Future for Deferred<T, E> {
    type Output = Result<T, CallbackError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(CallbackError::Dropped)))
    }
}
