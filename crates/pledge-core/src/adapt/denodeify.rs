use crate::deferred::{Deferred, DeferredHandle};

/// Trailing completion callback handed to a callback-style operation.
///
/// Call [`DeferredHandle::call`] with `(err, value)`, or use `resolve` / `reject` directly.
pub type NodeCallback<T, E> = DeferredHandle<T, E>;

/// Adapt a callback-style operation into one returning a future.
///
/// `op` receives the receiver, its positional arguments (a tuple for several) and a trailing
/// [`NodeCallback`]. The returned function takes the same receiver and arguments, invokes `op`
/// right away with the very same receiver reference, and hands back a [`Deferred`] that
/// settles with whatever the callback reports:
///
/// - no error resolves it, with the reported value or `T::default()` when there is none;
/// - a present error fails it with [`CallbackError::Failed`](crate::CallbackError::Failed);
/// - a callback dropped without being invoked fails it with
///   [`CallbackError::Dropped`](crate::CallbackError::Dropped).
pub fn denodeify<R, A, T, E, F>(op: F) -> impl Fn(&R, A) -> Deferred<T, E>
where
    R: ?Sized,
    F: Fn(&R, A, NodeCallback<T, E>),
{
    move |receiver: &R, args: A| {
        let (deferred, callback) = Deferred::new();
        op(receiver, args, callback);
        deferred
    }
}
