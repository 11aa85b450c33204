use core::fmt;

use crate::alloc_api::{Allocator, Global};
use crate::future::Future;
use crate::promise::Promise;

/// A completion token that turns a generic asynchronous operation into a
/// [`Future`].
///
/// An initiating function that accepts a [`CompletionToken`] splits the token
/// into a handler, which it arranges to be called with the operation's
/// result, and the caller's end of the channel. For `UseFuture` that end is a
/// [`Future`] over the result.
///
/// # Examples
///
/// ```
/// use sequent::{CompletionHandler, CompletionToken, USE_FUTURE};
///
/// fn read_answer<T: CompletionToken<i32>>(token: T) -> T::Output {
///     let (handler, output) = token.into_handler();
///     std::thread::spawn(move || handler.complete(42));
///     output
/// }
///
/// let future = read_answer(USE_FUTURE);
/// assert_eq!(future.get().unwrap(), 42);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct UseFuture<A = Global> {
    alloc: A,
}

/// The default [`UseFuture`] token.
pub const USE_FUTURE: UseFuture = UseFuture { alloc: Global };

impl UseFuture<Global> {
    /// A token over the global allocator.
    pub const fn new() -> UseFuture<Global> {
        UseFuture { alloc: Global }
    }
}

impl Default for UseFuture<Global> {
    fn default() -> UseFuture<Global> {
        UseFuture::new()
    }
}

impl<A> UseFuture<A> {
    /// A token whose produced chain draws storage from `alloc`.
    pub const fn with_allocator(alloc: A) -> UseFuture<A> {
        UseFuture { alloc }
    }
}

/// The callable side of a completion token: invoked by the asynchronous
/// operation with its result.
pub trait CompletionHandler<T>: Send + 'static {
    /// Delivers the operation's result.
    fn complete(self, value: T);
}

/// Describes how an asynchronous operation reports its result.
pub trait CompletionToken<T> {
    /// The handler the operation invokes on completion.
    type Handler: CompletionHandler<T>;

    /// What the initiating function returns to the caller.
    type Output;

    /// Splits the token into the handler and the caller's result.
    fn into_handler(self) -> (Self::Handler, Self::Output);
}

/// The handler type produced by [`UseFuture`]: completing it satisfies the
/// wrapped promise.
pub struct PromiseHandler<T> {
    promise: Promise<T>,
}

impl<T: Send + 'static> CompletionHandler<T> for PromiseHandler<T> {
    fn complete(self, value: T) {
        // Sole producer of a fresh channel; cannot already be satisfied.
        let _ = self.promise.set_value(value);
    }
}

impl<T> fmt::Debug for PromiseHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseHandler").finish_non_exhaustive()
    }
}

impl<T, A> CompletionToken<T> for UseFuture<A>
where
    T: Send + 'static,
    A: Allocator + Send + Sync + 'static,
{
    type Handler = PromiseHandler<T>;
    type Output = Future<T>;

    fn into_handler(self) -> (PromiseHandler<T>, Future<T>) {
        let mut promise = Promise::with_allocator(self.alloc);
        let future = promise.get_future().expect("fresh promise");
        (PromiseHandler { promise }, future)
    }
}
