use core::fmt;
use std::any::Any;
use std::sync::Arc;

use crate::alloc_api::{AllocHandle, Allocator};
use crate::chain::Chain;
use crate::error::Error;
use crate::future::Future;
use crate::state::{Fault, RootState};

/// The producing end of a one-shot channel.
///
/// A promise is completed at most once, with [`set_value`] or [`set_panic`].
/// Dropping a promise whose future was taken without completing it publishes
/// [`Error::BrokenPromise`] to the consumer.
///
/// # Examples
///
/// ```
/// use sequent::Promise;
///
/// let mut promise = Promise::new();
/// let future = promise.get_future().unwrap();
///
/// std::thread::spawn(move || {
///     promise.set_value(7).unwrap();
/// });
///
/// assert_eq!(future.get().unwrap(), 7);
/// ```
///
/// [`set_value`]: Promise::set_value
/// [`set_panic`]: Promise::set_panic
pub struct Promise<R> {
    root: Arc<RootState<R>>,
    chain: Chain,
    alloc: AllocHandle,
    future_taken: bool,
}

impl<R: Send> Promise<R> {
    /// Creates a promise over a fresh channel.
    pub fn new() -> Promise<R> {
        Promise::with_handle(AllocHandle::global())
    }

    /// Creates a promise whose continuation chain draws storage from `alloc`.
    ///
    /// The allocator is inherited by every continuation attached through
    /// [`Future::then`] and friends, and handed to executor submissions;
    /// [`Future::then_in`] overrides it for the rest of the chain.
    ///
    /// [`Future::then`]: crate::Future::then
    /// [`Future::then_in`]: crate::Future::then_in
    pub fn with_allocator<A>(alloc: A) -> Promise<R>
    where
        A: Allocator + Send + Sync + 'static,
    {
        Promise::with_handle(AllocHandle::new(alloc))
    }

    pub(crate) fn with_handle(alloc: AllocHandle) -> Promise<R> {
        Promise {
            root: Arc::new(RootState::new()),
            chain: Chain::new(),
            alloc,
            future_taken: false,
        }
    }

    /// Returns the consuming end of the channel.
    ///
    /// Fails with [`Error::FutureAlreadyRetrieved`] on the second call.
    pub fn get_future(&mut self) -> Result<Future<R>, Error> {
        if self.future_taken {
            return Err(Error::FutureAlreadyRetrieved);
        }
        self.future_taken = true;
        Ok(Future::root(
            self.root.clone(),
            self.chain.clone(),
            self.alloc.clone(),
        ))
    }

    /// Completes the channel with `value`, waking waiters and running eager
    /// continuations inline on this thread.
    ///
    /// Fails with [`Error::PromiseAlreadySatisfied`] if the channel already
    /// holds a result.
    ///
    /// # Panics
    ///
    /// If a continuation driven by this completion panics, the payload is
    /// recorded in that stage for its consumer and this call panics on the
    /// producer's thread.
    pub fn set_value(&self, value: R) -> Result<(), Error> {
        self.finish(Ok(value))
    }

    /// Completes the channel with a panic payload; the consumer's
    /// [`Future::get`] resumes unwinding with it.
    ///
    /// Like a value, a payload fires eager continuations immediately: the
    /// fault travels the chain and each stage records it until a consumer
    /// claims it.
    ///
    /// [`Future::get`]: crate::Future::get
    pub fn set_panic(&self, payload: Box<dyn Any + Send>) -> Result<(), Error> {
        self.finish(Err(Fault::Panic(payload)))
    }

    fn finish(&self, outcome: Result<R, Fault>) -> Result<(), Error> {
        let mut guard = self.chain.lock();
        if self.root.shared.is_finished(&mut guard) {
            return Err(Error::PromiseAlreadySatisfied);
        }
        let panicked = match outcome {
            Ok(value) => self.root.shared.finish_value(value, &mut guard),
            Err(fault) => self.root.shared.finish_fault(fault, &mut guard),
        };
        drop(guard);
        if panicked {
            panic!("future continuation panicked");
        }
        Ok(())
    }

    pub(crate) fn is_satisfied(&self) -> bool {
        let mut guard = self.chain.lock();
        self.root.shared.is_finished(&mut guard)
    }
}

impl<R: Send> Default for Promise<R> {
    fn default() -> Promise<R> {
        Promise::new()
    }
}

impl<R> Drop for Promise<R> {
    fn drop(&mut self) {
        if !self.future_taken {
            return;
        }
        let mut guard = self.chain.lock();
        if !self.root.shared.is_finished(&mut guard) {
            // A panicking continuation must not unwind out of a destructor;
            // its payload is still recorded in the chain.
            let _ = self.root.shared.finish_fault(Fault::Broken, &mut guard);
        }
    }
}

impl<R> fmt::Debug for Promise<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("future_taken", &self.future_taken)
            .finish_non_exhaustive()
    }
}
