use core::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::alloc_api::{AllocHandle, Allocator};
use crate::error::Error;
use crate::future::Future;
use crate::promise::Promise;

/// A stored callable bundled with the promise that receives its result.
///
/// Calling the task applies the callable and completes the promise; a panic
/// in the callable is captured into the future instead of unwinding here.
///
/// # Examples
///
/// ```
/// use sequent::PackagedTask;
///
/// let mut task = PackagedTask::new(|n: i32| n * 2);
/// let future = task.get_future().unwrap();
/// task.call(5).unwrap();
/// assert_eq!(future.get().unwrap(), 10);
/// ```
pub struct PackagedTask<T, R> {
    func: Box<dyn FnMut(T) -> R + Send>,
    promise: Promise<R>,
    alloc: AllocHandle,
}

impl<T, R: Send> PackagedTask<T, R> {
    /// Packages `f` with a fresh promise.
    pub fn new<F>(f: F) -> PackagedTask<T, R>
    where
        F: FnMut(T) -> R + Send + 'static,
    {
        PackagedTask::with_handle(Box::new(f), AllocHandle::global())
    }

    /// Packages `f` with a promise whose chain draws storage from `alloc`.
    pub fn with_allocator<F, A>(f: F, alloc: A) -> PackagedTask<T, R>
    where
        F: FnMut(T) -> R + Send + 'static,
        A: Allocator + Send + Sync + 'static,
    {
        PackagedTask::with_handle(Box::new(f), AllocHandle::new(alloc))
    }

    fn with_handle(func: Box<dyn FnMut(T) -> R + Send>, alloc: AllocHandle) -> PackagedTask<T, R> {
        PackagedTask {
            func,
            promise: Promise::with_handle(alloc.clone()),
            alloc,
        }
    }

    /// Returns the future that receives the callable's result.
    ///
    /// Fails with [`Error::FutureAlreadyRetrieved`] on the second call per
    /// promise; [`reset`](PackagedTask::reset) makes a new one available.
    pub fn get_future(&mut self) -> Result<Future<R>, Error> {
        self.promise.get_future()
    }

    /// Applies the callable to `arg` and completes the promise.
    ///
    /// A panic in the callable is captured and delivered through the future.
    /// Fails with [`Error::PromiseAlreadySatisfied`] when called twice
    /// without a [`reset`](PackagedTask::reset) in between.
    pub fn call(&mut self, arg: T) -> Result<(), Error> {
        if self.promise.is_satisfied() {
            return Err(Error::PromiseAlreadySatisfied);
        }
        match catch_unwind(AssertUnwindSafe(|| (self.func)(arg))) {
            Ok(value) => self.promise.set_value(value),
            Err(payload) => self.promise.set_panic(payload),
        }
    }

    /// Abandons the current promise and starts over with a fresh one,
    /// keeping the stored callable.
    ///
    /// A future taken from the old promise observes
    /// [`Error::BrokenPromise`] if the task was never called.
    pub fn reset(&mut self) {
        self.promise = Promise::with_handle(self.alloc.clone());
    }

    /// Whether the task can still produce a result without a reset.
    pub fn valid(&self) -> bool {
        !self.promise.is_satisfied()
    }
}

impl<T, R> fmt::Debug for PackagedTask<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackagedTask").finish_non_exhaustive()
    }
}
