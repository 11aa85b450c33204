use core::fmt;
use std::panic;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alloc_api::{AllocHandle, Allocator};
use crate::chain::{Chain, ChainGuard};
use crate::continuation::{Link, Trigger};
use crate::error::Error;
use crate::executor::{ExecLink, Executor, Submit};
use crate::state::{Fault, RootState, Shared, Source};

/// The result of a timed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    /// The channel finished before the wait ended.
    Ready,

    /// The timeout elapsed first. The waiter may retry.
    Timeout,
}

/// The stage a future consumes: either the promise's root state or a
/// continuation link somewhere down the chain.
///
/// The root variant is kept concrete so that plain channels work for any
/// `R: Send`, including borrowed results; only attaching continuations
/// requires `'static`.
enum Stage<R> {
    Root(Arc<RootState<R>>),
    Link(Arc<dyn Source<R>>),
}

impl<R: Send> Stage<R> {
    fn state(&self) -> &Shared<R> {
        match self {
            Stage::Root(root) => &root.shared,
            Stage::Link(link) => link.state(),
        }
    }

    fn request(&self, guard: &mut ChainGuard<'_>) {
        match self {
            Stage::Root(root) => root.request(guard),
            Stage::Link(link) => link.request(guard),
        }
    }
}

impl<R: Send + 'static> Stage<R> {
    fn as_source(&self) -> Arc<dyn Source<R>> {
        match self {
            Stage::Root(root) => root.clone(),
            Stage::Link(link) => link.clone(),
        }
    }
}

/// The consuming end of a one-shot channel.
///
/// A future is claimed exactly once: [`get`] consumes it, as does chaining a
/// continuation with [`then`] and its variants. Waiting does not consume.
///
/// # Examples
///
/// Chaining continuations with different triggers:
///
/// ```
/// use sequent::{Promise, Trigger};
///
/// let mut promise = Promise::new();
/// let future = promise
///     .get_future()
///     .unwrap()
///     .then(|n: i32| n * 2)
///     .then_on(Trigger::Get, |n| n + 1);
///
/// promise.set_value(10).unwrap();
/// assert_eq!(future.get().unwrap(), 21);
/// ```
///
/// [`get`]: Future::get
/// [`then`]: Future::then
#[must_use = "a future does nothing unless consumed"]
pub struct Future<R> {
    stage: Stage<R>,
    chain: Chain,
    alloc: AllocHandle,
}

impl<R: Send> Future<R> {
    pub(crate) fn root(root: Arc<RootState<R>>, chain: Chain, alloc: AllocHandle) -> Future<R> {
        Future {
            stage: Stage::Root(root),
            chain,
            alloc,
        }
    }

    /// Claims the result, blocking until the channel finishes and driving any
    /// demand-triggered continuations up the chain.
    ///
    /// Returns [`Error::BrokenPromise`] when the producer was dropped without
    /// completing.
    ///
    /// # Panics
    ///
    /// Resumes unwinding when the chain carries a captured panic, with the
    /// original payload.
    pub fn get(self) -> Result<R, Error> {
        let mut guard = self.chain.lock();
        if !self.stage.state().is_finished(&mut guard) {
            self.stage.request(&mut guard);
        }
        match self.stage.state().take(&mut guard) {
            Ok(value) => Ok(value),
            Err(Fault::Broken) => Err(Error::BrokenPromise),
            Err(Fault::Panic(payload)) => {
                drop(guard);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Whether this future still refers to an unclaimed result.
    pub fn valid(&self) -> bool {
        let mut guard = self.chain.lock();
        self.stage.state().is_valid(&mut guard)
    }

    /// Blocks until the channel finishes, driving demand-triggered
    /// continuations like [`get`](Future::get) does.
    pub fn wait(&self) {
        let mut guard = self.chain.lock();
        if !self.stage.state().is_finished(&mut guard) {
            self.stage.request(&mut guard);
        }
    }

    /// Waits for the channel to finish, giving up after `timeout`.
    ///
    /// Timed waits do not signal demand, so they never run a `Get`-triggered
    /// continuation; they only observe completion.
    pub fn wait_for(&self, timeout: Duration) -> FutureStatus {
        self.block_until(Instant::now().checked_add(timeout))
    }

    /// Waits for the channel to finish, giving up at `deadline`.
    ///
    /// Like [`wait_for`](Future::wait_for), this does not signal demand.
    pub fn wait_until(&self, deadline: Instant) -> FutureStatus {
        self.block_until(Some(deadline))
    }

    fn block_until(&self, deadline: Option<Instant>) -> FutureStatus {
        let mut guard = self.chain.lock();
        let state = self.stage.state();
        loop {
            if state.is_finished(&mut guard) {
                return FutureStatus::Ready;
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return FutureStatus::Timeout;
                    }
                    guard.wait_timeout(&state.ready, deadline - now);
                }
                None => guard.wait(&state.ready),
            }
        }
    }
}

impl<R: Send + 'static> Future<R> {
    /// Chains `f` to run at the earliest opportunity, consuming this future.
    ///
    /// Equivalent to `then_on(Trigger::Any, f)`.
    pub fn then<U, F>(self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(R) -> U + Send + 'static,
    {
        self.then_on(Trigger::Any, f)
    }

    /// Chains `f` under the given trigger policy, consuming this future.
    ///
    /// The new future shares the chain's root mutex and inherits its
    /// allocator.
    pub fn then_on<U, F>(self, trigger: Trigger, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(R) -> U + Send + 'static,
    {
        let alloc = self.alloc.clone();
        self.attach_link(trigger, f, alloc)
    }

    /// Like [`then_on`](Future::then_on), with `alloc` providing storage for
    /// this link and the rest of the chain.
    pub fn then_in<U, F, A>(self, trigger: Trigger, f: F, alloc: A) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(R) -> U + Send + 'static,
        A: Allocator + Send + Sync + 'static,
    {
        self.attach_link(trigger, f, AllocHandle::new(alloc))
    }

    /// Chains `f` to run on `exec`, submitted with the given mode when the
    /// parent's result is ready or demanded.
    pub fn then_via<U, F, E>(self, mode: Submit, exec: &E, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(R) -> U + Send + 'static,
        E: Executor,
    {
        let alloc = self.alloc.clone();
        self.attach_exec(mode, exec.clone(), f, alloc)
    }

    /// Like [`then_via`](Future::then_via), with `alloc` providing storage
    /// for this link and the rest of the chain.
    pub fn then_via_in<U, F, E, A>(self, mode: Submit, exec: &E, f: F, alloc: A) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(R) -> U + Send + 'static,
        E: Executor,
        A: Allocator + Send + Sync + 'static,
    {
        self.attach_exec(mode, exec.clone(), f, AllocHandle::new(alloc))
    }

    fn attach_link<U, F>(self, trigger: Trigger, f: F, alloc: AllocHandle) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(R) -> U + Send + 'static,
    {
        let parent = self.stage.as_source();
        let link: Arc<Link<R, U, F>> = Arc::new(Link::new(trigger, parent, f, alloc.clone()));
        let mut guard = self.chain.lock();
        // A panic from an immediately-fired continuation stays recorded in
        // the new stage; the returned future claims it.
        let _ = self.stage.state().attach(link.clone(), &mut guard);
        drop(guard);
        Future {
            stage: Stage::Link(link),
            chain: self.chain.clone(),
            alloc,
        }
    }

    fn attach_exec<U, F, E>(self, mode: Submit, exec: E, f: F, alloc: AllocHandle) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(R) -> U + Send + 'static,
        E: Executor,
    {
        let parent = self.stage.as_source();
        let link: Arc<ExecLink<R, U, F, E>> =
            ExecLink::new(mode, exec, parent, f, self.chain.clone(), alloc.clone());
        let mut guard = self.chain.lock();
        let _ = self.stage.state().attach(link.clone(), &mut guard);
        drop(guard);
        Future {
            stage: Stage::Link(link),
            chain: self.chain.clone(),
            alloc,
        }
    }
}

impl<R: Send> fmt::Debug for Future<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut guard = self.chain.lock();
        let finished = self.stage.state().is_finished(&mut guard);
        drop(guard);
        f.debug_struct("Future")
            .field("finished", &finished)
            .finish_non_exhaustive()
    }
}
