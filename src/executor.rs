use std::cell::UnsafeCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use crate::alloc_api::{AllocHandle, RawBox};
use crate::chain::{Chain, ChainGuard};
use crate::continuation::LinkCell;
use crate::state::{Continuation, Fault, Shared, Source};

/// How a continuation closure is handed to an [`Executor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    /// May run the closure inline on the submitting thread if the executor's
    /// policy allows it.
    Dispatch,

    /// Always enqueues; the closure runs on a later turn of the executor.
    Post,

    /// Enqueues with the hint that the closure should run after the work
    /// already queued.
    Defer,
}

/// An execution context that continuation closures can be submitted to.
///
/// The closure is always submitted with the chain lock released, so a
/// [`Submit::Dispatch`] submission may legally run it inline. The allocator
/// handle is the one threaded through the chain; an executor may use it for
/// its internal closure storage.
pub trait Executor: Clone + Send + Sync + 'static {
    /// Runs `task` inline if policy allows, otherwise enqueues it.
    fn dispatch<F>(&self, task: F, alloc: &AllocHandle)
    where
        F: FnOnce() + Send + 'static;

    /// Enqueues `task`.
    fn post<F>(&self, task: F, alloc: &AllocHandle)
    where
        F: FnOnce() + Send + 'static;

    /// Enqueues `task` behind the work already queued.
    fn defer<F>(&self, task: F, alloc: &AllocHandle)
    where
        F: FnOnce() + Send + 'static;
}

/// A continuation stage whose callable runs on an executor instead of inline.
///
/// Behaves like a [`Trigger::Any`] link, except that activation builds a
/// closure and hands it to the executor; the closure applies the callable,
/// re-acquires the chain lock and publishes into this stage.
///
/// [`Trigger::Any`]: crate::Trigger::Any
pub(crate) struct ExecLink<P, R, F, E> {
    shared: Shared<R>,
    mode: Submit,
    exec: E,
    alloc: AllocHandle,
    chain: Chain,
    // Self-handle for the submitted closure, set at construction.
    weak: Weak<ExecLink<P, R, F, E>>,
    cell: UnsafeCell<LinkCell<P, F>>,
}

// Safety: as with `Shared`, the cell is only reachable under the chain lock.
unsafe impl<P: Send, R: Send, F: Send, E: Send + Sync> Send for ExecLink<P, R, F, E> {}
unsafe impl<P: Send, R: Send, F: Send, E: Send + Sync> Sync for ExecLink<P, R, F, E> {}

impl<P, R, F, E> ExecLink<P, R, F, E> {
    pub(crate) fn new(
        mode: Submit,
        exec: E,
        parent: Arc<dyn Source<P>>,
        func: F,
        chain: Chain,
        alloc: AllocHandle,
    ) -> Arc<ExecLink<P, R, F, E>> {
        Arc::new_cyclic(|weak| ExecLink {
            shared: Shared::new(),
            mode,
            exec,
            alloc: alloc.clone(),
            chain,
            weak: weak.clone(),
            cell: UnsafeCell::new(LinkCell {
                parent: Some(parent),
                func: Some(RawBox::new_in(func, alloc)),
                started: false,
            }),
        })
    }

    #[allow(clippy::mut_from_ref)]
    fn cell<'a>(&'a self, _guard: &'a mut ChainGuard<'_>) -> &'a mut LinkCell<P, F> {
        // Safety: the guard proves the root mutex is held.
        unsafe { &mut *self.cell.get() }
    }
}

impl<P, R, F, E> ExecLink<P, R, F, E>
where
    P: Send + 'static,
    R: Send + 'static,
    F: FnOnce(P) -> R + Send + 'static,
    E: Executor,
{
    /// Consumes the parent's result and submits the continuation closure.
    /// Submission happens with the chain lock released.
    fn submit(&self, guard: &mut ChainGuard<'_>) {
        let (parent, func) = {
            let cell = self.cell(guard);
            debug_assert!(cell.started);
            let parent = cell.parent.take().expect("link activated twice");
            let func = cell.func.take().expect("link activated twice");
            (parent, func)
        };
        let input = parent.state().take(guard);
        drop(parent);

        let this = self.weak.upgrade().expect("link is alive during activation");
        let chain = self.chain.clone();
        let task = move || {
            let (outcome, own_panic) = match input {
                Ok(value) => {
                    match catch_unwind(AssertUnwindSafe(move || (func.into_inner())(value))) {
                        Ok(result) => (Ok(result), false),
                        Err(payload) => (Err(Fault::Panic(payload)), true),
                    }
                }
                Err(fault) => (Err(fault), false),
            };
            let mut guard = chain.lock();
            let downstream_panic = match outcome {
                Ok(result) => this.shared.finish_value(result, &mut guard),
                Err(fault) => this.shared.finish_fault(fault, &mut guard),
            };
            drop(guard);
            if own_panic || downstream_panic {
                panic!("future continuation panicked");
            }
        };

        let exec = self.exec.clone();
        let alloc = self.alloc.clone();
        let mode = self.mode;
        guard.unlocked(move || match mode {
            Submit::Dispatch => exec.dispatch(task, &alloc),
            Submit::Post => exec.post(task, &alloc),
            Submit::Defer => exec.defer(task, &alloc),
        });
    }
}

impl<P, R, F, E> Continuation for ExecLink<P, R, F, E>
where
    P: Send + 'static,
    R: Send + 'static,
    F: FnOnce(P) -> R + Send + 'static,
    E: Executor,
{
    fn result_ready(&self, guard: &mut ChainGuard<'_>) -> bool {
        {
            let cell = self.cell(guard);
            if cell.started {
                return false;
            }
            cell.started = true;
        }
        self.submit(guard);
        // Panics surface on whichever thread runs the closure.
        false
    }
}

impl<P, R, F, E> Source<R> for ExecLink<P, R, F, E>
where
    P: Send + 'static,
    R: Send + 'static,
    F: FnOnce(P) -> R + Send + 'static,
    E: Executor,
{
    fn state(&self) -> &Shared<R> {
        &self.shared
    }

    fn request(&self, guard: &mut ChainGuard<'_>) {
        if self.shared.is_finished(guard) {
            return;
        }
        if !self.cell(guard).started {
            self.cell(guard).started = true;
            let parent = self.cell(guard).parent.clone().expect("link has a parent");
            parent.request(guard);
            drop(parent);
            self.submit(guard);
        }
        // The executor publishes from one of its own threads (or already did,
        // inline, for a dispatch submission).
        while !self.shared.is_finished(guard) {
            guard.wait(&self.shared.ready);
        }
    }
}
