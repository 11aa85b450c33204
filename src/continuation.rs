use std::cell::UnsafeCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::alloc_api::{AllocHandle, RawBox};
use crate::chain::ChainGuard;
use crate::state::{Continuation, Fault, Shared, Source};

/// When a chained continuation runs relative to its parent's completion and
/// the consumer's demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Run at the earliest opportunity: when the parent completes, or eagerly
    /// when a consumer demands the result first.
    Any,

    /// Run exactly when the parent completes, even if nothing ever demands
    /// the result.
    Set,

    /// Run only once a consumer demands the result, even if the parent
    /// completed long before.
    Get,
}

/// The mutable half of a link that is consumed on activation: the upstream
/// handle and the stored callable, plus the flag that arbitrates between a
/// completion-driven and a demand-driven activation.
pub(crate) struct LinkCell<P, F> {
    pub(crate) parent: Option<Arc<dyn Source<P>>>,
    pub(crate) func: Option<RawBox<F>>,
    pub(crate) started: bool,
}

/// A continuation stage: a shared state of its own, plus the callable that
/// computes it from the parent stage's result.
pub(crate) struct Link<P, R, F> {
    shared: Shared<R>,
    trigger: Trigger,
    cell: UnsafeCell<LinkCell<P, F>>,
}

// Safety: as with `Shared`, the cell is only reachable under the chain lock.
unsafe impl<P: Send, R: Send, F: Send> Send for Link<P, R, F> {}
unsafe impl<P: Send, R: Send, F: Send> Sync for Link<P, R, F> {}

impl<P, R, F> Link<P, R, F> {
    pub(crate) fn new(
        trigger: Trigger,
        parent: Arc<dyn Source<P>>,
        func: F,
        alloc: AllocHandle,
    ) -> Link<P, R, F> {
        Link {
            shared: Shared::new(),
            trigger,
            cell: UnsafeCell::new(LinkCell {
                parent: Some(parent),
                func: Some(RawBox::new_in(func, alloc)),
                started: false,
            }),
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn cell<'a>(&'a self, _guard: &'a mut ChainGuard<'_>) -> &'a mut LinkCell<P, F> {
        // Safety: the guard proves the root mutex is held.
        unsafe { &mut *self.cell.get() }
    }
}

impl<P, R, F> Link<P, R, F>
where
    P: Send + 'static,
    R: Send + 'static,
    F: FnOnce(P) -> R + Send + 'static,
{
    /// Consumes the parent's result and runs the callable, publishing into
    /// this stage. The caller has already claimed the activation by setting
    /// `started` under the lock.
    ///
    /// A fault in the parent is forwarded without running the callable,
    /// preserving the original payload for the final consumer.
    fn activate(&self, guard: &mut ChainGuard<'_>) -> bool {
        let (parent, func) = {
            let cell = self.cell(guard);
            debug_assert!(cell.started);
            let parent = cell.parent.take().expect("link activated twice");
            let func = cell.func.take().expect("link activated twice");
            (parent, func)
        };
        let input = parent.state().take(guard);
        // The chain above this stage is consumed; release it.
        drop(parent);
        match input {
            Ok(value) => {
                let func = func.into_inner();
                let output = guard.unlocked(move || catch_unwind(AssertUnwindSafe(move || func(value))));
                match output {
                    Ok(result) => self.shared.finish_value(result, guard),
                    Err(payload) => {
                        let _ = self.shared.finish_fault(Fault::Panic(payload), guard);
                        true
                    }
                }
            }
            Err(fault) => {
                drop(func);
                self.shared.finish_fault(fault, guard)
            }
        }
    }
}

impl<P, R, F> Continuation for Link<P, R, F>
where
    P: Send + 'static,
    R: Send + 'static,
    F: FnOnce(P) -> R + Send + 'static,
{
    fn result_ready(&self, guard: &mut ChainGuard<'_>) -> bool {
        {
            let cell = self.cell(guard);
            if cell.started {
                return false;
            }
            if let Trigger::Get = self.trigger {
                // Stay lazy; a demand will come back through `request`.
                return false;
            }
            cell.started = true;
        }
        self.activate(guard)
    }
}

impl<P, R, F> Source<R> for Link<P, R, F>
where
    P: Send + 'static,
    R: Send + 'static,
    F: FnOnce(P) -> R + Send + 'static,
{
    fn state(&self) -> &Shared<R> {
        &self.shared
    }

    fn request(&self, guard: &mut ChainGuard<'_>) {
        if self.shared.is_finished(guard) {
            return;
        }
        if self.cell(guard).started {
            // Another thread is already producing this result.
            while !self.shared.is_finished(guard) {
                guard.wait(&self.shared.ready);
            }
            return;
        }
        match self.trigger {
            Trigger::Set => {
                // Pass the demand upward; the publisher runs the callable
                // when the parent completes, firing `result_ready` while we
                // wait here.
                let parent = self.cell(guard).parent.clone().expect("link has a parent");
                parent.request(guard);
                while !self.shared.is_finished(guard) {
                    guard.wait(&self.shared.ready);
                }
            }
            Trigger::Any | Trigger::Get => {
                self.cell(guard).started = true;
                let parent = self.cell(guard).parent.clone().expect("link has a parent");
                parent.request(guard);
                drop(parent);
                // The demander claims the panic payload through `get`, so the
                // producer-side flag has no one left to bubble to.
                let _ = self.activate(guard);
            }
        }
    }
}
