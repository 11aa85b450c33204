use std::any::Any;
use std::cell::UnsafeCell;
use std::mem;
use std::sync::{Arc, Condvar};

use crate::chain::ChainGuard;

/// What a failed stage carries in place of a value.
pub(crate) enum Fault {
    /// The producing end was dropped without completing.
    Broken,

    /// A user callable panicked. The payload resumes unwinding when the
    /// result is claimed.
    Panic(Box<dyn Any + Send>),
}

enum Outcome<R> {
    Pending,
    Value(R),
    Fault(Fault),
}

/// The synchronized cell of one chain stage.
///
/// Holds the result slot, the `finished` and `valid` flags and the downstream
/// link, all guarded by the chain's root mutex. The condition variable is
/// backed by that same mutex and signals this stage's readiness.
pub(crate) struct Shared<R> {
    pub(crate) ready: Condvar,
    cell: UnsafeCell<Cell<R>>,
}

struct Cell<R> {
    outcome: Outcome<R>,
    finished: bool,
    valid: bool,
    downstream: Option<Arc<dyn Continuation>>,
}

// Safety: the cell is only reachable through methods that take a `ChainGuard`
// for the chain this stage belongs to, so all access is serialized by the
// root mutex.
unsafe impl<R: Send> Send for Shared<R> {}
unsafe impl<R: Send> Sync for Shared<R> {}

impl<R> Shared<R> {
    pub(crate) fn new() -> Shared<R> {
        Shared {
            ready: Condvar::new(),
            cell: UnsafeCell::new(Cell {
                outcome: Outcome::Pending,
                finished: false,
                valid: true,
                downstream: None,
            }),
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn cell<'a>(&'a self, _guard: &'a mut ChainGuard<'_>) -> &'a mut Cell<R> {
        // Safety: the guard proves the root mutex is held, and it is borrowed
        // for as long as the cell is.
        unsafe { &mut *self.cell.get() }
    }

    pub(crate) fn is_finished(&self, guard: &mut ChainGuard<'_>) -> bool {
        self.cell(guard).finished
    }

    pub(crate) fn is_valid(&self, guard: &mut ChainGuard<'_>) -> bool {
        self.cell(guard).valid
    }

    pub(crate) fn finish_value(&self, value: R, guard: &mut ChainGuard<'_>) -> bool {
        self.finish(Outcome::Value(value), guard)
    }

    pub(crate) fn finish_fault(&self, fault: Fault, guard: &mut ChainGuard<'_>) -> bool {
        self.finish(Outcome::Fault(fault), guard)
    }

    /// Publishes the outcome: records it, wakes all waiters and fires the
    /// downstream link under the same lock. A fault fires the link exactly
    /// like a value, so eager continuations observe failures as they happen.
    ///
    /// Returns `true` when a continuation somewhere downstream panicked.
    fn finish(&self, outcome: Outcome<R>, guard: &mut ChainGuard<'_>) -> bool {
        let downstream = {
            let cell = self.cell(guard);
            debug_assert!(!cell.finished);
            cell.outcome = outcome;
            cell.finished = true;
            cell.downstream.take()
        };
        self.ready.notify_all();
        match downstream {
            Some(link) => link.result_ready(guard),
            None => false,
        }
    }

    /// Extracts the outcome, invalidating the stage.
    ///
    /// Called exactly once per stage, after it finished: either by the final
    /// consumer's `get` or by the downstream link's activation.
    pub(crate) fn take(&self, guard: &mut ChainGuard<'_>) -> Result<R, Fault> {
        let cell = self.cell(guard);
        debug_assert!(cell.finished);
        cell.valid = false;
        match mem::replace(&mut cell.outcome, Outcome::Pending) {
            Outcome::Value(value) => Ok(value),
            Outcome::Fault(fault) => Err(fault),
            Outcome::Pending => unreachable!("result extracted twice"),
        }
    }

    /// Installs the downstream link, or fires it right away when this stage
    /// already finished. Holding the lock across the hook makes the check and
    /// the activation atomic.
    ///
    /// Returns `true` when an immediately-fired continuation panicked.
    pub(crate) fn attach(&self, link: Arc<dyn Continuation>, guard: &mut ChainGuard<'_>) -> bool {
        {
            let cell = self.cell(guard);
            debug_assert!(cell.downstream.is_none());
            if !cell.finished {
                cell.downstream = Some(link);
                return false;
            }
        }
        link.result_ready(guard)
    }
}

/// The downstream half of a continuation link: reacts to its parent stage
/// finishing.
///
/// Implementations return `true` when a continuation body panicked while
/// being driven; the flag bubbles up to the producer-side call that started
/// the cascade, which re-raises after releasing the lock.
pub(crate) trait Continuation: Send + Sync {
    fn result_ready(&self, guard: &mut ChainGuard<'_>) -> bool;
}

/// The upstream handle held by a consumer or by a child link.
///
/// `request` drives the stage to completion on behalf of a demander; when it
/// returns, the stage is finished. For a root stage that means blocking until
/// the promise delivers; for a link it means running or delegating according
/// to its trigger policy.
pub(crate) trait Source<P>: Send + Sync {
    fn state(&self) -> &Shared<P>;

    fn request(&self, guard: &mut ChainGuard<'_>);
}

/// The root stage, created by a promise.
pub(crate) struct RootState<R> {
    pub(crate) shared: Shared<R>,
}

impl<R> RootState<R> {
    pub(crate) fn new() -> RootState<R> {
        RootState {
            shared: Shared::new(),
        }
    }
}

impl<R: Send> Source<R> for RootState<R> {
    fn state(&self) -> &Shared<R> {
        &self.shared
    }

    fn request(&self, guard: &mut ChainGuard<'_>) {
        while !self.shared.is_finished(guard) {
            guard.wait(&self.shared.ready);
        }
    }
}
