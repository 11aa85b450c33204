use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// The root lock of a continuation chain.
///
/// Every stage of a chain shares the mutex of the shared state its promise
/// created, so one lock serializes completion, waiting, attaching links and
/// extracting results across the whole chain. Stages signal readiness through
/// their own condition variables, all backed by this mutex.
#[derive(Clone)]
pub(crate) struct Chain {
    mutex: Arc<Mutex<()>>,
}

impl Chain {
    pub(crate) fn new() -> Chain {
        Chain {
            mutex: Arc::new(Mutex::new(())),
        }
    }

    pub(crate) fn lock(&self) -> ChainGuard<'_> {
        // Poisoning is ignored: user callables only ever run with the lock
        // released, so a poisoned mutex cannot leave a stage half-written.
        let guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        ChainGuard {
            mutex: &self.mutex,
            slot: Some(guard),
        }
    }
}

/// Proof that the chain lock is held.
///
/// Shared-state cells are only reachable through methods that take a
/// `&mut ChainGuard`, which keeps the lock protocol explicit in every
/// signature.
pub(crate) struct ChainGuard<'a> {
    mutex: &'a Mutex<()>,
    slot: Option<MutexGuard<'a, ()>>,
}

impl ChainGuard<'_> {
    /// Blocks on `cond` until notified, releasing the chain lock while parked.
    pub(crate) fn wait(&mut self, cond: &Condvar) {
        let guard = self.slot.take().expect("chain lock not held");
        let guard = cond.wait(guard).unwrap_or_else(PoisonError::into_inner);
        self.slot = Some(guard);
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`.
    pub(crate) fn wait_timeout(&mut self, cond: &Condvar, timeout: Duration) {
        let guard = self.slot.take().expect("chain lock not held");
        let (guard, _) = cond
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        self.slot = Some(guard);
    }

    /// Runs `f` with the chain lock released, reacquiring it afterwards.
    ///
    /// User callables and executor submissions must never run under the lock.
    pub(crate) fn unlocked<T>(&mut self, f: impl FnOnce() -> T) -> T {
        self.slot = None;
        let output = f();
        self.slot = Some(self.mutex.lock().unwrap_or_else(PoisonError::into_inner));
        output
    }
}
