use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use sequent::{AllocHandle, Allocator, Executor, Global, Promise, Submit, Trigger};

// Creates an allocator with event counters.
//
// Usage: `allocator!(a, ALLOC, DEALLOC)`
//
// The allocator `a` wraps `Global` and tracks allocations.
// When `allocate` is called, `ALLOC` is incremented.
// When `deallocate` is called, `DEALLOC` is incremented.
macro_rules! allocator {
    ($name:pat, $alloc:ident, $dealloc:ident) => {
        static $alloc: AtomicUsize = AtomicUsize::new(0);
        static $dealloc: AtomicUsize = AtomicUsize::new(0);

        let $name = {
            struct Tracked;

            unsafe impl Allocator for Tracked {
                fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, ()> {
                    $alloc.fetch_add(1, Ordering::SeqCst);
                    Global.allocate(layout)
                }

                unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
                    $dealloc.fetch_add(1, Ordering::SeqCst);
                    Global.deallocate(ptr, layout)
                }
            }

            Tracked
        };
    };
}

#[test]
fn then_in_draws_from_the_allocator() {
    allocator!(a, ALLOC, DEALLOC);
    let mut p = Promise::<i32>::new();
    let bias = 10;
    let f = p
        .get_future()
        .unwrap()
        .then_in(Trigger::Any, move |n| n + bias, a);
    assert_eq!(ALLOC.load(Ordering::SeqCst), 1);
    assert_eq!(DEALLOC.load(Ordering::SeqCst), 0);

    // activation consumes the stored callable and releases its storage
    p.set_value(1).unwrap();
    assert_eq!(DEALLOC.load(Ordering::SeqCst), 1);
    assert_eq!(f.get().unwrap(), 11);
}

#[test]
fn chain_inherits_the_promise_allocator() {
    allocator!(a, ALLOC, DEALLOC);
    let mut p = Promise::<i32>::with_allocator(a);
    let (x, y) = (1, 2);
    let f = p
        .get_future()
        .unwrap()
        .then(move |n| n + x)
        .then(move |n| n + y);
    assert_eq!(ALLOC.load(Ordering::SeqCst), 2);

    p.set_value(0).unwrap();
    assert_eq!(f.get().unwrap(), 3);
    assert_eq!(DEALLOC.load(Ordering::SeqCst), 2);
}

#[test]
fn captureless_callables_need_no_storage() {
    allocator!(a, ALLOC, DEALLOC);
    let mut p = Promise::<i32>::new();
    let f = p.get_future().unwrap().then_in(Trigger::Any, |n| n * 2, a);
    assert_eq!(ALLOC.load(Ordering::SeqCst), 0);
    p.set_value(2).unwrap();
    assert_eq!(f.get().unwrap(), 4);
    assert_eq!(DEALLOC.load(Ordering::SeqCst), 0);
}

#[test]
fn abandoned_chain_releases_callable_storage() {
    allocator!(a, ALLOC, DEALLOC);
    let mut p = Promise::<i32>::new();
    let cargo = vec![1, 2, 3];
    let f = p
        .get_future()
        .unwrap()
        .then_in(Trigger::Any, move |n| n + cargo.len() as i32, a);
    assert_eq!(ALLOC.load(Ordering::SeqCst), 1);

    // consumer walks away; the broken-promise fault forwards through the
    // link without running it, and the callable's storage is released
    drop(f);
    drop(p);
    assert_eq!(DEALLOC.load(Ordering::SeqCst), 1);
}

#[test]
fn executor_submissions_receive_the_chain_allocator() {
    allocator!(a, ALLOC, DEALLOC);

    // An executor that parks its closure in allocator-provided scratch space
    // before running it inline.
    #[derive(Clone)]
    struct Scratch;

    impl Executor for Scratch {
        fn dispatch<F>(&self, task: F, alloc: &AllocHandle)
        where
            F: FnOnce() + Send + 'static,
        {
            let layout = Layout::new::<F>();
            if layout.size() == 0 {
                task();
                return;
            }
            let ptr = alloc.allocate(layout).unwrap().cast::<F>();
            unsafe {
                ptr.as_ptr().write(task);
                let task = ptr.as_ptr().read();
                alloc.deallocate(ptr.cast(), layout);
                task();
            }
        }

        fn post<F>(&self, task: F, alloc: &AllocHandle)
        where
            F: FnOnce() + Send + 'static,
        {
            self.dispatch(task, alloc);
        }

        fn defer<F>(&self, task: F, alloc: &AllocHandle)
        where
            F: FnOnce() + Send + 'static,
        {
            self.dispatch(task, alloc);
        }
    }

    let mut p = Promise::<i32>::new();
    let bias = 5;
    let f = p
        .get_future()
        .unwrap()
        .then_via_in(Submit::Dispatch, &Scratch, move |n| n + bias, a);
    // one block for the stored callable
    assert_eq!(ALLOC.load(Ordering::SeqCst), 1);

    p.set_value(1).unwrap();
    assert_eq!(f.get().unwrap(), 6);
    // plus one block for the executor's scratch space
    assert_eq!(ALLOC.load(Ordering::SeqCst), 2);
    assert_eq!(DEALLOC.load(Ordering::SeqCst), 2);
}
