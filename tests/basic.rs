use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::thread;
use std::time::{Duration, Instant};

use easy_parallel::Parallel;
use sequent::{Error, FutureStatus, Promise};

#[test]
fn value_handoff() {
    let mut p = Promise::new();
    let f = p.get_future().unwrap();
    assert!(f.valid());
    p.set_value(1).unwrap();
    assert!(f.valid());
    assert_eq!(f.get().unwrap(), 1);
}

#[test]
fn unit_handoff() {
    let mut p = Promise::<()>::new();
    let f = p.get_future().unwrap();
    p.set_value(()).unwrap();
    f.get().unwrap();
}

#[test]
fn reference_result_preserves_identity() {
    let x = 1;
    let mut p = Promise::<&i32>::new();
    let f = p.get_future().unwrap();
    p.set_value(&x).unwrap();
    let r = f.get().unwrap();
    assert!(ptr::eq(r, &x));
    assert_eq!(*r, 1);
}

#[test]
fn moved_promise_keeps_the_channel() {
    let mut p = Promise::new();
    let f = p.get_future().unwrap();
    let p2 = p;
    p2.set_value(2).unwrap();
    assert_eq!(f.get().unwrap(), 2);
}

#[test]
fn future_already_retrieved() {
    let mut p = Promise::<i32>::new();
    let _f = p.get_future().unwrap();
    assert_eq!(p.get_future().unwrap_err(), Error::FutureAlreadyRetrieved);
}

#[test]
fn promise_already_satisfied() {
    let mut p = Promise::new();
    let _f = p.get_future().unwrap();
    p.set_value(1).unwrap();
    assert_eq!(p.set_value(2).unwrap_err(), Error::PromiseAlreadySatisfied);
    assert_eq!(
        p.set_panic(Box::new("late")).unwrap_err(),
        Error::PromiseAlreadySatisfied
    );
}

#[test]
fn broken_promise() {
    let mut p = Promise::<()>::new();
    let f = p.get_future().unwrap();
    drop(p);
    assert_eq!(f.get().unwrap_err(), Error::BrokenPromise);
}

#[test]
fn dropping_an_untaken_promise_is_quiet() {
    let p = Promise::<i32>::new();
    drop(p);
}

#[test]
fn transported_panic_resumes_at_get() {
    let mut p = Promise::<i32>::new();
    let f = p.get_future().unwrap();
    p.set_panic(Box::new("boom")).unwrap();
    assert!(f.valid());
    let payload = catch_unwind(AssertUnwindSafe(move || f.get())).unwrap_err();
    assert_eq!(*payload.downcast::<&str>().unwrap(), "boom");
}

#[test]
fn wait_blocks_until_completion() {
    let mut p = Promise::new();
    let f = p.get_future().unwrap();
    Parallel::new()
        .add(move || {
            thread::sleep(Duration::from_millis(50));
            p.set_value(7).unwrap();
        })
        .add(move || {
            f.wait();
            assert_eq!(f.get().unwrap(), 7);
        })
        .run();
}

#[test]
fn wait_for_times_out_then_succeeds() {
    let mut p = Promise::new();
    let f = p.get_future().unwrap();
    let started = Instant::now();
    assert_eq!(f.wait_for(Duration::from_millis(50)), FutureStatus::Timeout);
    assert!(started.elapsed() >= Duration::from_millis(50));
    p.set_value(3).unwrap();
    assert_eq!(f.wait_for(Duration::from_millis(50)), FutureStatus::Ready);
    assert_eq!(f.get().unwrap(), 3);
}

#[test]
fn wait_until_past_deadline() {
    let mut p = Promise::<i32>::new();
    let f = p.get_future().unwrap();
    assert_eq!(f.wait_until(Instant::now()), FutureStatus::Timeout);
    p.set_value(4).unwrap();
    assert_eq!(f.wait_until(Instant::now()), FutureStatus::Ready);
}

#[test]
fn cross_thread_handoff_repeated() {
    for i in 0..100 {
        let mut p = Promise::new();
        let f = p.get_future().unwrap();
        Parallel::new()
            .add(move || p.set_value(i).unwrap())
            .add(move || assert_eq!(f.get().unwrap(), i))
            .run();
    }
}
