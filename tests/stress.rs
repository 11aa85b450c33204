use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use easy_parallel::Parallel;
use once_cell::sync::Lazy;
use sequent::{Promise, Trigger};

type Job = Box<dyn FnOnce() + Send>;

// A small pool that drains a shared queue, in the style of an executor's
// worker loop.
static POOL: Lazy<flume::Sender<Job>> = Lazy::new(|| {
    let (sender, receiver) = flume::unbounded::<Job>();
    for _ in 0..4 {
        let receiver = receiver.clone();
        thread::spawn(move || {
            for job in receiver {
                job();
            }
        });
    }
    sender
});

#[test]
fn ten_thousand_one_shot_chains_converge() {
    const N: usize = 10_000;
    let counter = Arc::new(AtomicUsize::new(N));
    let (done_tx, done_rx) = flume::unbounded::<()>();

    for _ in 0..N {
        let mut p = Promise::<()>::new();
        let counter = counter.clone();
        let done = done_tx.clone();
        let f = p.get_future().unwrap().then(move |()| {
            counter.fetch_sub(1, Ordering::SeqCst);
            drop(done);
        });
        // the consumer walks away; the continuation still runs on completion
        drop(f);
        POOL.send(Box::new(move || p.set_value(()).unwrap())).unwrap();
    }

    // each continuation drops its sender clone as it completes
    drop(done_tx);
    for _ in done_rx.iter() {}
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn get_continuation_across_threads_repeated() {
    for i in 0..100 {
        let mut p = Promise::new();
        let f = p.get_future().unwrap();
        Parallel::new()
            .add(move || p.set_value(i).unwrap())
            .add(move || {
                let f2 = f.then_on(Trigger::Get, |v| v * 2);
                assert_eq!(f2.get().unwrap(), 2 * i);
            })
            .run();
    }
}
