//! S5 from spec.md §8: the same two mutexes, locked in the *same* order by
//! both threads, never deadlock — the detector must report a clean bill of
//! health rather than a false positive.

mod common;

use std::sync::Arc;

use uthreads::Mutex;

#[test]
fn no_cycle_when_both_threads_lock_in_the_same_order() {
    uthreads::init();

    let a = Arc::new(Mutex::new(()));
    let b = Arc::new(Mutex::new(()));

    let (a1, b1) = (Arc::clone(&a), Arc::clone(&b));
    let t1 = uthreads::spawn(move || {
        let _a = a1.lock().unwrap();
        uthreads::yield_now();
        let _b = b1.lock().unwrap();
        0i32
    })
    .unwrap();

    let (a2, b2) = (Arc::clone(&a), Arc::clone(&b));
    let t2 = uthreads::spawn(move || {
        let _a = a2.lock().unwrap();
        uthreads::yield_now();
        let _b = b2.lock().unwrap();
        0i32
    })
    .unwrap();

    uthreads::yield_now();

    let report = common::capture_fd1(uthreads::deadlock_detect);
    assert!(report.contains("No deadlock detected"), "report was: {report:?}");

    let _: i32 = uthreads::join(t1).unwrap();
    let _: i32 = uthreads::join(t2).unwrap();
}
