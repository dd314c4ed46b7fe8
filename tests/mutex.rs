//! S2 and the mutex-related testable properties from spec.md §8: mutual
//! exclusion, FIFO wake order under contention, and the non-reentrant /
//! non-owner failure modes.

mod common;

use std::sync::{Arc, Mutex as StdMutex};

use uthreads::{Mutex, Tid, UthreadError};

#[test]
fn three_threads_ten_increments_each_sum_to_thirty() {
    let _g = common::serial_guard();
    uthreads::init();

    let counter = Arc::new(Mutex::new(0i32));
    let mut tids = Vec::new();
    for _ in 0..3 {
        let counter = Arc::clone(&counter);
        tids.push(
            uthreads::spawn(move || {
                for _ in 0..10 {
                    *counter.lock().unwrap() += 1;
                    uthreads::yield_now();
                }
                0i32
            })
            .unwrap(),
        );
    }
    for tid in tids {
        let _: i32 = uthreads::join(tid).unwrap();
    }
    assert_eq!(*counter.lock().unwrap(), 30);
}

/// FIFO handoff: three threads that block on an already-held mutex, in
/// creation order, acquire it in that same order (spec.md's testable
/// property 3 and the direct-handoff requirement in §4.F).
#[test]
fn fifo_wake_order_under_contention() {
    let _g = common::serial_guard();
    uthreads::init();

    let gate = Arc::new(Mutex::new(()));
    let order: Arc<StdMutex<Vec<Tid>>> = Arc::new(StdMutex::new(Vec::new()));

    let held = gate.lock().unwrap();

    let mut tids = Vec::new();
    for _ in 0..3 {
        let gate = Arc::clone(&gate);
        let order = Arc::clone(&order);
        tids.push(
            uthreads::spawn(move || {
                let _g = gate.lock().unwrap();
                order.lock().unwrap().push(uthreads::current());
                0i32
            })
            .unwrap(),
        );
    }

    // A single yield cascades through every freshly-created thread until
    // each has attempted `gate.lock()` and blocked (the gate is still held
    // by `held`), then control returns here.
    uthreads::yield_now();
    drop(held);

    for tid in &tids {
        let _: i32 = uthreads::join(*tid).unwrap();
    }

    assert_eq!(*order.lock().unwrap(), tids);
}

#[test]
fn lock_is_not_reentrant() {
    let _g = common::serial_guard();
    uthreads::init();

    let m = Mutex::new(0i32);
    let _held = m.lock().unwrap();
    assert_eq!(m.lock().unwrap_err(), UthreadError::Protocol);
}
