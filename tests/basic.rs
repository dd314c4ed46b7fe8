//! S1 from spec.md §8: several threads each doing independent work run to
//! completion under the round-robin scheduler with no deadlock.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn three_threads_each_print_five_lines() {
    let _g = common::serial_guard();
    uthreads::init();

    let total = Arc::new(AtomicUsize::new(0));
    let mut tids = Vec::new();
    for _ in 0..3 {
        let total = Arc::clone(&total);
        tids.push(
            uthreads::spawn(move || {
                for _ in 0..5 {
                    total.fetch_add(1, Ordering::SeqCst);
                    uthreads::yield_now();
                }
                0i32
            })
            .expect("thread table has room"),
        );
    }

    for tid in tids {
        let _: i32 = uthreads::join(tid).expect("spawned thread always terminates");
    }

    assert_eq!(total.load(Ordering::SeqCst), 15);
}

#[test]
fn self_is_zero_for_the_main_thread() {
    let _g = common::serial_guard();
    uthreads::init();
    assert_eq!(uthreads::current(), 0);
}
