//! S6 and the join-related testable properties from spec.md §8: a thread's
//! `exit` value round-trips through `join`, join only returns once the
//! target is TERMINATED, and repeated create/join cycles reuse table slots
//! rather than growing it without bound.

mod common;

#[test]
fn join_returns_the_value_passed_to_exit() {
    let _g = common::serial_guard();
    uthreads::init();

    let tid = uthreads::spawn(|| 77i32).unwrap();
    let v: i32 = uthreads::join(tid).unwrap();
    assert_eq!(v, 77);
}

#[test]
fn join_on_an_already_terminated_thread_returns_immediately() {
    let _g = common::serial_guard();
    uthreads::init();

    let tid = uthreads::spawn(|| "done").unwrap();
    // Give the freshly-created thread a chance to run to completion before
    // the first join call, exercising the "already TERMINATED" branch of
    // spec.md §4.H rather than the blocking one.
    uthreads::yield_now();
    let v: &'static str = uthreads::join(tid).unwrap();
    assert_eq!(v, "done");
}

#[test]
fn join_fails_on_an_unknown_or_self_target() {
    let _g = common::serial_guard();
    uthreads::init();

    let bogus = 999_999;
    let err = uthreads::join::<()>(bogus).unwrap_err();
    assert_eq!(err, uthreads::UthreadError::InvalidArgument);

    let err = uthreads::join::<()>(uthreads::current()).unwrap_err();
    assert_eq!(err, uthreads::UthreadError::InvalidArgument);
}

/// Stack reclamation (spec.md's testable property 10): many sequential
/// create-then-join cycles must not require the thread table to grow, since
/// each terminated slot is recycled by the next `create`.
#[test]
fn many_create_join_cycles_reuse_slots() {
    let _g = common::serial_guard();
    uthreads::init();

    for i in 0..(uthreads::MAX_THREADS as i32 * 4) {
        let tid = uthreads::spawn(move || i * 2).unwrap();
        let v: i32 = uthreads::join(tid).unwrap();
        assert_eq!(v, i * 2);
    }
}
