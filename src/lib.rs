//! `uthreads` — a user-space cooperative-preemptive threading library: many
//! logical threads multiplexed onto one OS thread, with create/join/exit, a
//! mutex, a writer-preference reader/writer lock, a time-sliced round-robin
//! scheduler driven by a periodic signal, and an on-demand deadlock report
//! over the mutex wait-for graph.
//!
//! The crate is organized the way spec.md's component table lays it out:
//! [`tcb`] is the thread table, [`context`] is the stack-switching primitive,
//! [`scheduler`] is the ready queue plus create/exit/join/yield, [`signal`]
//! is the preemption driver, [`sync`] holds the mutex and rw-lock, and
//! [`deadlock`] is the wait-for-graph walker. See DESIGN.md for how each
//! piece is grounded in the teacher repo and `original_source/uthread.c`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use uthreads::Mutex;
//!
//! let counter = Arc::new(Mutex::new(0i32));
//! uthreads::init();
//! let c = Arc::clone(&counter);
//! let t1 = uthreads::spawn(move || {
//!     for _ in 0..10 {
//!         *c.lock().unwrap() += 1;
//!     }
//!     0i32
//! });
//! let _: i32 = uthreads::join(t1.unwrap()).unwrap();
//! ```

mod context;
mod deadlock;
mod error;
mod scheduler;
mod signal;
mod sync;
mod tcb;

pub use error::{UthreadError, UthreadResult};
pub use signal::{DIAG_SIGNAL, QUANTUM, TICK_SIGNAL};
pub use sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use tcb::{Tid, MAX_THREADS, STACK_SIZE};

/// Idempotent library initialization: materializes the main thread (tid 0)
/// and installs the preemption/diagnostic signal handlers plus the quantum
/// timer. Every other public function calls this on first use, so an
/// explicit call is only needed when a caller wants initialization to happen
/// at a specific point rather than implicitly on first `spawn`/lock/join.
pub fn init() {
    scheduler::init();
}

/// Spawn a new logical thread running `f` to completion. Its return value is
/// published for [`join`]. Fails with [`UthreadError::Capacity`] if the
/// thread table (default capacity 128) is full.
///
/// Mirrors spec.md §6's `create(entry, arg) -> tid | -1`, generalized from a
/// `void *(*)(void *)` entry point and an untyped `arg` to an owned Rust
/// closure that captures what it needs.
pub fn spawn<F, T>(f: F) -> UthreadResult<Tid>
where
    F: FnOnce() -> T + 'static,
    T: 'static,
{
    scheduler::create(f)
}

/// Block the calling logical thread until `target` terminates, then return
/// the value it passed to [`exit`]/its closure's return. Fails with
/// [`UthreadError::InvalidArgument`] if `target` does not exist, already has
/// a joiner, or names the calling thread; that last case would deadlock the
/// single scheduling domain outright, so it is rejected rather than hung.
pub fn join<T: 'static>(target: Tid) -> UthreadResult<T> {
    let boxed = scheduler::join(target)?;
    boxed
        .downcast::<T>()
        .map(|b| *b)
        .map_err(|_| UthreadError::InvalidArgument)
}

/// Terminate the calling logical thread, publishing `retval` for a future
/// [`join`]. Never returns. Calling this from the thread that owns tid 0
/// (the main thread) ends the process, matching spec.md §4.D's "`exit` from
/// the main thread terminates the process".
pub fn exit<T: 'static>(retval: T) -> ! {
    scheduler::exit(Box::new(retval))
}

/// The calling logical thread's id; 0 before initialization and for the
/// main thread itself.
pub fn current() -> Tid {
    scheduler::current()
}

/// Voluntarily give up the remainder of the current time slice.
pub fn yield_now() {
    scheduler::yield_now()
}

/// Run the mutex-domain deadlock detector once and print its report to
/// stdout. The same check also runs whenever the diagnostic signal
/// (`SIGQUIT`) is delivered to the process; this is the synchronous,
/// callable form spec.md §6 names as `deadlock_detect() -> void`.
pub fn deadlock_detect() {
    deadlock::detect()
}
