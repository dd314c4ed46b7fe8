//! Synchronization primitives built on the scheduler's block/wake machinery:
//! a mutex with direct lock handoff and a writer-preference reader/writer
//! lock. Grounded in the teacher's `scheduler::io_wait::WaitQueue`
//! (`add_waiter`/`wake_all`/`remove_waiter`), generalized here from a single
//! FIFO wait queue per channel to per-lock state machines with the handoff
//! and admission-policy rules spec.md §4.F/§4.G specify.

pub mod mutex;
pub mod rwlock;

pub use mutex::{Mutex, MutexGuard};
pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A process-wide counter handing out unique ids to mutexes/rwlocks, used
/// only as a key into [`crate::deadlock::MUTEX_OWNERS`] — not a memory
/// address, so the detector never reasons about caller-owned pointers
/// (spec.md's DESIGN NOTES flag pointer-keyed wait-for graphs as a risk this
/// sidesteps).
pub(crate) fn next_id() -> usize {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
