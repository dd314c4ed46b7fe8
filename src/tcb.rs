//! Thread control blocks and the fixed-capacity thread table.
//!
//! Structurally this is the teacher's `scheduler::thread::{ThreadId,
//! ThreadState, Thread}` (`scheduler/thread.rs`), narrowed from a growable
//! `Vec<Thread>` to the fixed-size, slot-reused table spec.md §3 requires,
//! and with the interrupt-frame register save replaced by [`crate::context::Context`].

use std::any::Any;

use crate::context::Context;

/// Upper bound on live logical threads, matching `original_source/uthread.c`'s
/// `MAX_THREADS` and the teacher's `scheduler::MAX_THREADS` tunable.
pub const MAX_THREADS: usize = 128;

/// Per-thread stack size, matching `original_source/uthread.c`'s `STACK_SIZE`.
pub const STACK_SIZE: usize = 8 * 1024;

/// A thread identifier. Slot 0 is reserved for the lazily-initialized main
/// thread (spec.md §4.A); `create` never hands out 0.
pub type Tid = i32;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadState {
    Ready,
    Running,
    Blocked,
    Terminated,
}

/// What a thread is blocked on, for the waiter bookkeeping the scheduler and
/// the deadlock detector both read. Only `Mutex` entries feed the detector's
/// wait-for graph (spec.md §4.I); the `RwLock` variant exists for symmetry
/// and so a thread's blocking reason is always recoverable from its TCB.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockedOn {
    Mutex(usize),
    RwLock { id: usize, as_writer: bool },
    /// Waiting on another thread's termination via `join`; not part of the
    /// mutex wait-for graph the deadlock detector walks (spec.md §4.I).
    Join(Tid),
}

pub struct Tcb {
    pub tid: Tid,
    pub state: ThreadState,
    pub context: Context,
    pub stack: Option<Box<[u8]>>,
    /// The thread's body, boxing its return value as `Box<dyn Any>` so
    /// `join` can hand back a typed value without the table itself being
    /// generic over every thread's return type — the same type-erasure
    /// trick `std::thread::JoinHandle` performs internally, exposed here
    /// because the table is a flat array rather than one handle per thread.
    pub entry: Option<Box<dyn FnOnce() -> Box<dyn Any>>>,
    pub retval: Option<Box<dyn Any>>,
    /// Set by `exit`/`schedule` for a thread whose joiner has not yet called
    /// `join`; cleared once delivered.
    pub waiters: Vec<Tid>,
    pub blocked_on: Option<BlockedOn>,
}

impl Tcb {
    pub fn new(tid: Tid) -> Self {
        Tcb {
            tid,
            state: ThreadState::Ready,
            context: Context::empty(),
            stack: None,
            entry: None,
            retval: None,
            waiters: Vec::new(),
            blocked_on: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tcb_is_ready_and_unblocked() {
        let t = Tcb::new(5);
        assert_eq!(t.tid, 5);
        assert_eq!(t.state, ThreadState::Ready);
        assert!(t.stack.is_none());
        assert!(t.blocked_on.is_none());
        assert!(t.waiters.is_empty());
    }

    #[test]
    fn create_overwrite_clears_a_reused_slots_stale_fields() {
        let mut t = Tcb::new(1);
        t.state = ThreadState::Terminated;
        t.retval = Some(Box::new(42i32));
        t.waiters.push(9);
        t.blocked_on = Some(BlockedOn::Mutex(3));
        t.stack = Some(vec![0u8; 16].into_boxed_slice());

        // scheduler::create() reuses a TERMINATED slot by overwriting it
        // wholesale (`**existing = *fresh`) rather than mutating fields in
        // place; a fresh Tcb carries none of the old occupant's state.
        t = Tcb::new(7);

        assert_eq!(t.tid, 7);
        assert_eq!(t.state, ThreadState::Ready);
        assert!(t.retval.is_none());
        assert!(t.waiters.is_empty());
        assert!(t.blocked_on.is_none());
        assert!(t.stack.is_none());
    }
}
