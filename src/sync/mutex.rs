//! A binary mutex with FIFO waiters and direct lock handoff.
//!
//! Grounded in `original_source/uthread.c`'s `uthread_mutex_lock`/
//! `uthread_mutex_unlock`: on contention the caller blocks and is appended
//! to the mutex's own waiter list rather than a generic scheduler queue, and
//! on release the *next* owner is chosen and recorded by the releaser
//! itself, before that waiter is ever woken (spec.md §4.F) — this is what
//! keeps FIFO order intact under preemption: a third thread arriving
//! between release and wakeup sees the lock already held, not free.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

use spin::Mutex as SpinMutex;

use crate::deadlock;
use crate::error::UthreadError;
use crate::scheduler;
use crate::signal::SignalMask;
use crate::sync::next_id;
use crate::tcb::{BlockedOn, ThreadState, Tid};

struct Inner {
    locked: bool,
    owner: Option<Tid>,
    waiters: VecDeque<Tid>,
}

/// A mutex guarding a `T`, scheduled by `uthreads` rather than the OS.
pub struct Mutex<T> {
    id: usize,
    inner: SpinMutex<Inner>,
    data: UnsafeCell<T>,
}

// SAFETY: at most one logical thread ever holds the guard at a time (the
// scheduler's own invariant), and all logical threads run on the same OS
// thread, so there is no real cross-thread race to guard against beyond
// what `locked`/`owner` already serialize.
unsafe impl<T: Send> Sync for Mutex<T> {}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Mutex {
            id: next_id(),
            inner: SpinMutex::new(Inner {
                locked: false,
                owner: None,
                waiters: VecDeque::new(),
            }),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquire the mutex, blocking the calling logical thread if it is
    /// already held. Fails with [`UthreadError::Protocol`] if the calling
    /// thread already owns it — this mutex is not reentrant, matching
    /// `original_source/uthread.c`.
    ///
    /// The tick signal is masked only for this call's own duration (spec.md
    /// §4.D): once the guard is returned, preemption resumes, so holding the
    /// guard across a long critical section does not stall other threads'
    /// time slices the way holding the mask would.
    pub fn lock(&self) -> Result<MutexGuard<'_, T>, UthreadError> {
        let _mask = SignalMask::new();
        let me = scheduler::current();

        let must_block = {
            let mut inner = self.inner.lock();
            if !inner.locked {
                inner.locked = true;
                inner.owner = Some(me);
                drop(inner);
                deadlock::set_owner(self.id, me);
                false
            } else if inner.owner == Some(me) {
                return Err(UthreadError::Protocol);
            } else {
                inner.waiters.push_back(me);
                drop(inner);
                scheduler::block_current(BlockedOn::Mutex(self.id));
                true
            }
        };

        if must_block {
            // SAFETY: called on behalf of the running thread.
            unsafe {
                scheduler::park_while(me, ThreadState::Blocked);
            }
        }

        Ok(MutexGuard { mutex: self })
    }

    fn unlock(&self) -> Result<(), UthreadError> {
        let _mask = SignalMask::new();
        let me = scheduler::current();
        let mut inner = self.inner.lock();
        if inner.owner != Some(me) {
            return Err(UthreadError::Protocol);
        }
        match inner.waiters.pop_front() {
            Some(next) => {
                // Direct handoff: the new owner is recorded here, before
                // `next` is ever woken, so a thread that arrives between
                // this line and the wake below still observes the mutex as
                // held (spec.md §4.F).
                inner.owner = Some(next);
                drop(inner);
                deadlock::set_owner(self.id, next);
                scheduler::wake(next);
            }
            None => {
                inner.locked = false;
                inner.owner = None;
                drop(inner);
                deadlock::clear_owner(self.id);
            }
        }
        Ok(())
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding the guard proves exclusive ownership.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding the guard proves exclusive ownership.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(e) = self.mutex.unlock() {
            log::error!("mutex unlock by non-owner during guard drop: {e}");
        }
    }
}
