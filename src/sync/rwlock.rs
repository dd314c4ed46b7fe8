//! A writer-preference reader/writer lock with direct handoff.
//!
//! Grounded in `original_source/uthread.c`'s `uthread_rwlock_*` family.
//! Admission is writer-preferred: a new reader blocks if a writer holds the
//! lock *or* one is already waiting, so writers cannot starve under a
//! steady stream of readers (spec.md §4.G). Release uses the same
//! direct-handoff discipline as the mutex: the releaser updates
//! `readers`/`readers_held`/`writer` itself before waking anyone, so the
//! invariant `writer.is_none() == (readers == readers_held.len())` holds
//! continuously, never just "eventually once the waiter runs".
//!
//! The C source's slow path appends a waking reader to `readers_held`
//! twice — once when it is queued and again when it resumes. Here that
//! invariant is fixed to a single append, performed once by the releaser at
//! wake time, per spec.md §9.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

use spin::Mutex as SpinMutex;

use crate::error::UthreadError;
use crate::scheduler;
use crate::signal::SignalMask;
use crate::sync::next_id;
use crate::tcb::{BlockedOn, ThreadState, Tid};

struct Inner {
    readers: u32,
    writer: Option<Tid>,
    read_waiters: VecDeque<Tid>,
    write_waiters: VecDeque<Tid>,
    readers_held: Vec<Tid>,
}

pub struct RwLock<T> {
    id: usize,
    inner: SpinMutex<Inner>,
    data: UnsafeCell<T>,
}

// SAFETY: see Mutex's identical rationale — one OS thread multiplexes every
// logical thread, so the only real exclusion needed is the one the
// `readers`/`writer` bookkeeping already enforces.
unsafe impl<T: Send> Sync for RwLock<T> {}

pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> RwLock<T> {
    pub fn new(value: T) -> Self {
        RwLock {
            id: next_id(),
            inner: SpinMutex::new(Inner {
                readers: 0,
                writer: None,
                read_waiters: VecDeque::new(),
                write_waiters: VecDeque::new(),
                readers_held: Vec::new(),
            }),
            data: UnsafeCell::new(value),
        }
    }

    /// The tick signal is masked only for this call's own duration (spec.md
    /// §4.D); once the guard is returned, preemption resumes, so a long
    /// critical section held under a read lock does not stall other
    /// threads' time slices.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        let _mask = SignalMask::new();
        let me = scheduler::current();

        let must_block = {
            let mut inner = self.inner.lock();
            if inner.writer.is_none() && inner.write_waiters.is_empty() {
                inner.readers += 1;
                inner.readers_held.push(me);
                false
            } else {
                inner.read_waiters.push_back(me);
                drop(inner);
                scheduler::block_current(BlockedOn::RwLock { id: self.id, as_writer: false });
                true
            }
        };

        if must_block {
            // SAFETY: called on behalf of the running thread. The releaser
            // that wakes us has already incremented `readers` and appended
            // us to `readers_held`, so there is nothing left to do here.
            unsafe {
                scheduler::park_while(me, ThreadState::Blocked);
            }
        }

        RwLockReadGuard { lock: self }
    }

    /// The tick signal is masked only for this call's own duration, same
    /// rationale as [`RwLock::read`].
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        let _mask = SignalMask::new();
        let me = scheduler::current();

        let must_block = {
            let mut inner = self.inner.lock();
            if inner.writer.is_none() && inner.readers == 0 {
                inner.writer = Some(me);
                false
            } else {
                inner.write_waiters.push_back(me);
                drop(inner);
                scheduler::block_current(BlockedOn::RwLock { id: self.id, as_writer: true });
                true
            }
        };

        if must_block {
            // SAFETY: called on behalf of the running thread. The releaser
            // has already recorded us as `writer` before waking us.
            unsafe {
                scheduler::park_while(me, ThreadState::Blocked);
            }
        }

        RwLockWriteGuard { lock: self }
    }

    /// Fails if the lock is currently held or awaited by anyone. A no-op
    /// beyond that check: Rust's ownership already reclaims the memory once
    /// the last reference is dropped, unlike the caller-owned C struct this
    /// mirrors the existence of, `original_source/uthread.c`'s
    /// `uthread_rwlock_destroy`.
    pub fn destroy(&self) -> Result<(), UthreadError> {
        let inner = self.inner.lock();
        if inner.writer.is_some()
            || inner.readers > 0
            || !inner.read_waiters.is_empty()
            || !inner.write_waiters.is_empty()
        {
            return Err(UthreadError::Protocol);
        }
        Ok(())
    }

    fn unlock_reader(&self, tid: Tid) {
        let _mask = SignalMask::new();
        let mut inner = self.inner.lock();
        inner.readers_held.retain(|&t| t != tid);
        inner.readers -= 1;
        if inner.readers == 0 {
            if let Some(w) = inner.write_waiters.pop_front() {
                inner.writer = Some(w);
                drop(inner);
                scheduler::wake(w);
                return;
            }
        }
    }

    fn unlock_writer(&self) {
        let _mask = SignalMask::new();
        let mut inner = self.inner.lock();
        inner.writer = None;
        if !inner.read_waiters.is_empty() {
            // Fair burst release: every queued reader moves to READY at
            // once. The single `readers_held` append happens here, by the
            // releaser, not a second time when each reader resumes.
            let waking: Vec<Tid> = inner.read_waiters.drain(..).collect();
            for &r in &waking {
                inner.readers += 1;
                inner.readers_held.push(r);
            }
            drop(inner);
            for r in waking {
                scheduler::wake(r);
            }
        } else if let Some(w) = inner.write_waiters.pop_front() {
            inner.writer = Some(w);
            drop(inner);
            scheduler::wake(w);
        }
    }
}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding a read guard proves no writer is active.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        let tid = scheduler::current();
        self.lock.unlock_reader(tid);
    }
}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding the write guard proves exclusive ownership.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding the write guard proves exclusive ownership.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock_writer();
    }
}
