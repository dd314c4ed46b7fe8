//! The round-robin scheduler: thread table, ready queue, `yield`/`schedule`,
//! and thread create/exit/join.
//!
//! Grounded in the teacher's `scheduler::thread::ThreadManager` (the
//! `create`/`exit`/`current_id` namespace) and `scheduler::mod`'s global
//! `SCHEDULER: Mutex<Option<Scheduler>>` plus its free functions
//! (`yield_now`, `block_current_thread`, `wake_thread`). The teacher's
//! `Scheduler` struct (`threads: Vec<Thread>`, `ready_queue:
//! VecDeque<ThreadId>`) is narrowed here to the fixed-capacity table
//! spec.md §3 requires, and its interrupt-driven `yield_now` (raising a
//! software interrupt) is replaced by the `ucontext`-based capture/swap in
//! [`crate::context`].

use std::any::Any;
use std::collections::VecDeque;

use log::{debug, trace};
use spin::Mutex as SpinMutex;

use crate::context::Context;
use crate::error::UthreadError;
use crate::signal::{self, SignalMask};
use crate::tcb::{BlockedOn, Tcb, ThreadState, Tid, MAX_THREADS, STACK_SIZE};

struct Scheduler {
    /// Fixed-capacity table; index 0 is the lazily-initialized main thread.
    tcbs: Vec<Option<Box<Tcb>>>,
    ready_queue: VecDeque<Tid>,
    running: Tid,
    main_context: Context,
    /// A terminated thread whose stack is freed at the *next* `schedule()`
    /// entry point, never from within the switch off that very stack
    /// (spec.md §4.D) — freeing `Box<[u8]>` while still executing on it
    /// would be freeing the ground out from under the running function.
    deferred_free: Option<Tid>,
    next_tid: Tid,
}

/// Wrapper making the global scheduler `Sync` so it can live in a `static`.
/// `Scheduler` is `!Send`: `Tcb` holds `Box<dyn FnOnce() -> Box<dyn Any>>`
/// and `Box<dyn Any>` (tcb.rs), and `Context` wraps `libc::ucontext_t`,
/// whose `uc_link`/`ss_sp` raw pointers are `!Send` — so
/// `spin::Mutex<Option<Scheduler>>` is not `Sync` on its own, and a bare
/// `static` of that type does not compile. Sound here for the same reason
/// `sync::Mutex`/`sync::RwLock` assert `Sync` (sync/mutex.rs, sync/rwlock.rs):
/// every logical thread runs on the same OS thread, so `SCHEDULER` is never
/// touched by two real threads at once — only ever the current thread, or a
/// signal handler running on top of it.
struct SchedulerCell(SpinMutex<Option<Scheduler>>);

unsafe impl Sync for SchedulerCell {}

static SCHEDULER: SchedulerCell = SchedulerCell(SpinMutex::new(None));

fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    let mut guard = SCHEDULER.0.lock();
    if guard.is_none() {
        *guard = Some(Scheduler {
            tcbs: (0..MAX_THREADS).map(|_| None).collect(),
            ready_queue: VecDeque::new(),
            running: 0,
            main_context: Context::empty(),
            deferred_free: None,
            next_tid: 1,
        });
        guard.as_mut().unwrap().tcbs[0] = Some(Box::new(Tcb::new(0)));
        guard.as_mut().unwrap().tcbs[0].as_mut().unwrap().state = ThreadState::Running;
        signal::install(signal::QUANTUM);
        debug!("scheduler initialized, main thread is tid 0");
    }
    f(guard.as_mut().unwrap())
}

/// Idempotent initialization: materializes the main thread and installs the
/// signal handlers/timer on first use by any public API (spec.md §4.A).
///
/// Masked like every other public entry (spec.md §4.D): `with_scheduler`
/// itself arms the preemption timer on first use, and an unmasked tick
/// firing inside that very call would re-enter `yield_now` -> `with_scheduler`
/// -> `SCHEDULER.0.lock()` on the same, non-reentrant `spin::Mutex`.
pub fn init() {
    let _mask = SignalMask::new();
    with_scheduler(|_| {});
}

/// The calling logical thread's id. Returns 0 before initialization and for
/// the main thread itself, matching `original_source/uthread.c`'s
/// `uthread_self()`.
///
/// Masked like every other public entry (spec.md §4.D), so a tick delivered
/// while this call holds `SCHEDULER` cannot re-enter `yield_now` and
/// self-deadlock the spin mutex.
pub fn current() -> Tid {
    let _mask = SignalMask::new();
    with_scheduler(|s| s.running)
}

/// `tid` is a forever-monotonic identity (spec.md §4.A); the table itself
/// is a fixed-capacity, slot-reused array, so a thread's table position
/// almost never equals its tid once any slot has been recycled. Every
/// lookup by tid goes through this scan rather than indexing `tcbs`
/// directly by `tid as usize`, which would panic (or silently address the
/// wrong slot) as soon as a tid grows past `MAX_THREADS`.
fn find_slot(s: &Scheduler, tid: Tid) -> Option<usize> {
    s.tcbs
        .iter()
        .position(|slot| slot.as_ref().is_some_and(|t| t.tid == tid))
}

fn context_ptr(s: &mut Scheduler, tid: Tid) -> *mut Context {
    if tid == 0 {
        &mut s.main_context as *mut Context
    } else {
        let slot = find_slot(s, tid).expect("context requested for a tid with no live slot");
        &mut s.tcbs[slot].as_mut().unwrap().context as *mut Context
    }
}

/// The main thread (tid 0) has a real `Tcb` at `tcbs[0]` (materialized by
/// [`with_scheduler`] on first use) just like any other thread, so its
/// state is tracked the same way everyone else's is — there is no special
/// casing here. Only [`context_ptr`] treats tid 0 specially, since main's
/// live execution context is `main_context`, not `tcbs[0].context` (main
/// borrows the process's original stack rather than owning one here,
/// spec.md §3).
fn set_state(s: &mut Scheduler, tid: Tid, state: ThreadState) {
    if let Some(slot) = find_slot(s, tid) {
        s.tcbs[slot].as_mut().unwrap().state = state;
    }
}

fn state_of(s: &Scheduler, tid: Tid) -> ThreadState {
    find_slot(s, tid)
        .and_then(|slot| s.tcbs[slot].as_ref())
        .map(|t| t.state)
        .unwrap_or(ThreadState::Terminated)
}

/// Move `tid` to READY, clear any blocking annotation, and enqueue it. Used
/// by the mutex/rwlock/join wakers once they have updated their own
/// ownership state (spec.md's direct-handoff discipline: the waker performs
/// the ownership change itself, *then* calls this).
pub(crate) fn wake(tid: Tid) {
    with_scheduler(|s| {
        set_state(s, tid, ThreadState::Ready);
        if let Some(slot) = find_slot(s, tid) {
            s.tcbs[slot].as_mut().unwrap().blocked_on = None;
        }
        s.ready_queue.push_back(tid);
    });
}

pub(crate) fn block_current(reason: BlockedOn) {
    with_scheduler(|s| {
        let tid = s.running;
        set_state(s, tid, ThreadState::Blocked);
        if let Some(slot) = find_slot(s, tid) {
            s.tcbs[slot].as_mut().unwrap().blocked_on = Some(reason);
        }
    });
}

/// Capture the calling thread's own resumption point, then — if `tid` is
/// still in the state `expect` — park it by invoking [`schedule`]. When a
/// waker later flips that state and resumes this context, `expect` no
/// longer matches and the function returns normally. This is the same
/// double-return idiom `original_source/uthread.c` uses directly in
/// `uthread_mutex_lock`/`uthread_rwlock_rdlock`/`uthread_join`: capture,
/// test, conditionally hand off to the scheduler.
///
/// # Safety
/// Must be called on behalf of the currently running thread (`tid ==
/// current()`), with no scheduler lock held.
pub(crate) unsafe fn park_while(tid: Tid, expect: ThreadState) {
    let ctx_ptr = with_scheduler(|s| context_ptr(s, tid));
    (*ctx_ptr).capture();
    // This line runs twice: once right after the capture above, and again,
    // possibly much later, when some waker resumes this very context.
    let still = with_scheduler(|s| state_of(s, tid) == expect);
    if still {
        schedule();
    }
}

/// Pick the next ready thread and switch to it, freeing any deferred stack
/// first. If the ready queue is empty, falls back to the main context
/// (spec.md §4.D). Must be called with no scheduler lock held.
pub(crate) fn schedule() {
    enum Switch {
        None,
        Swap(*mut Context, *mut Context),
        Restore(*mut Context),
    }

    let switch = with_scheduler(|s| {
        if let Some(dead) = s.deferred_free.take() {
            if let Some(slot_idx) = find_slot(s, dead) {
                s.tcbs[slot_idx].as_mut().unwrap().stack = None;
            }
        }

        let prev = s.running;
        let prev_terminated = prev != 0 && state_of(s, prev) == ThreadState::Terminated;

        match s.ready_queue.pop_front() {
            None => {
                if prev == 0 {
                    return Switch::None;
                }
                s.running = 0;
                set_state(s, 0, ThreadState::Running);
                let prev_ctx = context_ptr(s, prev);
                let main_ctx = &mut s.main_context as *mut Context;
                if prev_terminated {
                    s.deferred_free = Some(prev);
                    Switch::Restore(main_ctx)
                } else {
                    Switch::Swap(prev_ctx, main_ctx)
                }
            }
            Some(next) => {
                s.running = next;
                set_state(s, next, ThreadState::Running);
                if next == prev {
                    // The only ready thread was the one that just called
                    // yield_now() on itself (e.g. the last survivor after
                    // every other thread has exited). Nothing else to swap
                    // to: a `Context::swap` here would alias the same
                    // `Context` as both `&mut` and `&`, which is unsound
                    // even though the underlying `swapcontext` would be
                    // harmless. State bookkeeping above already restored
                    // Running; there is nothing left to do.
                    return Switch::None;
                }
                let prev_ctx = context_ptr(s, prev);
                let next_ctx = context_ptr(s, next);
                if prev_terminated {
                    s.deferred_free = Some(prev);
                    Switch::Restore(next_ctx)
                } else {
                    Switch::Swap(prev_ctx, next_ctx)
                }
            }
        }
    });

    // SAFETY: the scheduler lock above is already dropped; performing the
    // actual stack switch while holding it would leave it permanently
    // locked on whichever native stack we are leaving behind.
    unsafe {
        match switch {
            Switch::None => {}
            Switch::Swap(from, to) => Context::swap(&mut *from, &*to),
            Switch::Restore(to) => (*to).restore(),
        }
    }
}

/// Voluntarily give up the remainder of the current time slice.
///
/// Demotes to READY and enqueues *before* capturing, then parks on
/// [`ThreadState::Ready`] — the same order [`join`]/`Mutex::lock` use via
/// [`block_current`] + [`park_while`] (set the distinguishing state, then
/// capture, then test for it). Capturing first and checking
/// `state == Running` afterward would observe `Running` on both the fresh
/// call and the later resumed one (the scheduler resets a dequeued
/// thread's state to `Running` before switching into it), so the check
/// could never tell "just yielded" apart from "about to return to the
/// caller" and would re-enter `schedule()` forever instead of ever
/// returning.
///
/// Masked like every other public entry (spec.md §4.D/§5): `tick_handler`
/// (signal.rs) calls this directly, so leaving it unmasked would let a
/// second tick, delivered while this call still holds `SCHEDULER`, re-enter
/// `yield_now` -> `with_scheduler` -> `SCHEDULER.0.lock()` on the same
/// non-reentrant `spin::Mutex` and self-deadlock the one OS thread.
pub fn yield_now() {
    let _mask = SignalMask::new();
    let tid = with_scheduler(|s| s.running);
    with_scheduler(|s| {
        set_state(s, tid, ThreadState::Ready);
        s.ready_queue.push_back(tid);
    });
    // SAFETY: called on behalf of the running thread.
    unsafe {
        park_while(tid, ThreadState::Ready);
    }
}

extern "C" fn entry_trampoline() {
    let tid = with_scheduler(|s| s.running);
    let entry = with_scheduler(|s| {
        let slot = find_slot(s, tid).expect("trampoline runs on behalf of a live slot");
        s.tcbs[slot].as_mut().unwrap().entry.take()
    });
    let retval = match entry {
        Some(f) => f(),
        None => Box::new(()),
    };
    exit(retval);
}

/// Spawn a new logical thread running `f` to completion, publishing its
/// return value for [`join`]. Mirrors `original_source/uthread.c`'s
/// `uthread_create`, generalized from a `void *(*)(void *)` entry point to
/// an owned Rust closure.
pub fn create<F, T>(f: F) -> Result<Tid, UthreadError>
where
    F: FnOnce() -> T + 'static,
    T: 'static,
{
    let _mask = SignalMask::new();
    with_scheduler(|s| {
        let slot = (1..MAX_THREADS).find(|&i| {
            s.tcbs[i]
                .as_ref()
                .map(|t| t.state == ThreadState::Terminated)
                .unwrap_or(true)
        });
        let slot = slot.ok_or(UthreadError::Capacity)?;

        let tid = s.next_tid;
        s.next_tid = s.next_tid.wrapping_add(1).max(1);

        let mut stack = vec![0u8; STACK_SIZE].into_boxed_slice();
        let mut tcb = Box::new(Tcb::new(tid));
        tcb.entry = Some(Box::new(move || Box::new(f()) as Box<dyn Any>));
        // SAFETY: `stack` is owned by `tcb` for as long as the context is
        // live, and nothing else touches it concurrently.
        unsafe {
            tcb.context.spawn(&mut stack, entry_trampoline);
        }
        tcb.stack = Some(stack);
        tcb.state = ThreadState::Ready;

        match s.tcbs[slot].as_mut() {
            Some(existing) => **existing = *tcb,
            None => s.tcbs[slot] = Some(tcb),
        }
        s.ready_queue.push_back(tid);
        trace!("created thread {tid} in slot {slot}");
        Ok(tid)
    })
}

/// Publish `retval`, wake any joiner, and switch away permanently. Never
/// returns, matching `original_source/uthread.c`'s `uthread_exit`. Exiting
/// from the main thread (tid 0) terminates the process outright (spec.md
/// §4.D) instead: the main thread owns no managed stack for `schedule()`
/// to switch away from, so there is nothing for a later `join` on it to
/// ever resume into.
pub fn exit(retval: Box<dyn Any>) -> ! {
    let _mask = SignalMask::new();
    let tid = with_scheduler(|s| s.running);

    if tid == 0 {
        drop(retval);
        std::process::exit(0);
    }

    let waiters = with_scheduler(|s| {
        let slot = find_slot(s, tid).expect("exit runs on behalf of a live slot");
        let t = s.tcbs[slot].as_mut().unwrap();
        t.retval = Some(retval);
        t.state = ThreadState::Terminated;
        std::mem::take(&mut t.waiters)
    });
    for joiner in waiters {
        wake(joiner);
    }
    schedule();
    unreachable!("a terminated thread's context is never resumed");
}

/// Block until `target` terminates, then return its published value. Fails
/// with [`UthreadError::InvalidArgument`] if `target` never existed, already
/// has a joiner, or refers to the calling thread.
pub fn join(target: Tid) -> Result<Box<dyn Any>, UthreadError> {
    let _mask = SignalMask::new();
    let me = with_scheduler(|s| s.running);
    if target == me || target == 0 {
        return Err(UthreadError::InvalidArgument);
    }

    let already_done = with_scheduler(|s| -> Result<bool, UthreadError> {
        let slot = find_slot(s, target).ok_or(UthreadError::InvalidArgument)?;
        let t = s.tcbs[slot].as_mut().unwrap();
        if t.state == ThreadState::Terminated {
            Ok(true)
        } else {
            if !t.waiters.is_empty() {
                return Err(UthreadError::Protocol);
            }
            t.waiters.push(me);
            Ok(false)
        }
    })?;

    if !already_done {
        block_current(BlockedOn::Join(target));
        // SAFETY: called on behalf of the running thread.
        unsafe {
            park_while(me, ThreadState::Blocked);
        }
    }

    with_scheduler(|s| {
        let slot = find_slot(s, target).ok_or(UthreadError::InvalidArgument)?;
        s.tcbs[slot]
            .as_mut()
            .unwrap()
            .retval
            .take()
            .ok_or(UthreadError::InvalidArgument)
    })
}

/// Fixed-capacity, non-allocating snapshot of every thread currently
/// blocked on a mutex, read by [`crate::deadlock::report`] from inside the
/// diagnostic signal handler. Uses `try_lock` rather than blocking, since a
/// signal handler that spins on a lock held by the very thread it
/// interrupted would never return. Returns the backing array plus how many
/// leading entries are valid.
pub(crate) fn try_snapshot_blocked_on_mutex() -> Option<([(Tid, usize); MAX_THREADS], usize)> {
    let mut out = [(0i32, 0usize); MAX_THREADS];
    let mut count = 0usize;
    let guard = SCHEDULER.0.try_lock()?;
    let s = guard.as_ref()?;
    for slot in s.tcbs.iter().flatten() {
        if let Some(BlockedOn::Mutex(id)) = slot.blocked_on {
            out[count] = (slot.tid, id);
            count += 1;
        }
    }
    Some((out, count))
}
