//! On-demand deadlock detection over the mutex-only wait-for graph.
//!
//! Grounded in `original_source/uthread.c`'s `deadlock_detect`/
//! `print_deadlock_report`: triggered by [`crate::signal::DIAG_SIGNAL`],
//! strictly advisory (never mutates scheduler state), and restricted to the
//! mutex graph — rwlocks are excluded both there and here (spec.md §4.I).
//! The report's wording is preserved verbatim so substring matches against
//! it keep working, exactly as the C source's callers rely on it.

use std::collections::BTreeMap;

use spin::Mutex as SpinMutex;

use crate::tcb::{Tid, MAX_THREADS};

/// Maps a live mutex's identity to its current owner, maintained by
/// `sync::mutex::Mutex` on every lock/handoff/unlock. Keyed by an opaque id
/// rather than a raw pointer to the mutex itself, so the detector never
/// dereferences caller-owned memory (spec.md's DESIGN NOTES flag raw
/// TCB/mutex pointers as a dangling-pointer risk this avoids).
pub(crate) static MUTEX_OWNERS: SpinMutex<BTreeMap<usize, Tid>> = SpinMutex::new(BTreeMap::new());

pub(crate) fn set_owner(mutex_id: usize, owner: Tid) {
    MUTEX_OWNERS.lock().insert(mutex_id, owner);
}

pub(crate) fn clear_owner(mutex_id: usize) {
    MUTEX_OWNERS.lock().remove(&mutex_id);
}

/// Synchronous counterpart to the signal-triggered report, for callers that
/// want `deadlock_detect()` (spec.md §6) as an ordinary function call rather
/// than waiting on [`crate::signal::DIAG_SIGNAL`]. Masks the tick for the
/// duration like every other public API, then runs the identical check.
pub fn detect() {
    let _mask = crate::signal::SignalMask::new();
    report();
}

/// Run the detector and print a report to stdout. Called either from
/// [`crate::signal::diag_handler`], with the tick signal masked for the
/// duration (the handler's `sigaction` mask includes it), or from
/// [`detect`], so this never races a concurrent `schedule()`. It still
/// guards every shared lookup with `try_lock`, falling back to "No deadlock
/// detected." if a lock is contended — this can only happen if the
/// diagnostic signal itself interrupts a critical section (spec.md's
/// documented, unfixed signal-mask asymmetry; see DESIGN.md), in which case
/// the data is mid-mutation anyway and a conservative negative report is the
/// safer of two unreliable answers.
///
/// Async-signal-safe: no allocation on the report path, direct `write(2)`
/// via [`crate::signal::safe_print_str`]/[`safe_print_int`].
pub(crate) fn report() {
    let owners = match MUTEX_OWNERS.try_lock() {
        Some(g) => g,
        None => {
            crate::signal::safe_print_str("No deadlock detected.\n");
            return;
        }
    };

    let (blocked, count) = match crate::scheduler::try_snapshot_blocked_on_mutex() {
        Some(b) => b,
        None => {
            crate::signal::safe_print_str("No deadlock detected.\n");
            return;
        }
    };
    let blocked = &blocked[..count];

    let mut any = false;
    for &(tid, mutex_id) in blocked.iter() {
        // Walk the chain tid -> owner(mutex_id) -> owner(mutex it's blocked
        // on) -> ... up to MAX_THREADS hops (a cycle can involve at most
        // every live thread once); a repeat of the start tid is a cycle.
        //
        // `seen` tracks visited *tids*, not slot indices — tid is a
        // forever-monotonic counter (spec.md §4.A), so it can exceed
        // MAX_THREADS long before MAX_THREADS threads are live at once. A
        // fixed-size array of tid values (rather than one indexed by tid)
        // keeps the walk allocation-free while staying correct regardless
        // of how large tids have grown.
        let mut seen = [0 as Tid; MAX_THREADS];
        let mut seen_count = 0usize;
        let mut current_mutex = mutex_id;
        let mut hops = 0usize;
        loop {
            let owner = match owners.get(&current_mutex) {
                Some(&o) => o,
                None => break,
            };
            if owner == tid {
                any = true;
                crate::signal::safe_print_str("Deadlock detected! Cycle involving thread ");
                crate::signal::safe_print_int(tid);
                crate::signal::safe_print_str("\n");
                break;
            }
            if seen[..seen_count].contains(&owner) {
                break;
            }
            if seen_count >= MAX_THREADS {
                break;
            }
            seen[seen_count] = owner;
            seen_count += 1;
            hops += 1;
            if hops >= MAX_THREADS {
                break;
            }
            current_mutex = match blocked.iter().find(|&&(t, _)| t == owner) {
                Some(&(_, m)) => m,
                None => break,
            };
        }
    }

    if !any {
        crate::signal::safe_print_str("No deadlock detected.\n");
    }
}
