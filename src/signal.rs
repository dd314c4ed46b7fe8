//! The preemption driver: a periodic timer signal that drives round-robin
//! time-slicing, a second signal that triggers an on-demand deadlock report,
//! and the signal-masking discipline critical sections use.
//!
//! Grounded in `original_source/uthread.c`'s `scheduler_init` (installs
//! `SIGALRM` via `setitimer` and a `sigaction` handler, plus a `SIGQUIT`
//! handler for the deadlock dump) and in the teacher's
//! `arch::x86_64::interrupts` module, whose `enable`/`disable`/
//! `are_enabled`/`without_interrupts` and `DisableInterrupts` RAII guard are
//! the direct template for [`SignalMask`] below — just gating a POSIX signal
//! instead of the CPU's interrupt flag.

use std::mem::MaybeUninit;
use std::os::raw::c_int;
use std::time::Duration;

use crate::scheduler;

/// The periodic preemption tick, matching `original_source/uthread.c`.
pub const TICK_SIGNAL: c_int = libc::SIGALRM;
/// The on-demand deadlock-report trigger, matching `original_source/uthread.c`.
pub const DIAG_SIGNAL: c_int = libc::SIGQUIT;

/// Default time slice, matching `original_source/uthread.c`'s `QUANTUM_US`.
pub const QUANTUM: Duration = Duration::from_micros(10_000);

/// Install both signal handlers and arm the periodic timer. Idempotent:
/// callers that invoke `scheduler::init()` more than once do not re-arm.
pub(crate) fn install(quantum: Duration) {
    unsafe {
        install_handler(TICK_SIGNAL, tick_handler);
        install_handler(DIAG_SIGNAL, diag_handler);
        arm_timer(quantum);
    }
}

unsafe fn install_handler(signum: c_int, handler: extern "C" fn(c_int)) {
    let mut action: libc::sigaction = MaybeUninit::zeroed().assume_init();
    action.sa_sigaction = handler as usize;
    libc::sigemptyset(&mut action.sa_mask);
    // While the deadlock report runs, do not let a tick interrupt it midway
    // (spec.md §4.E): the report only ever reads state, but a tick firing
    // mid-read could hand the wait-for graph a thread whose state just
    // changed under it.
    if signum == DIAG_SIGNAL {
        libc::sigaddset(&mut action.sa_mask, TICK_SIGNAL);
    }
    action.sa_flags = libc::SA_RESTART;
    libc::sigaction(signum, &action, std::ptr::null_mut());
}

unsafe fn arm_timer(quantum: Duration) {
    let interval = libc::timeval {
        tv_sec: quantum.as_secs() as libc::time_t,
        tv_usec: quantum.subsec_micros() as libc::suseconds_t,
    };
    let timer = libc::itimerval {
        it_interval: interval,
        it_value: interval,
    };
    libc::setitimer(libc::ITIMER_REAL, &timer, std::ptr::null_mut());
}

extern "C" fn tick_handler(_sig: c_int) {
    // Mirrors original_source/uthread.c's timer_handler, which calls
    // scheduler_yield() directly from the handler: this library's scheduling
    // decisions are simple enough (no allocation on the yield path beyond
    // what create() already performed) that this is accepted here the same
    // way the reference implementation accepts it, rather than deferring to
    // a separate non-signal context.
    scheduler::yield_now();
}

extern "C" fn diag_handler(_sig: c_int) {
    crate::deadlock::report();
}

/// An RAII guard blocking [`TICK_SIGNAL`] for its lifetime, matching the
/// teacher's `arch::x86_64::interrupts::DisableInterrupts`. Held across a
/// voluntary context switch (mutex/rwlock/join blocking, or a yield), it is
/// not actually unsound to do so: `swapcontext`/`setcontext` save and
/// restore the process's blocked-signal mask as part of `ucontext_t`, so
/// whichever logical thread is running always carries its own mask forward;
/// the guard's `Drop` only fires once the call that created it truly
/// returns, however much later that is.
///
/// Nests the same way `DisableInterrupts` does: `new` records whether the
/// signal was *already* blocked on entry and only unblocks on `Drop` if it
/// was not. Several public entries now call other masked entries
/// internally (e.g. `Mutex::lock` calls `scheduler::current`), so an
/// unconditional unblock-on-drop would let an inner guard's `Drop` lift the
/// mask while an outer guard further up the same call still expects it
/// held.
///
/// Per `original_source/uthread.c`'s `block_signals`/`unblock_signals`, only
/// [`TICK_SIGNAL`] is masked here — [`DIAG_SIGNAL`] is deliberately left
/// unmasked during ordinary critical sections, carried over as documented
/// behavior rather than silently hardened (see DESIGN.md).
pub(crate) struct SignalMask {
    already_blocked: bool,
}

impl SignalMask {
    pub fn new() -> Self {
        let already_blocked = unsafe {
            let set = tick_set();
            let mut old: libc::sigset_t = MaybeUninit::zeroed().assume_init();
            libc::sigprocmask(libc::SIG_BLOCK, &set, &mut old);
            libc::sigismember(&old, TICK_SIGNAL) == 1
        };
        SignalMask { already_blocked }
    }
}

impl Drop for SignalMask {
    fn drop(&mut self) {
        if self.already_blocked {
            return;
        }
        unsafe {
            let set = tick_set();
            libc::sigprocmask(libc::SIG_UNBLOCK, &set, std::ptr::null_mut());
        }
    }
}

unsafe fn tick_set() -> libc::sigset_t {
    let mut set: libc::sigset_t = MaybeUninit::zeroed().assume_init();
    libc::sigemptyset(&mut set);
    libc::sigaddset(&mut set, TICK_SIGNAL);
    set
}

/// Write `msg` directly to stdout via `write(2)`, with no allocation and no
/// formatting machinery — the only I/O path that is safe to use from
/// [`tick_handler`]/[`diag_handler`], mirroring
/// `original_source/uthread.c`'s `safe_print_str`.
pub(crate) fn safe_print_str(msg: &str) {
    unsafe {
        libc::write(1, msg.as_ptr().cast(), msg.len());
    }
}

/// Render `n` as decimal ASCII into the tail of `buf`, returning the start
/// index of the written digits. Pulled out of [`safe_print_int`] as a pure
/// function so the formatting itself — the part actually worth unit-testing
/// — does not require a signal-handler context or a file descriptor.
fn format_i32(mut n: i32, buf: &mut [u8; 12]) -> usize {
    let mut i = buf.len();
    let neg = n < 0;
    if neg {
        // avoid overflow on i32::MIN by working in i64
        let mut n64 = -(n as i64);
        if n64 == 0 {
            i -= 1;
            buf[i] = b'0';
        }
        while n64 > 0 {
            i -= 1;
            buf[i] = b'0' + (n64 % 10) as u8;
            n64 /= 10;
        }
    } else {
        if n == 0 {
            i -= 1;
            buf[i] = b'0';
        }
        while n > 0 {
            i -= 1;
            buf[i] = b'0' + (n % 10) as u8;
            n /= 10;
        }
    }
    if neg {
        i -= 1;
        buf[i] = b'-';
    }
    i
}

/// Render `n` into a fixed stack buffer and write it, mirroring
/// `original_source/uthread.c`'s `safe_print_int`. Async-signal-safe: no
/// allocation, no locale-aware formatting.
pub(crate) fn safe_print_int(n: i32) {
    let mut buf = [0u8; 12];
    let i = format_i32(n, &mut buf);
    unsafe {
        libc::write(1, buf[i..].as_ptr().cast(), buf.len() - i);
    }
}
