//! Execution-context capture and restore.
//!
//! Grounded in `original_source/uthread.c`, which builds every thread's
//! stack-switch on top of `ucontext_t`/`getcontext`/`makecontext`/
//! `swapcontext`. The teacher has no direct equivalent (its
//! `scheduler/mod.rs` switches contexts via a hand-rolled `InterruptFrame`
//! popped off an interrupt stack), so this module leans on `libc`'s raw
//! bindings the same way the teacher leans on the `x86`/`x86_64` crates for
//! hardware it cannot express in safe Rust: as the "host facility" crate for
//! something only the OS can do.

use std::mem::MaybeUninit;
use std::ptr;

/// A saved execution point: registers, stack pointer, program counter, and
/// (per POSIX) the blocked-signal mask at the moment of capture.
///
/// That last part matters: `swapcontext`/`setcontext` restore `uc_sigmask`
/// along with the registers, so a [`crate::signal::SignalMask`] held across a
/// context switch is carried correctly into whichever logical thread resumes
/// next, without any explicit hand-off code in this module.
pub struct Context(libc::ucontext_t);

impl Context {
    /// An empty context, suitable only as a destination for [`Context::capture`]
    /// or [`Context::spawn`] before first use.
    pub fn empty() -> Self {
        // SAFETY: a zeroed ucontext_t is never dereferenced as live register
        // state until `capture` or `spawn` has filled it in.
        Context(unsafe { MaybeUninit::zeroed().assume_init() })
    }

    /// Snapshot the calling thread's current registers/stack/signal mask into
    /// `self`. Returns normally; if this context is later restored (via
    /// [`Context::restore`] or as the target of [`Context::swap`]), execution
    /// resumes a second time immediately after this call, as if it had
    /// returned twice.
    ///
    /// # Safety
    /// `self` must not be swapped/restored into from another thread while
    /// this call is capturing it.
    pub unsafe fn capture(&mut self) {
        libc::getcontext(&mut self.0);
    }

    /// Build a fresh context that, when first switched to, starts running
    /// `entry` on `stack`, taking no further arguments — the entry function
    /// reads whatever it needs (its own tid) off scheduler state, just as
    /// `original_source/uthread.c`'s `thread_wrapper` reads the global
    /// `running_thread` rather than an argument passed through `makecontext`.
    ///
    /// # Safety
    /// `stack` must outlive every switch into this context, and must not be
    /// touched by anything else while the context is live.
    pub unsafe fn spawn(&mut self, stack: &mut [u8], entry: extern "C" fn()) {
        libc::getcontext(&mut self.0);
        self.0.uc_stack.ss_sp = stack.as_mut_ptr().cast();
        self.0.uc_stack.ss_size = stack.len();
        self.0.uc_stack.ss_flags = 0;
        self.0.uc_link = ptr::null_mut();
        let entry: extern "C" fn() = entry;
        libc::makecontext(&mut self.0, std::mem::transmute(entry), 0);
    }

    /// Switch from `from` to `to`, saving `from`'s registers first. Returns
    /// once `from` is resumed again by a later swap/restore into it.
    ///
    /// # Safety
    /// Both contexts must refer to live, correctly sized stacks (or be the
    /// thread's own original stack, for the main context).
    pub unsafe fn swap(from: &mut Context, to: &Context) {
        libc::swapcontext(&mut from.0, &to.0);
    }

    /// Switch to `self` without saving the caller's registers anywhere. Used
    /// only when the caller's context is about to be discarded (a terminated
    /// thread is never resumed, so there is nothing to save) — see
    /// spec.md §4.B.
    ///
    /// # Safety
    /// The caller must never be resumed; `self` must be a live context.
    pub unsafe fn restore(&self) -> ! {
        libc::setcontext(&self.0);
        unreachable!("setcontext does not return on success")
    }
}
