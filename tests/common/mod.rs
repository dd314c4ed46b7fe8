//! Shared test helpers.
//!
//! `uthreads` keeps one process-wide scheduler (`static SCHEDULER:
//! spin::Mutex<...>`), matching the teacher's own single kernel-global
//! `SCHEDULER`. Cargo runs every `#[test]` fn in a file on its own OS
//! thread by default, which would otherwise let two scenarios below race
//! over that global state; [`serial_guard`] forces them to run one at a
//! time within a file, the same way a real caller of this library is
//! expected to treat "the scheduler" as a singleton.

use std::sync::{Mutex, MutexGuard, OnceLock};

pub fn serial_guard() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Redirect fd 1 to a pipe for the duration of `f` and return whatever was
/// written to it. The deadlock report writes directly via `write(2)`
/// (async-signal-safe, so it cannot go through Rust's buffered stdout or
/// the test harness's output capture), so asserting on its text requires
/// grabbing the raw file descriptor.
pub fn capture_fd1<F: FnOnce()>(f: F) -> String {
    unsafe {
        let mut fds = [0i32; 2];
        assert_eq!(libc::pipe(fds.as_mut_ptr()), 0);
        let (read_fd, write_fd) = (fds[0], fds[1]);
        let saved = libc::dup(1);
        assert!(saved >= 0);
        libc::dup2(write_fd, 1);

        f();

        libc::dup2(saved, 1);
        libc::close(saved);
        libc::close(write_fd);

        let mut buf = [0u8; 4096];
        let n = libc::read(read_fd, buf.as_mut_ptr().cast(), buf.len());
        libc::close(read_fd);
        String::from_utf8_lossy(&buf[..n.max(0) as usize]).into_owned()
    }
}
