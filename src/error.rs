//! Error surface for the scheduler, mutex, and rwlock APIs.
//!
//! The teacher's fallible calls (e.g. `ThreadManager::setup_userspace`,
//! `vfs::vfs_read_file`) return `Result<_, &'static str>`; here the same
//! "rich internal error at the Rust boundary" idea is expressed as a real
//! enum so callers can match on failure kind instead of string-sniffing.

use thiserror::Error;

/// Failure kinds surfaced by the public API (spec.md §7).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum UthreadError {
    /// Null/unknown handle: an unknown `tid`, or a lock that was never
    /// initialized.
    #[error("invalid argument")]
    InvalidArgument,
    /// The thread table is full, or a stack could not be allocated.
    #[error("capacity exhausted")]
    Capacity,
    /// Unlock by a non-owner, recursive lock, or destroy of an in-use lock.
    #[error("protocol violation")]
    Protocol,
}

pub type UthreadResult<T> = Result<T, UthreadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_have_distinct_messages() {
        assert_eq!(UthreadError::InvalidArgument.to_string(), "invalid argument");
        assert_eq!(UthreadError::Capacity.to_string(), "capacity exhausted");
        assert_eq!(UthreadError::Protocol.to_string(), "protocol violation");
    }

    #[test]
    fn error_is_copy_and_comparable() {
        let e = UthreadError::Protocol;
        let copy = e;
        assert_eq!(e, copy);
        assert_ne!(UthreadError::Protocol, UthreadError::Capacity);
    }
}
