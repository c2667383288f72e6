//! Error type returned by the public scheduler API.
//!
//! Every failure is one of a small, flat set of cases rather than a bare
//! sentinel code, since a caller checking `result == -1` in Rust would be
//! fighting the type system instead of using it.

use std::fmt;

/// Everything that can go wrong calling into the scheduler.
#[derive(Debug)]
pub enum ThreadError {
    /// A TID was out of range, a quantum/sleep count was non-positive, or an
    /// operation was attempted on TID 0 that TID 0 may not perform.
    InvalidArgument(&'static str),
    /// `create` was called with no free thread table slot.
    ResourceExhausted,
    /// The target TID's slot is not currently a live thread.
    NotLive(usize),
    /// Installing the signal handler or arming the interval timer failed.
    SystemCallFailed(&'static str, std::io::Error),
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            ThreadError::ResourceExhausted => write!(f, "no free thread table slot"),
            ThreadError::NotLive(tid) => write!(f, "thread {tid} is not live"),
            ThreadError::SystemCallFailed(call, err) => {
                write!(f, "{call} failed: {err}")
            }
        }
    }
}

impl std::error::Error for ThreadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ThreadError::SystemCallFailed(_, err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_failure() {
        assert!(ThreadError::InvalidArgument("n <= 0").to_string().contains("n <= 0"));
        assert!(ThreadError::ResourceExhausted.to_string().contains("slot"));
        assert!(ThreadError::NotLive(7).to_string().contains('7'));
    }
}
