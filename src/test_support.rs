//! Test-only helpers shared across this crate's unit tests.

#![cfg(test)]

use std::sync::{Mutex, MutexGuard};

/// Guards access to process-global state — the signal mask, the interval
/// timer, the scheduler singleton — that `cargo test`'s default concurrent
/// test runner would otherwise race on.
static LOCK: Mutex<()> = Mutex::new(());

/// Acquire before any test that touches global signal or scheduler state.
/// Held for the guard's lifetime; drop it (end of test) to let the next
/// test in line proceed.
pub fn serialize() -> MutexGuard<'static, ()> {
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
