//! Preemption timer and signal plumbing.
//!
//! A real `ITIMER_VIRTUAL` interval timer delivers `SIGVTALRM` — virtual
//! time, meaning the timer only counts CPU time the process actually
//! consumes, not wall-clock time — to a single handler that is the sole
//! asynchronous scheduling entry point. Voluntary transitions (blocking,
//! sleeping, exiting) call [`crate::scheduler::Scheduler::reschedule`]
//! directly instead of raising the signal.

use std::io;
use std::mem::MaybeUninit;

use crate::error::ThreadError;

/// A RAII guard masking `SIGVTALRM` for its lifetime.
///
/// Unlike a mutex guard, nesting these is harmless rather than a deadlock
/// risk: masking and unmasking a signal are both idempotent OS operations
/// (blocking an already-blocked signal, or unblocking an already-unblocked
/// one, is simply a no-op), so there is no need to count nesting depth the
/// way a recursive lock would. This mirrors the original C source, which
/// calls bare `sigprocmask(SIG_BLOCK, ...)` / `sigprocmask(SIG_UNBLOCK,
/// ...)` at every critical-section boundary — including redundantly, when
/// a synchronous call (e.g. `sleep_quantums` calling into
/// `Scheduler::reschedule`) is already inside one — without any counter.
pub struct CriticalSection(());

impl CriticalSection {
    /// Masks the preemption signal.
    pub fn enter() -> Self {
        mask_preemption_signal();
        CriticalSection(())
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        unmask_preemption_signal();
    }
}

/// Unmasks the signal early, for the moment right before a context switch
/// (spec §4.4: "the mask is released before any non-local jump"). The
/// enclosing `CriticalSection` guard will unmask again when it is
/// eventually dropped — possibly much later, after this thread has been
/// switched away and back — which is a harmless no-op since unmasking an
/// already-unmasked signal does nothing.
///
/// This mirrors the original C source calling `sigprocmask(SIG_UNBLOCK,
/// ...)` immediately before `siglongjmp`.
pub fn unmask_before_switch() {
    unmask_preemption_signal();
}

fn mask_preemption_signal() {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGVTALRM);
        libc::sigprocmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
    }
}

fn unmask_preemption_signal() {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGVTALRM);
        libc::sigprocmask(libc::SIG_UNBLOCK, &set, std::ptr::null_mut());
    }
}

/// The function invoked on every `SIGVTALRM` delivery once [`install`] has
/// run; set by `install` to the scheduler's reschedule entry point.
static mut HANDLER: Option<fn()> = None;

extern "C" fn dispatch(_signum: libc::c_int) {
    // SAFETY: `HANDLER` is written exactly once, by `install`, before the
    // signal is ever unmasked, and never written again.
    if let Some(handler) = unsafe { HANDLER } {
        handler();
    }
}

/// Installs the `SIGVTALRM` handler and arms an `ITIMER_VIRTUAL` interval
/// timer that fires every `quantum` of process CPU time (spec §4.4).
pub fn install(quantum: std::time::Duration, handler: fn()) -> Result<(), ThreadError> {
    unsafe {
        HANDLER = Some(handler);

        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = dispatch as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = 0;
        if libc::sigaction(libc::SIGVTALRM, &action, std::ptr::null_mut()) < 0 {
            return Err(ThreadError::SystemCallFailed("sigaction", io::Error::last_os_error()));
        }

        let micros = quantum.as_micros().max(1) as i64;
        let mut timer = MaybeUninit::<libc::itimerval>::zeroed().assume_init();
        timer.it_value.tv_sec = micros / 1_000_000;
        timer.it_value.tv_usec = micros % 1_000_000;
        timer.it_interval.tv_sec = timer.it_value.tv_sec;
        timer.it_interval.tv_usec = timer.it_value.tv_usec;
        if libc::setitimer(libc::ITIMER_VIRTUAL, &timer, std::ptr::null_mut()) < 0 {
            return Err(ThreadError::SystemCallFailed("setitimer", io::Error::last_os_error()));
        }
    }
    Ok(())
}
