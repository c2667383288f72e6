//! A preemptive user-space thread library, scheduled round-robin over a
//! single OS thread.
//!
//! Call [`init`] once to install the preemption timer, then [`create`]
//! threads; the scheduler switches between them automatically on a fixed
//! quantum, or whenever a thread blocks, sleeps, or exits itself. There is
//! no true parallelism — at most one thread ever executes at a time — but
//! control can move between threads at any point a quantum boundary lands,
//! not only at cooperative yield points.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! extern "C" fn worker() {
//!     for _ in 0..3 {
//!         uthreads::sleep_quantums(1).unwrap();
//!     }
//!     uthreads::exit(uthreads::current()).unwrap();
//! }
//!
//! uthreads::init(Duration::from_millis(100)).unwrap();
//! let tid = uthreads::create(worker).unwrap();
//! # let _ = tid;
//! ```

mod context;
mod error;
mod ready_queue;
mod scheduler;
mod tcb;
#[cfg(test)]
mod test_support;
mod timer;

use std::cell::UnsafeCell;
use std::time::Duration;

pub use context::EntryFn;
pub use error::ThreadError;
pub use scheduler::Scheduler;
pub use tcb::{Tid, MAIN_TID};

/// Upper bound on the number of simultaneously live threads, including the
/// main thread.
pub const MAX_THREADS: usize = 64;

/// Stack size allocated to every thread [`create`] spawns.
pub const STACK_BYTES: usize = 64 * 1024;

struct SchedulerCell(UnsafeCell<Option<Scheduler>>);

// SAFETY: at most one OS thread ever runs this library's code at a time —
// that is the whole premise of the crate — and every access goes through
// `with_scheduler`, which masks the preemption signal *before* the `&mut`
// is formed, so there is never a data race to guard against with a real
// lock.
unsafe impl Sync for SchedulerCell {}

static SCHEDULER: SchedulerCell = SchedulerCell(UnsafeCell::new(None));

fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> Result<R, ThreadError> {
    // Masked first: if this were formed before masking, a timer tick
    // landing in the gap would have `dispatch` form a second `&mut` to the
    // same cell from inside the signal handler, aliasing the one this
    // function already holds.
    let _cs = timer::CriticalSection::enter();
    // SAFETY: exclusive access is guaranteed by the single-OS-thread,
    // signal-masked execution model documented on `SchedulerCell`, and the
    // mask above is held for this whole function, including the call to `f`.
    let slot = unsafe { &mut *SCHEDULER.0.get() };
    match slot {
        Some(s) => Ok(f(s)),
        None => Err(ThreadError::InvalidArgument("uthreads::init was not called")),
    }
}

fn on_timer_tick() {
    let _ = with_scheduler(Scheduler::on_timer_tick);
}

/// Installs the preemption timer and brings up the scheduler. Must be
/// called exactly once, from the main thread, before any other function in
/// this crate. `quantum` is both the length of a scheduling quantum and the
/// unit [`sleep_quantums`] counts in.
pub fn init(quantum: Duration) -> Result<(), ThreadError> {
    if quantum.is_zero() {
        return Err(ThreadError::InvalidArgument("quantum must be positive"));
    }
    // SAFETY: see `with_scheduler`; this runs before the timer is armed, so
    // nothing else can be touching `SCHEDULER` concurrently.
    let already_initialized = unsafe { (*SCHEDULER.0.get()).is_some() };
    if already_initialized {
        return Err(ThreadError::InvalidArgument("uthreads::init was already called"));
    }
    unsafe {
        *SCHEDULER.0.get() = Some(Scheduler::new(MAX_THREADS));
    }
    log::info!("uthreads initialized with a {quantum:?} quantum, {MAX_THREADS} max threads");
    timer::install(quantum, on_timer_tick)
}

/// Spawns a new thread running `entry`, ready to be scheduled. Returns its
/// tid, or [`ThreadError::ResourceExhausted`] if [`MAX_THREADS`] are
/// already live.
pub fn create(entry: EntryFn) -> Result<Tid, ThreadError> {
    with_scheduler(|s| s.create(entry, STACK_BYTES))?
}

/// Terminates thread `tid`. If `tid` is the calling thread, this call does
/// not return.
pub fn exit(tid: Tid) -> Result<(), ThreadError> {
    with_scheduler(|s| s.exit(tid))?
}

/// Marks thread `tid` ineligible to run until [`unblock`]ed. A no-op if it
/// is already blocked. Blocking the calling thread switches away
/// immediately.
pub fn block(tid: Tid) -> Result<(), ThreadError> {
    with_scheduler(|s| s.block(tid))?
}

/// Makes a blocked thread `tid` eligible to run again. A no-op if it is not
/// currently blocked.
pub fn unblock(tid: Tid) -> Result<(), ThreadError> {
    with_scheduler(|s| s.unblock(tid))?
}

/// Blocks the calling thread for `n` quantums. `n` must be positive, and
/// the calling thread must not be the main thread.
pub fn sleep_quantums(n: u32) -> Result<(), ThreadError> {
    with_scheduler(|s| s.sleep_quantums(n))?
}

/// The tid of the currently running thread.
pub fn current() -> Tid {
    with_scheduler(|s| s.current_tid()).unwrap_or(MAIN_TID)
}

/// Called by the context-switch trampoline when a thread's entry function
/// returns instead of calling [`exit`] on itself.
fn exit_current_or_abort() -> ! {
    let tid = current();
    let _ = exit(tid);
    std::process::abort();
}
