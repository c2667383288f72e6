//! Three cooperating threads: one sleeps, one blocks itself and waits to be
//! unblocked, one busy-loops — demonstrating that all three interleave
//! under preemption even though none of them yields explicitly except the
//! sleeper and the blocker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static FINISHED_1: AtomicBool = AtomicBool::new(false);
static FINISHED_2: AtomicBool = AtomicBool::new(false);
static FINISHED_3: AtomicBool = AtomicBool::new(false);
static THREAD_2_HAS_BLOCKED: AtomicBool = AtomicBool::new(false);

extern "C" fn thread1() {
    log::info!("thread 1: starting, sleeping for 3 quantums");
    uthreads::sleep_quantums(3).unwrap();
    log::info!("thread 1: woke up, exiting");
    FINISHED_1.store(true, Ordering::SeqCst);
    uthreads::exit(uthreads::current()).unwrap();
}

extern "C" fn thread2() {
    log::info!("thread 2: starting, blocking itself");
    THREAD_2_HAS_BLOCKED.store(true, Ordering::SeqCst);
    uthreads::block(uthreads::current()).unwrap();
    log::info!("thread 2: unblocked, exiting");
    FINISHED_2.store(true, Ordering::SeqCst);
    uthreads::exit(uthreads::current()).unwrap();
}

extern "C" fn thread3() {
    log::info!("thread 3: starting");
    for i in 0..3 {
        log::info!("thread 3: iteration {}", i + 1);
        for j in 0..1_000_000u64 {
            std::hint::black_box(j);
        }
    }
    log::info!("thread 3: exiting");
    FINISHED_3.store(true, Ordering::SeqCst);
    uthreads::exit(uthreads::current()).unwrap();
}

fn main() {
    env_logger::init();

    uthreads::init(Duration::from_micros(100_000)).expect("failed to initialize thread system");

    uthreads::create(thread1).expect("failed to create thread 1");
    uthreads::create(thread2).expect("failed to create thread 2");
    uthreads::create(thread3).expect("failed to create thread 3");

    while !(FINISHED_1.load(Ordering::SeqCst)
        && FINISHED_2.load(Ordering::SeqCst)
        && FINISHED_3.load(Ordering::SeqCst))
    {
        if THREAD_2_HAS_BLOCKED.swap(false, Ordering::SeqCst) {
            log::info!("main: unblocking thread 2");
            uthreads::unblock(2).unwrap();
        }
        for j in 0..10_000_000u64 {
            std::hint::black_box(j);
        }
    }

    log::info!("main: all threads finished, exiting");
}
