//! Bounded FIFO of thread ids awaiting the CPU.
//!
//! The queue is deliberately dumb: it does not know about thread liveness
//! or state, and it can legitimately hold stale entries (see module docs on
//! [`crate::scheduler`]) — skipping those is the scheduler's job, not the
//! queue's.

use std::collections::VecDeque;

use crate::tcb::Tid;

/// FIFO of ready thread ids, capacity-bounded to `MAX_THREADS`.
pub struct ReadyQueue {
    queue: VecDeque<Tid>,
    capacity: usize,
}

impl ReadyQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `tid` to the back of the queue.
    ///
    /// The scheduler invariants (at most one queue entry per live thread, at
    /// most one `Running` thread outside the queue) guarantee this never
    /// overflows capacity; we assert it rather than return a `Result`
    /// because a caller has no sane recovery for "the impossible happened".
    pub fn enqueue(&mut self, tid: Tid) {
        debug_assert!(
            self.queue.len() < self.capacity,
            "ready queue overflow: invariants were violated"
        );
        self.queue.push_back(tid);
    }

    /// Removes and returns the thread id at the front of the queue, if any.
    pub fn dequeue(&mut self) -> Option<Tid> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, tid: Tid) -> bool {
        self.queue.contains(&tid)
    }
}
