//! Event and source-queue synchronization class.

use crate::config::MAX_LOCKS_PER_QUEUE;

/// Synchronization class of a source queue (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncClass {
    /// Any number of threads may dispatch events from the queue
    /// concurrently.
    Parallel,
    /// At most one thread may hold the queue's command token at a time.
    Atomic,
    /// Events may be dispatched to distinct threads, but per-lock-index
    /// critical sections serialize in the queue's assigned sequence.
    Ordered,
}

/// An opaque unit of schedulable work.
///
/// `order`/`sync` are only meaningful for events drawn from an ordered
/// queue; `order_lock`/`order_unlock` read `sync` to decide when this
/// event's thread may enter each lock index's critical section.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    /// Caller-defined payload handle (e.g. a packet buffer id). Opaque to
    /// the scheduler.
    pub payload: u64,
    /// Position of this event among its ordered flow's peers, assigned at
    /// enqueue time by the producer. `None` for parallel/atomic events.
    pub order: Option<u64>,
    /// Per-lock-index sequence numbers, valid up to the originating
    /// queue's `lock_count`.
    pub sync: [u64; MAX_LOCKS_PER_QUEUE],
}

impl Default for Event {
    fn default() -> Self {
        Event::new(0)
    }
}

impl Event {
    pub fn new(payload: u64) -> Self {
        Event { payload, order: None, sync: [0; MAX_LOCKS_PER_QUEUE] }
    }

    pub fn ordered(payload: u64, order: u64, sync: [u64; MAX_LOCKS_PER_QUEUE]) -> Self {
        Event { payload, order: Some(order), sync }
    }
}
