//! Source queues: the substrate's MPMC event queues, and the scheduler's
//! per-queue bookkeeping record (`queue_entry` in spec §3).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use spin::{Mutex, Once};

use crate::command::CommandToken;
use crate::config::MAX_LOCKS_PER_QUEUE;
use crate::event::{Event, SyncClass};
use crate::groups::GroupId;

/// Stable identity of a source queue, independent of its storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueHandle(pub u64);

static NEXT_QUEUE_HANDLE: AtomicU64 = AtomicU64::new(1);

impl QueueHandle {
    pub fn new() -> Self {
        QueueHandle(NEXT_QUEUE_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for QueueHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a multi-event drain, mirroring `queue_deq_multi`'s
/// negative/zero/positive return convention from spec §6.
pub enum DrainOutcome {
    /// The queue was concurrently destroyed; the dispatcher must call
    /// [`EventSource::finalize`] and must not re-enqueue the command token.
    Destroyed,
    /// The queue had no events available.
    Empty,
    /// `n` events were copied into the caller's buffer.
    Filled(usize),
}

/// Substrate primitive: a multi-producer/multi-consumer FIFO of events.
///
/// Out of scope per spec §1 ("the underlying lock-free queue
/// implementation ... consumed as a primitive"); [`MpmcQueue`] below is the
/// concrete implementation this crate ships and tests against.
pub trait EventSource: Send + Sync {
    /// Push one event. Returns `None` if the queue has been destroyed and
    /// cannot accept it; otherwise `Some(was_empty)`, where `was_empty`
    /// reports whether the queue held zero events immediately before this
    /// push — the producer-side signal spec §4.8 requires before calling
    /// `reschedule`.
    fn enqueue(&self, ev: Event) -> Option<bool>;
    fn dequeue_multi(&self, out: &mut [Event], max: usize) -> DrainOutcome;
    /// Called once, when the dispatcher has observed [`DrainOutcome::Destroyed`].
    fn finalize(&self) {}
}

/// A plain spinlock-guarded ring of events.
///
/// Grounded in the teacher's own `Mutex<PriorityQueue>`-per-CPU pattern
/// (`subsystems::scheduler::unified::PerCpuScheduler`): a short spinlock
/// critical section is exactly the concurrency budget spec §5 allows for
/// lane/queue mutations.
pub struct MpmcQueue {
    events: Mutex<VecDeque<Event>>,
    destroyed: std::sync::atomic::AtomicBool,
}

impl MpmcQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(MpmcQueue {
            events: Mutex::new(VecDeque::new()),
            destroyed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Mark the queue destroyed; the next drain observes
    /// [`DrainOutcome::Destroyed`] regardless of buffered content.
    pub fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::Release);
    }
}

impl Default for MpmcQueue {
    fn default() -> Self {
        MpmcQueue {
            events: Mutex::new(VecDeque::new()),
            destroyed: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

impl EventSource for MpmcQueue {
    fn enqueue(&self, ev: Event) -> Option<bool> {
        if self.destroyed.load(Ordering::Acquire) {
            return None;
        }
        let mut q = self.events.lock();
        let was_empty = q.is_empty();
        q.push_back(ev);
        Some(was_empty)
    }

    fn dequeue_multi(&self, out: &mut [Event], max: usize) -> DrainOutcome {
        if self.destroyed.load(Ordering::Acquire) {
            return DrainOutcome::Destroyed;
        }
        let mut q = self.events.lock();
        if q.is_empty() {
            return DrainOutcome::Empty;
        }
        let n = max.min(out.len()).min(q.len());
        for slot in out.iter_mut().take(n) {
            *slot = q.pop_front().expect("checked len above");
        }
        DrainOutcome::Filled(n)
    }
}

/// Per-queue scheduling metadata (spec §3 "Queue (source queue)").
///
/// A queue's lane and priority are fixed for its lifetime, assigned once
/// at [`crate::dispatcher::Scheduler::attach`] time.
pub struct QueueEntry {
    pub handle: QueueHandle,
    pub priority: usize,
    pub sync_class: SyncClass,
    pub group: GroupId,
    pub lock_count: usize,
    /// Monotonically increasing per-lock-index counters, advanced by
    /// `order_unlock` and by order-resolution on enqueue.
    pub(crate) sync_out: [AtomicU64; MAX_LOCKS_PER_QUEUE],
    pub(crate) lane: usize,
    /// The command token placed on the fabric for this queue; set once at
    /// attach and read by `reschedule`/the dispatcher's re-enqueue paths.
    pub(crate) token: Once<CommandToken>,
    pub(crate) source: Arc<dyn EventSource>,
    live: std::sync::atomic::AtomicBool,
    detached: std::sync::atomic::AtomicBool,
}

impl QueueEntry {
    pub fn new(
        priority: usize,
        sync_class: SyncClass,
        group: GroupId,
        lock_count: usize,
        source: Arc<dyn EventSource>,
        lanes_per_priority: usize,
    ) -> Arc<Self> {
        let handle = QueueHandle::new();
        let lane = lane_id_for_queue(handle, lanes_per_priority);
        Arc::new(QueueEntry {
            handle,
            priority,
            sync_class,
            group,
            lock_count: lock_count.min(MAX_LOCKS_PER_QUEUE),
            sync_out: core::array::from_fn(|_| AtomicU64::new(0)),
            lane,
            token: Once::new(),
            source,
            live: std::sync::atomic::AtomicBool::new(true),
            detached: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn sync_out(&self, index: usize) -> u64 {
        self.sync_out[index].load(Ordering::Acquire)
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn mark_destroyed(&self) {
        self.live.store(false, Ordering::Release);
    }

    /// Attempts to transition this entry into "detached". Returns `true`
    /// exactly once, for whichever caller wins the race; a repeat call
    /// (double `detach`) observes `false`.
    pub(crate) fn mark_detached(&self) -> bool {
        self.detached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Hash a queue handle down to a lane id, per spec §3's
/// `id = hash(queue_handle) mod L` invariant.
pub fn lane_id_for_queue(handle: QueueHandle, lanes: usize) -> usize {
    (handle.0 as usize) % lanes
}
