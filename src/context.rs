//! Per-thread scheduling state (spec §3 "Per-Thread Context", §4.4).
//!
//! Thread-local, never shared: each worker thread owns exactly one
//! `ThreadContext`, created by `init_local()` and torn down by
//! `term_local()`.

use std::sync::Arc;

use bitflags::bitflags;

use crate::command::CommandToken;
use crate::config::{MAX_DEQ, MAX_LOCKS_PER_QUEUE};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::fabric::PriorityFabric;
use crate::ordered;
use crate::queue::QueueEntry;

bitflags! {
    /// Snapshot of a thread's scheduling state, for `debug!` tracing and
    /// tests — never consulted by the dispatcher itself, which reads the
    /// underlying `Option`s directly.
    #[derive(Debug)]
    pub struct ContextFlags: u8 {
        const HAS_CACHED_EVENTS = 0b0000_0001;
        const HOLDS_ATOMIC      = 0b0000_0010;
        const HOLDS_ORDERED     = 0b0000_0100;
        const PAUSED            = 0b0000_1000;
    }
}

/// The lane a thread's held atomic token must be returned to.
pub(crate) struct AtomicHold {
    pub priority: usize,
    pub lane: usize,
    pub token: CommandToken,
}

/// Cached ordering metadata for the ordered flow currently being served.
pub(crate) struct OrderedHold {
    pub origin: Arc<QueueEntry>,
    pub order: u64,
    pub sync: [u64; MAX_LOCKS_PER_QUEUE],
    pub enq_called: bool,
}

pub struct ThreadContext {
    pub(crate) local_events: [Event; MAX_DEQ],
    pub(crate) local_index: usize,
    pub(crate) local_num: usize,
    pub(crate) local_src_queue: Option<Arc<QueueEntry>>,

    pub(crate) atomic: Option<AtomicHold>,
    pub(crate) ordered: Option<OrderedHold>,
    pub(crate) ignore_ordered_context: bool,
    pub(crate) pause: bool,
}

impl ThreadContext {
    pub fn new() -> Self {
        ThreadContext {
            local_events: [Event::default(); MAX_DEQ],
            local_index: 0,
            local_num: 0,
            local_src_queue: None,
            atomic: None,
            ordered: None,
            ignore_ordered_context: false,
            pause: false,
        }
    }

    /// `term_local()` requires the thread hold no cached events and no
    /// outstanding context (spec §3 lifecycle, §7 API misuse).
    pub fn check_can_terminate(&self) -> Result<()> {
        if self.local_num != 0 || self.atomic.is_some() || self.ordered.is_some() {
            return Err(Error::ContextHeld);
        }
        Ok(())
    }

    pub fn has_cached_events(&self) -> bool {
        self.local_num > 0
    }

    /// Diagnostic snapshot used by `debug!` tracing in the dispatcher.
    pub fn flags(&self) -> ContextFlags {
        let mut f = ContextFlags::empty();
        f.set(ContextFlags::HAS_CACHED_EVENTS, self.has_cached_events());
        f.set(ContextFlags::HOLDS_ATOMIC, self.atomic.is_some());
        f.set(ContextFlags::HOLDS_ORDERED, self.ordered.is_some());
        f.set(ContextFlags::PAUSED, self.pause);
        f
    }

    /// Release the atomic context iff the thread has drained its local
    /// cache. A failed re-enqueue is an unreachable-by-construction
    /// invariant violation (spec §4.4, §5) and aborts the process.
    pub(crate) fn release_atomic(&mut self, fabric: &PriorityFabric) {
        if self.local_num != 0 {
            return;
        }
        if let Some(hold) = self.atomic.take() {
            fabric.push(hold.priority, hold.lane, hold.token);
        }
    }

    /// Release the ordered context, if the ordering subsystem accepts it
    /// (spec §4.4: "Failure leaves the context intact for a retry").
    pub(crate) fn release_ordered(&mut self) {
        if let Some(hold) = &self.ordered {
            if ordered::release_order(&hold.origin, &hold.sync, hold.enq_called) {
                self.ordered = None;
            }
        }
    }

    /// Release whichever context (at most one) is held, called at the top
    /// of every scheduling pass.
    pub(crate) fn release_context(&mut self, fabric: &PriorityFabric) {
        if self.ordered.is_some() {
            self.release_ordered();
        } else {
            self.release_atomic(fabric);
        }
    }

    pub fn order_lock(&self, index: usize) {
        ordered::order_lock(self, index);
    }

    pub fn order_unlock(&self, index: usize) {
        ordered::order_unlock(self, index);
    }

    /// Mark that this call performed at least one downstream enqueue,
    /// which `release_ordered` needs before it may advance the flow.
    pub fn note_enqueue_called(&mut self) {
        if let Some(hold) = &mut self.ordered {
            hold.enq_called = true;
        }
        self.ignore_ordered_context = true;
    }

    /// `get_sched_order`: the ordered-flow origin a newly produced event
    /// should carry, for producers that want to propagate ordering by
    /// hand (spec §4.8's rationale, supplemented from the reference
    /// implementation's `get_sched_order`/`sched_enq_called` pair, which
    /// the distilled spec names only indirectly).
    ///
    /// One-shot: a `reschedule()` call in between clears
    /// `ignore_ordered_context`, causing the *next* call to this method to
    /// report "no ordered context" once, so that an event enqueued onto an
    /// unrelated, previously-empty queue does not inherit this thread's
    /// ordered flow.
    pub fn current_order(&mut self) -> Option<(Arc<QueueEntry>, u64)> {
        if self.ignore_ordered_context {
            self.ignore_ordered_context = false;
            return None;
        }
        self.ordered.as_ref().map(|hold| (hold.origin.clone(), hold.order))
    }
}

impl Default for ThreadContext {
    fn default() -> Self {
        Self::new()
    }
}
