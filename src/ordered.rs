//! Ordered-lock primitive (spec §4.5).
//!
//! Events dispatched from the same ordered queue may land on distinct
//! threads; `order_lock(i)`/`order_unlock(i)` serialize each thread's
//! entry into lock index `i`'s critical section in the strict order of
//! the events' assigned `sync[i]`.

use std::sync::atomic::Ordering;

use crate::context::ThreadContext;
use crate::error::fatal;
use crate::queue::QueueEntry;

/// Spin until this thread's turn for lock index `index` arrives. A no-op
/// if the thread holds no ordered context, or `index` is beyond the
/// originating queue's `lock_count`.
pub fn order_lock(ctx: &ThreadContext, index: usize) {
    let Some(hold) = &ctx.ordered else { return };
    if index >= hold.origin.lock_count {
        return;
    }
    let want = hold.sync[index];
    let mut seen = hold.origin.sync_out(index);
    debug_assert!(want >= seen, "order_lock: sync[{index}] behind sync_out");
    while seen != want {
        core::hint::spin_loop();
        seen = hold.origin.sync_out(index);
    }
}

/// Release lock index `index`, advancing the originating queue's counter
/// so the next event in sequence may proceed.
pub fn order_unlock(ctx: &ThreadContext, index: usize) {
    let Some(hold) = &ctx.ordered else { return };
    if index >= hold.origin.lock_count {
        return;
    }
    let want = hold.sync[index];
    let seen = hold.origin.sync_out(index);
    if seen != want {
        fatal("order_unlock called while sync_out does not match sync");
    }
    hold.origin.sync_out[index].fetch_add(1, Ordering::AcqRel);
}

/// Release the ordered context carried from a prior `schedule()` call.
///
/// Advances every lock index this event never explicitly unlocked so
/// that peers waiting on those indices are not blocked forever by an
/// event that skipped them (spec §4.5: "a lock may be skipped entirely
/// ... and the counter still advances when resolution fires"). Always
/// succeeds in this implementation, since there is no external reorder
/// buffer to wait on; the `bool` result is kept so a substrate which adds
/// one can signal retry-at-next-call without changing this signature.
pub fn release_order(origin: &QueueEntry, sync: &[u64], _enq_called: bool) -> bool {
    for i in 0..origin.lock_count {
        let seen = origin.sync_out(i);
        if seen == sync[i] {
            origin.sync_out[i].fetch_add(1, Ordering::AcqRel);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SyncClass;
    use crate::groups::GROUP_ALL;
    use crate::queue::{EventSource, MpmcQueue};
    use std::sync::Arc;

    fn queue_entry(lock_count: usize) -> Arc<QueueEntry> {
        let source: Arc<dyn EventSource> = MpmcQueue::new();
        QueueEntry::new(0, SyncClass::Ordered, GROUP_ALL, lock_count, source, 4)
    }

    #[test]
    fn release_order_advances_every_lock_index_matching_its_sync() {
        let qe = queue_entry(2);
        assert!(release_order(&qe, &[0, 0], false));
        assert_eq!(qe.sync_out(0), 1);
        assert_eq!(qe.sync_out(1), 1);
    }

    #[test]
    fn release_order_skips_an_index_whose_sync_out_already_moved_on() {
        let qe = queue_entry(2);
        // A peer already advanced index 0 past this event's expectation.
        qe.sync_out[0].fetch_add(1, Ordering::AcqRel);
        release_order(&qe, &[0, 0], false);
        // Index 0 is left alone: it no longer matches `sync[0]`.
        assert_eq!(qe.sync_out(0), 1);
        assert_eq!(qe.sync_out(1), 1);
    }

    #[test]
    fn release_order_respects_lock_count_not_full_array_width() {
        let qe = queue_entry(1);
        release_order(&qe, &[0, 0], false);
        assert_eq!(qe.sync_out(0), 1);
        assert_eq!(qe.sync_out(1), 0, "index beyond lock_count is untouched");
    }

    proptest::proptest! {
        /// Invariant 6 (spec.md §8): after `order_unlock(i)`, `sync_out[i]`
        /// is strictly greater than it was; `sync_out` is never observed to
        /// go backwards across a sequence of in-order unlocks (invariant 3).
        #[test]
        fn sync_out_is_monotonic_across_sequential_unlocks(n in 1usize..8) {
            let source: Arc<dyn EventSource> = MpmcQueue::new();
            let qe = QueueEntry::new(0, SyncClass::Ordered, GROUP_ALL, 1, source, 4);
            let mut previous = qe.sync_out(0);
            for i in 0..n as u64 {
                proptest::prop_assert_eq!(qe.sync_out(0), i);
                qe.sync_out[0].fetch_add(1, Ordering::AcqRel);
                proptest::prop_assert!(qe.sync_out(0) > previous);
                previous = qe.sync_out(0);
            }
        }
    }
}
