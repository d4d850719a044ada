//! Priority fabric: O(1) selection of non-empty lanes by priority
//! (spec §4.1).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;

use crate::command::CommandToken;
use crate::config::{LANES_PER_PRIORITY, NUM_PRIORITIES, NUM_SCHED_CMD};
use crate::error::{fatal, Error, Result};

/// One lane: a FIFO of command tokens plus the attachment refcount that
/// backs the occupancy bit in the priority's mask.
struct Lane {
    tokens: Mutex<VecDeque<CommandToken>>,
    /// How many attached sources currently use this lane. The mask bit is
    /// set iff this is nonzero (spec invariant 1 in §8).
    count: AtomicUsize,
}

impl Lane {
    fn new() -> Self {
        Lane { tokens: Mutex::new(VecDeque::new()), count: AtomicUsize::new(0) }
    }
}

/// `pri_queue[P][L]`, `pri_mask[P]`, `pri_count[P][L]`, one mask lock.
pub struct PriorityFabric {
    lanes: Vec<Vec<Lane>>,
    /// Occupancy bitmask per priority: bit `id` set iff `pri_count[p][id] > 0`.
    masks: Vec<AtomicU64>,
    /// Guards (mask, count) mutation as a single step, per spec §3.
    mask_lock: Mutex<()>,
    /// Live command-token count across every lane, capped at
    /// [`NUM_SCHED_CMD`] — the fabric's fixed-size command-token pool.
    live_commands: AtomicUsize,
}

impl PriorityFabric {
    pub fn new() -> Self {
        let lanes = (0..NUM_PRIORITIES)
            .map(|_| (0..LANES_PER_PRIORITY).map(|_| Lane::new()).collect())
            .collect();
        let masks = (0..NUM_PRIORITIES).map(|_| AtomicU64::new(0)).collect();
        PriorityFabric { lanes, masks, mask_lock: Mutex::new(()), live_commands: AtomicUsize::new(0) }
    }

    pub fn num_priorities(&self) -> usize {
        NUM_PRIORITIES
    }

    pub fn lanes_per_priority(&self) -> usize {
        LANES_PER_PRIORITY
    }

    /// `attach(priority, id)`: register one more user of this lane,
    /// drawing one slot from the command-token pool.
    pub fn attach(&self, priority: usize, id: usize) -> Result<()> {
        let _guard = self.mask_lock.lock();
        if self.live_commands.load(Ordering::Relaxed) >= NUM_SCHED_CMD {
            return Err(Error::ResourceExhausted);
        }
        self.live_commands.fetch_add(1, Ordering::Relaxed);
        self.lanes[priority][id].count.fetch_add(1, Ordering::Relaxed);
        self.masks[priority].fetch_or(1u64 << id, Ordering::Release);
        Ok(())
    }

    /// `detach(priority, id)`: clear the mask bit once the last user is
    /// gone and return the slot to the command-token pool. A detach with
    /// no outstanding refcount (double detach, or detach without a prior
    /// attach) is an invariant violation, not a recoverable error.
    pub fn detach(&self, priority: usize, id: usize) {
        let _guard = self.mask_lock.lock();
        let prev = self.lanes[priority][id].count.fetch_sub(1, Ordering::Relaxed);
        if prev == 0 {
            fatal("fabric detach: refcount underflow (double detach or detach without attach)");
        }
        if prev == 1 {
            self.masks[priority].fetch_and(!(1u64 << id), Ordering::Release);
        }
        self.live_commands.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn mask(&self, priority: usize) -> u64 {
        self.masks[priority].load(Ordering::Acquire)
    }

    pub fn lane_bit_set(&self, priority: usize, id: usize) -> bool {
        (self.mask(priority) & (1u64 << id)) != 0
    }

    pub fn push(&self, priority: usize, id: usize, token: CommandToken) {
        self.lanes[priority][id].tokens.lock().push_back(token);
    }

    pub fn pop(&self, priority: usize, id: usize) -> Option<CommandToken> {
        self.lanes[priority][id].tokens.lock().pop_front()
    }

    #[cfg(test)]
    pub(crate) fn count(&self, priority: usize, id: usize) -> usize {
        self.lanes[priority][id].count.load(Ordering::Relaxed)
    }
}

impl Default for PriorityFabric {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::queue::{EventSource, MpmcQueue};
    use crate::event::SyncClass;
    use crate::queue::QueueEntry;

    #[test]
    fn attach_sets_mask_bit_detach_clears_it_at_zero_refcount() {
        let fabric = PriorityFabric::new();
        assert_eq!(fabric.mask(0), 0);

        fabric.attach(0, 2).unwrap();
        assert!(fabric.lane_bit_set(0, 2));
        assert_eq!(fabric.count(0, 2), 1);

        fabric.attach(0, 2).unwrap();
        assert_eq!(fabric.count(0, 2), 2);

        fabric.detach(0, 2);
        assert!(fabric.lane_bit_set(0, 2), "bit stays set while refcount > 0");

        fabric.detach(0, 2);
        assert!(!fabric.lane_bit_set(0, 2));
        assert_eq!(fabric.mask(0), 0);
    }

    #[test]
    fn attach_fails_once_the_command_pool_is_exhausted() {
        let fabric = PriorityFabric::new();
        for _ in 0..crate::config::NUM_SCHED_CMD {
            fabric.attach(0, 0).unwrap();
        }
        assert_eq!(fabric.attach(0, 0), Err(Error::ResourceExhausted));

        // Freeing one slot makes room for exactly one more attach.
        fabric.detach(0, 0);
        assert!(fabric.attach(0, 0).is_ok());
    }

    #[test]
    fn push_pop_is_fifo_within_a_lane() {
        let fabric = PriorityFabric::new();
        let source: std::sync::Arc<dyn EventSource> = MpmcQueue::new();
        let qe = QueueEntry::new(0, SyncClass::Parallel, crate::groups::GROUP_ALL, 0, source, 4);
        let a: crate::command::CommandToken = std::sync::Arc::new(Command::Dequeue(qe.clone()));
        let b: crate::command::CommandToken = std::sync::Arc::new(Command::Dequeue(qe));

        fabric.push(1, 0, a.clone());
        fabric.push(1, 0, b.clone());

        assert!(std::sync::Arc::ptr_eq(&fabric.pop(1, 0).unwrap(), &a));
        assert!(std::sync::Arc::ptr_eq(&fabric.pop(1, 0).unwrap(), &b));
        assert!(fabric.pop(1, 0).is_none());
    }

    #[test]
    fn distinct_lanes_are_independent() {
        let fabric = PriorityFabric::new();
        fabric.attach(3, 0).unwrap();
        fabric.attach(3, 1).unwrap();
        fabric.detach(3, 0);
        assert!(!fabric.lane_bit_set(3, 0));
        assert!(fabric.lane_bit_set(3, 1));
    }

    proptest::proptest! {
        /// Invariant 1 (spec.md §8): the mask bit for `(p, id)` is set iff
        /// the refcount for that lane is nonzero, under any sequence of
        /// attach/detach calls.
        #[test]
        fn mask_bit_tracks_refcount(ops in proptest::collection::vec((0usize..2, 0usize..3, proptest::bool::ANY), 0..64)) {
            let fabric = PriorityFabric::new();
            let mut counts = [[0i32; 3]; 2];
            for (p, id, is_attach) in ops {
                if is_attach {
                    fabric.attach(p, id).unwrap();
                    counts[p][id] += 1;
                } else if counts[p][id] > 0 {
                    fabric.detach(p, id);
                    counts[p][id] -= 1;
                }
                let expect_set = counts[p][id] > 0;
                proptest::prop_assert_eq!(fabric.lane_bit_set(p, id), expect_set);
                proptest::prop_assert_eq!(fabric.count(p, id) as i32, counts[p][id]);
            }
        }
    }
}
