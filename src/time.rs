//! Monotonic cycle-counter substrate.
//!
//! Spec §6 lists `time_cycles()/time_ns_to_cycles(ns)/time_diff_cycles(a,b)`
//! as external primitives the scheduler consumes rather than owns. The
//! default implementation below treats "cycles" as nanoseconds of a
//! monotonic clock, which keeps `wait_time(ns)` exact without pretending to
//! know the host's TSC frequency — a caller on real hardware can supply
//! its own [`CycleCounter`] backed by `rdtsc` instead.

use std::time::Instant;

/// Substrate primitive: a monotonic, never-resetting counter.
pub trait CycleCounter: Send + Sync {
    fn now_cycles(&self) -> u64;

    fn ns_to_cycles(&self, ns: u64) -> u64 {
        ns
    }

    fn diff_cycles(&self, earlier: u64, later: u64) -> u64 {
        later.saturating_sub(earlier)
    }
}

/// Wall-clock backed counter used unless the embedder supplies another.
pub struct StdCycleCounter {
    epoch: Instant,
}

impl StdCycleCounter {
    pub fn new() -> Self {
        StdCycleCounter { epoch: Instant::now() }
    }
}

impl Default for StdCycleCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleCounter for StdCycleCounter {
    fn now_cycles(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}
