//! Compile-time dimensions of the scheduler.
//!
//! These mirror the `#define`-style configuration knobs of the reference
//! scheduler (`ODP_CONFIG_SCHED_PRIOS`, `QUEUES_PER_PRIO`, `MAX_DEQ`, ...):
//! fixed at build time rather than threaded through as runtime parameters,
//! so the fabric's arrays can be stack/static allocated and the lane mask
//! width can be checked with a `const_assert!` instead of a runtime branch.

use static_assertions::const_assert;

/// Number of priority levels (`P`). Priority 0 is strictly preferred over 1.
pub const NUM_PRIORITIES: usize = 8;

/// Number of lanes per priority level (`L`).
pub const LANES_PER_PRIORITY: usize = 4;

/// Maximum number of ordered-lock indices a queue can use (`K`).
pub const MAX_LOCKS_PER_QUEUE: usize = 2;

/// Maximum number of events drained into a thread's local cache in one pass.
pub const MAX_DEQ: usize = 4;

/// Number of well-known schedule groups (`W`): ALL, WORKER, CONTROL.
pub const NUM_WELL_KNOWN_GROUPS: usize = 3;

/// Total number of schedule group slots (`G`), well-known + named.
pub const NUM_GROUPS: usize = 32;

/// Maximum length of a named schedule group's name, including the
/// terminating truncation (`N`).
pub const GROUP_NAME_LEN: usize = 32;

/// Maximum number of threads the thread-mask can address.
pub const MAX_THREADS: usize = 64;

/// Total command-token pool capacity: one slot per attachable queue plus
/// one per attachable packet-input port. Sized generously since the pool
/// only needs to satisfy the "at least one slot per attached source"
/// construction-time invariant, never a runtime cap on live attachments.
pub const NUM_SCHED_CMD: usize = 4096;

const_assert!(LANES_PER_PRIORITY <= u64::BITS as usize);
const_assert!(MAX_THREADS <= u64::BITS as usize);
const_assert!(NUM_WELL_KNOWN_GROUPS < NUM_GROUPS);
const_assert!(MAX_LOCKS_PER_QUEUE > 0);
