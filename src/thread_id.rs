//! Per-thread identity substrate (spec §6: `thread_id()` — "per-thread
//! monotonic id in `[0, T)`").
//!
//! Out of scope per spec §1 ("a thread-id service ... consumed as a
//! primitive"); [`LazyThreadIdentity`] below is the concrete
//! implementation this crate ships and tests against.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::MAX_THREADS;

/// Substrate primitive: assigns each calling thread a stable id.
pub trait ThreadIdentity: Send + Sync {
    /// Return the calling thread's id, assigning one on first call.
    /// `None` means every id in `[0, MAX_THREADS)` is already claimed.
    fn assign(&self) -> Option<usize>;
}

/// Lazy, monotonic, first-call-wins assignment, capped at
/// [`MAX_THREADS`]. Ids are never recycled: a thread that calls
/// `assign()` holds its id for the process's lifetime.
pub struct LazyThreadIdentity {
    next: AtomicUsize,
}

thread_local! {
    static THIS_THREAD_ID: Cell<Option<usize>> = Cell::new(None);
}

impl LazyThreadIdentity {
    pub fn new() -> Self {
        LazyThreadIdentity { next: AtomicUsize::new(0) }
    }
}

impl Default for LazyThreadIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadIdentity for LazyThreadIdentity {
    fn assign(&self) -> Option<usize> {
        THIS_THREAD_ID.with(|cell| {
            if let Some(id) = cell.get() {
                return Some(id);
            }
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id >= MAX_THREADS {
                return None;
            }
            cell.set(Some(id));
            Some(id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_is_stable_and_cached_per_thread() {
        let identity = LazyThreadIdentity::new();
        let a = identity.assign();
        let b = identity.assign();
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_threads_get_distinct_ids() {
        let identity = std::sync::Arc::new(LazyThreadIdentity::new());
        let i2 = identity.clone();
        let main_id = identity.assign().unwrap();
        let other_id = std::thread::spawn(move || i2.assign().unwrap()).join().unwrap();
        assert_ne!(main_id, other_id);
    }

    #[test]
    fn assignment_is_capped_at_max_threads() {
        let identity = std::sync::Arc::new(LazyThreadIdentity::new());
        identity.next.store(MAX_THREADS, Ordering::Relaxed);
        let i2 = identity.clone();
        let result = std::thread::spawn(move || i2.assign()).join().unwrap();
        assert_eq!(result, None, "MAX_THREADS-th id is refused, not silently handed out");
    }
}
