//! Scenario 4 (spec.md §8): events of one ordered flow, dispatched to
//! distinct threads, still enter `order_lock(0)` in their assigned
//! sequence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};

use evsched::event::{Event, SyncClass};
use evsched::groups::GROUP_ALL;
use evsched::queue::{EventSource, MpmcQueue, QueueEntry};
use evsched::Scheduler;

#[test]
fn three_threads_enter_the_critical_section_in_assigned_order() {
    let sched = Arc::new(Scheduler::new());

    let source: Arc<dyn EventSource> = MpmcQueue::new();
    for i in 0..3u64 {
        source.enqueue(Event::ordered(i, i, [i, 0]));
    }
    let entry = QueueEntry::new(0, SyncClass::Ordered, GROUP_ALL, 1, source, sched.lanes_per_priority());
    sched.init_local();
    sched.attach(&entry).unwrap();

    let entry_order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let barrier = Arc::new(Barrier::new(3));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let sched = sched.clone();
            let entry_order = entry_order.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                sched.init_local();
                let mut out = [Event::default(); 1];
                // Each worker competes for one of the three ordered
                // events; forced `max_deq == 1` guarantees a 1:1 mapping.
                let n = sched.schedule(None, &mut out, 1, 1);
                assert_eq!(n, 1);
                let ev = out[0];

                barrier.wait();
                sched.order_lock(0);
                entry_order.lock().unwrap().push(ev.payload);
                sched.order_unlock(0);
                sched.release_ordered();
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(*entry_order.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(entry.sync_out(0), 3);
}
