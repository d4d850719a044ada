//! Scenario 3 (spec.md §8): an atomic queue's command token is held by at
//! most one thread at a time.

use std::sync::Arc;

use evsched::event::{Event, SyncClass};
use evsched::groups::GROUP_ALL;
use evsched::queue::{EventSource, MpmcQueue, QueueEntry};
use evsched::Scheduler;

#[test]
fn second_thread_sees_nothing_until_the_first_releases() {
    let sched = Arc::new(Scheduler::new());

    let source: Arc<dyn EventSource> = MpmcQueue::new();
    source.enqueue(Event::new(1));
    source.enqueue(Event::new(2));
    let entry = QueueEntry::new(0, SyncClass::Atomic, GROUP_ALL, 0, source, sched.lanes_per_priority());

    sched.init_local();
    sched.attach(&entry).unwrap();

    let mut out = [Event::default(); 1];
    let n = sched.schedule(None, &mut out, 1, 1);
    assert_eq!(n, 1, "T1 takes the atomic token");

    let sched2 = sched.clone();
    let handle = std::thread::spawn(move || {
        sched2.init_local();
        let mut out = [Event::default(); 10];
        sched2.schedule(None, &mut out, 10, 10)
    });
    assert_eq!(handle.join().unwrap(), 0, "T2 finds the token absent");

    // T1 releases with an empty local cache (it drained its one event).
    sched.release_atomic();

    let sched3 = sched.clone();
    let handle = std::thread::spawn(move || {
        sched3.init_local();
        let mut out = [Event::default(); 10];
        let mut src = evsched::queue::QueueHandle::default();
        sched3.schedule(Some(&mut src), &mut out, 10, 10)
    });
    assert_eq!(handle.join().unwrap(), 1, "T2 retries successfully");
}
