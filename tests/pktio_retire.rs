//! Scenario 6 (spec.md §8): a pktio port that reports "retire" on its
//! first poll stops being visited on subsequent scheduler passes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use evsched::dispatcher::Wait;
use evsched::event::Event;
use evsched::pktio::{PacketDriver, PktioEntry};
use evsched::Scheduler;

struct RetireOnFirstPoll {
    polls: AtomicUsize,
}

impl PacketDriver for RetireOnFirstPoll {
    fn poll(&self) -> bool {
        self.polls.fetch_add(1, Ordering::Relaxed) == 0
    }
}

#[test]
fn retiring_driver_is_polled_once_then_never_again() {
    let sched = Scheduler::new();
    sched.init_local();

    let driver = Arc::new(RetireOnFirstPoll { polls: AtomicUsize::new(0) });
    let pktio = PktioEntry::new(0, driver.clone(), sched.lanes_per_priority());
    sched.pktio_start(&pktio).unwrap();

    // First pass: the command is a pktio poll, not a drainable event, so
    // it never surfaces as a returned event — it retires silently.
    let mut out = [Event::default(); 1];
    assert_eq!(sched.schedule(None, &mut out, 1, 1), 0);
    assert_eq!(driver.polls.load(Ordering::Relaxed), 1);

    // Second pass: nothing left on the fabric for this port.
    assert!(sched.schedule_one(None, Wait::NoWait).is_none());
    assert_eq!(driver.polls.load(Ordering::Relaxed), 1, "retired port is not polled again");
}
