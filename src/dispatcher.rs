//! The dispatcher: `schedule()` and its wrappers (spec §4.3), plus the
//! administration API (spec §4.8, §6) that sits on top of the fabric,
//! groups, and per-thread context.

use std::cell::RefCell;
use std::sync::Arc;

use crate::command::{Command, CommandToken};
use crate::config::MAX_DEQ;
use crate::context::{AtomicHold, OrderedHold, ThreadContext};
use crate::error::{Error, Result};
use crate::event::{Event, SyncClass};
use crate::fabric::PriorityFabric;
use crate::groups::{GroupId, Groups, GROUP_ALL};
use crate::pktio::PktioEntry;
use crate::queue::{DrainOutcome, QueueEntry, QueueHandle};
use crate::thread_id::{LazyThreadIdentity, ThreadIdentity};
use crate::thread_mask::ThreadMask;
use crate::time::{CycleCounter, StdCycleCounter};

thread_local! {
    static CONTEXT: RefCell<Option<ThreadContext>> = RefCell::new(None);
}

/// `wait` argument to `schedule_wait`/`schedule_one`/`schedule_multi`.
#[derive(Debug, Clone, Copy)]
pub enum Wait {
    /// Spin until an event is available.
    Forever,
    /// Try exactly once.
    NoWait,
    /// Spin until `cycles` worth of elapsed time has passed, as returned
    /// by [`Scheduler::wait_time`].
    Cycles(u64),
}

/// The scheduler: priority fabric, schedule groups, and the cycle-counter
/// substrate, bundled behind one explicit handle per the single
/// shared-region-at-init-time design in spec §9.
pub struct Scheduler {
    fabric: PriorityFabric,
    groups: Groups,
    cycles: Box<dyn CycleCounter>,
    identity: Box<dyn ThreadIdentity>,
}

impl Scheduler {
    /// `init_global()`.
    pub fn new() -> Self {
        Scheduler::with_substrate(Box::new(StdCycleCounter::new()), Box::new(LazyThreadIdentity::new()))
    }

    pub fn with_cycle_counter(cycles: Box<dyn CycleCounter>) -> Self {
        Scheduler::with_substrate(cycles, Box::new(LazyThreadIdentity::new()))
    }

    pub fn with_substrate(cycles: Box<dyn CycleCounter>, identity: Box<dyn ThreadIdentity>) -> Self {
        Scheduler { fabric: PriorityFabric::new(), groups: Groups::new(), cycles, identity }
    }

    pub fn num_prio(&self) -> usize {
        self.fabric.num_priorities()
    }

    pub fn lanes_per_priority(&self) -> usize {
        self.fabric.lanes_per_priority()
    }

    pub fn wait_time(&self, ns: u64) -> u64 {
        self.cycles.ns_to_cycles(ns)
    }

    // ---- per-thread lifecycle -------------------------------------------------

    /// `init_local()`.
    pub fn init_local(&self) {
        CONTEXT.with(|cell| *cell.borrow_mut() = Some(ThreadContext::new()));
    }

    /// `term_local()`. Errors if the thread still holds cached events or a
    /// context (spec §3, §7).
    pub fn term_local(&self) -> Result<()> {
        CONTEXT.with(|cell| {
            let mut slot = cell.borrow_mut();
            if let Some(ctx) = slot.as_ref() {
                ctx.check_can_terminate()?;
            }
            *slot = None;
            Ok(())
        })
    }

    // ---- administration ---------------------------------------------------

    /// `attach(queue_entry)`: assign the queue its command token and make
    /// it visible to the dispatcher. Fails if the fabric's command-token
    /// pool (`NUM_SCHED_CMD`) is exhausted.
    pub fn attach(&self, entry: &Arc<QueueEntry>) -> Result<()> {
        self.fabric.attach(entry.priority, entry.lane)?;
        let token: CommandToken = Arc::new(Command::Dequeue(entry.clone()));
        entry.token.call_once(|| token.clone());
        self.fabric.push(entry.priority, entry.lane, token);
        log::info!(
            "attach queue={:?} priority={} lane={}",
            entry.handle, entry.priority, entry.lane
        );
        Ok(())
    }

    /// `detach(queue)`: decrement the lane refcount and stop advertising
    /// the queue. Callers must quiesce dispatch of `entry` first — a
    /// token already in flight on a lane is not forcibly recalled, the
    /// same assumption the reference scheduler makes.
    ///
    /// Errors rather than underflowing the fabric's refcount if `entry`
    /// was never attached, was already detached once, or was destroyed
    /// concurrently.
    pub fn detach(&self, entry: &QueueEntry) -> Result<()> {
        if entry.token.get().is_none() || !entry.is_live() {
            return Err(Error::InvalidHandle);
        }
        if !entry.mark_detached() {
            return Err(Error::InvalidHandle);
        }
        self.fabric.detach(entry.priority, entry.lane);
        log::info!("detach queue={:?}", entry.handle);
        Ok(())
    }

    /// Producer-side re-admission (spec §4.8): call after pushing an
    /// event into a queue that was observed empty immediately beforehand.
    pub fn reschedule(&self, entry: &Arc<QueueEntry>) -> Result<()> {
        let token = entry.token.get().cloned().ok_or(Error::InvalidHandle)?;
        self.fabric.push(entry.priority, entry.lane, token);
        CONTEXT.with(|cell| {
            if let Some(ctx) = cell.borrow_mut().as_mut() {
                ctx.note_enqueue_called();
            }
        });
        Ok(())
    }

    /// Convenience wrapper used by producers: pushes `ev` into `entry`'s
    /// source and calls [`Scheduler::reschedule`] iff the queue was empty
    /// before the push.
    pub fn enqueue(&self, entry: &Arc<QueueEntry>, ev: Event) -> Result<()> {
        match entry.source.enqueue(ev) {
            None => Err(Error::InvalidHandle),
            Some(true) => self.reschedule(entry),
            Some(false) => Ok(()),
        }
    }

    /// `pktio_start(pktio, prio)`.
    pub fn pktio_start(&self, pktio: &Arc<PktioEntry>) -> Result<()> {
        self.fabric.attach(pktio.priority, pktio.lane)?;
        let token: CommandToken = Arc::new(Command::PollPktin(pktio.clone()));
        self.fabric.push(pktio.priority, pktio.lane, token);
        log::info!("pktio_start pktio={:?} priority={}", pktio.handle, pktio.priority);
        Ok(())
    }

    // ---- schedule groups ----------------------------------------------------

    pub fn group_create(&self, name: &str, mask: ThreadMask) -> Result<GroupId> {
        let id = self.groups.create(name, mask)?;
        log::info!("group_create name={name} id={id}");
        Ok(id)
    }

    pub fn group_destroy(&self, id: GroupId) -> Result<()> {
        let name = self.groups.name(id);
        self.groups.destroy(id)?;
        log::info!("group_destroy id={id} name={name:?}");
        Ok(())
    }

    pub fn group_lookup(&self, name: &str) -> GroupId {
        self.groups.lookup(name)
    }

    pub fn group_join(&self, id: GroupId, mask: ThreadMask) -> Result<()> {
        self.groups.join(id, mask)
    }

    pub fn group_leave(&self, id: GroupId, mask: ThreadMask) -> Result<()> {
        self.groups.leave(id, mask)
    }

    pub fn group_thrmask(&self, id: GroupId) -> Result<ThreadMask> {
        self.groups.thrmask(id)
    }

    // ---- pause / context release -------------------------------------------

    pub fn schedule_pause(&self) {
        CONTEXT.with(|cell| {
            if let Some(ctx) = cell.borrow_mut().as_mut() {
                ctx.pause = true;
            }
        });
    }

    pub fn schedule_resume(&self) {
        CONTEXT.with(|cell| {
            if let Some(ctx) = cell.borrow_mut().as_mut() {
                ctx.pause = false;
            }
        });
    }

    /// No-op in this implementation, matching the reference scheduler
    /// (see SPEC_FULL.md §2.4): there is no separate prefetch buffer to
    /// populate ahead of `schedule()`.
    pub fn schedule_prefetch(&self, _num: usize) {}

    pub fn release_atomic(&self) {
        CONTEXT.with(|cell| {
            if let Some(ctx) = cell.borrow_mut().as_mut() {
                ctx.release_atomic(&self.fabric);
            }
        });
    }

    pub fn release_ordered(&self) {
        CONTEXT.with(|cell| {
            if let Some(ctx) = cell.borrow_mut().as_mut() {
                ctx.release_ordered();
            }
        });
    }

    pub fn release_context(&self) {
        CONTEXT.with(|cell| {
            if let Some(ctx) = cell.borrow_mut().as_mut() {
                ctx.release_context(&self.fabric);
            }
        });
    }

    pub fn order_lock(&self, index: usize) {
        CONTEXT.with(|cell| {
            if let Some(ctx) = cell.borrow().as_ref() {
                ctx.order_lock(index);
            }
        });
    }

    /// `get_sched_order`: see [`crate::context::ThreadContext::current_order`].
    pub fn current_order(&self) -> Option<(Arc<QueueEntry>, u64)> {
        CONTEXT.with(|cell| {
            cell.borrow_mut().as_mut().and_then(|ctx| ctx.current_order())
        })
    }

    pub fn order_unlock(&self, index: usize) {
        CONTEXT.with(|cell| {
            if let Some(ctx) = cell.borrow().as_ref() {
                ctx.order_unlock(index);
            }
        });
    }

    // ---- dispatch -----------------------------------------------------------

    fn copy_events(ctx: &mut ThreadContext, out: &mut [Event], max_num: usize) -> usize {
        let n = max_num.min(out.len()).min(ctx.local_num);
        for slot in out.iter_mut().take(n) {
            *slot = ctx.local_events[ctx.local_index];
            ctx.local_index += 1;
            ctx.local_num -= 1;
        }
        n
    }

    /// `schedule(out_src?, out_events[], max_num, max_deq)` (spec §4.3).
    pub fn schedule(
        &self,
        out_src: Option<&mut QueueHandle>,
        out_events: &mut [Event],
        max_num: usize,
        max_deq: usize,
    ) -> usize {
        CONTEXT.with(|cell| {
            let mut slot = cell.borrow_mut();
            let ctx = slot
                .as_mut()
                .expect("schedule() called without a prior init_local()");

            log::debug!("schedule: thread flags={:?}", ctx.flags());

            // 1. Serve cached events without touching context state.
            if ctx.local_num > 0 {
                let n = Self::copy_events(ctx, out_events, max_num);
                if let Some(src) = out_src {
                    if let Some(q) = &ctx.local_src_queue {
                        *src = q.handle;
                    }
                }
                return n;
            }

            // 2. Release whatever context carried over from a prior call.
            ctx.release_context(&self.fabric);

            // 3. Paused threads never receive new work.
            if ctx.pause {
                return 0;
            }

            // 4. Thread identity, used for lane rotation and group checks.
            let Some(thr) = self.identity.assign() else {
                log::error!("schedule: thread-id space exhausted (MAX_THREADS)");
                return 0;
            };

            // 5. Priority/lane walk.
            let num_priorities = self.fabric.num_priorities();
            let lanes = self.fabric.lanes_per_priority();

            for p in 0..num_priorities {
                if self.fabric.mask(p) == 0 {
                    continue;
                }

                let start = thr % lanes;
                for j in 0..lanes {
                    let id = (start + j) % lanes;
                    if !self.fabric.lane_bit_set(p, id) {
                        continue;
                    }

                    let Some(token) = self.fabric.pop(p, id) else {
                        continue;
                    };

                    match &*token {
                        Command::PollPktin(pe) => {
                            if pe.driver.poll() {
                                self.fabric.detach(p, id);
                                log::info!("pktio {:?} retired", pe.handle);
                            } else {
                                self.fabric.push(p, id, token.clone());
                            }
                            continue;
                        }
                        Command::Dequeue(qe) => {
                            if qe.group > GROUP_ALL && !self.groups.is_eligible(qe.group, thr) {
                                self.fabric.push(p, id, token.clone());
                                continue;
                            }

                            let effective_max_deq = if qe.sync_class == SyncClass::Ordered {
                                1
                            } else {
                                max_deq.min(MAX_DEQ)
                            };

                            match qe.source.dequeue_multi(&mut ctx.local_events, effective_max_deq) {
                                DrainOutcome::Destroyed => {
                                    qe.mark_destroyed();
                                    qe.source.finalize();
                                    log::warn!("queue {:?} destroyed concurrently", qe.handle);
                                    continue;
                                }
                                DrainOutcome::Empty => {
                                    // Not re-enqueued; the producer side
                                    // re-admits it via `reschedule`.
                                    continue;
                                }
                                DrainOutcome::Filled(num) => {
                                    ctx.local_num = num;
                                    ctx.local_index = 0;
                                    ctx.local_src_queue = Some(qe.clone());

                                    match qe.sync_class {
                                        SyncClass::Ordered => {
                                            self.fabric.push(p, id, token.clone());
                                            let first = ctx.local_events[0];
                                            ctx.ordered = Some(OrderedHold {
                                                origin: qe.clone(),
                                                order: first.order.unwrap_or(0),
                                                sync: first.sync,
                                                enq_called: false,
                                            });
                                        }
                                        SyncClass::Atomic => {
                                            ctx.atomic = Some(AtomicHold {
                                                priority: p,
                                                lane: id,
                                                token: token.clone(),
                                            });
                                        }
                                        SyncClass::Parallel => {
                                            self.fabric.push(p, id, token.clone());
                                        }
                                    }

                                    let n = Self::copy_events(ctx, out_events, max_num);
                                    if let Some(src) = out_src {
                                        *src = qe.handle;
                                    }
                                    return n;
                                }
                            }
                        }
                    }
                }
            }

            0
        })
    }

    /// `schedule_wait(out_src?, wait, out_events[], max_num)`.
    pub fn schedule_wait(
        &self,
        mut out_src: Option<&mut QueueHandle>,
        wait: Wait,
        out_events: &mut [Event],
        max_num: usize,
    ) -> usize {
        let mut start_cycle: Option<u64> = None;
        loop {
            let passed = out_src.as_mut().map(|r| &mut **r);
            let n = self.schedule(passed, out_events, max_num, MAX_DEQ);
            if n > 0 {
                return n;
            }

            match wait {
                Wait::Forever => continue,
                Wait::NoWait => return 0,
                Wait::Cycles(budget) => {
                    let now = self.cycles.now_cycles();
                    match start_cycle {
                        None => start_cycle = Some(now),
                        Some(start) => {
                            if self.cycles.diff_cycles(start, now) > budget {
                                return 0;
                            }
                        }
                    }
                }
            }
        }
    }

    /// `schedule_one(&out_src, wait) -> event`.
    pub fn schedule_one(&self, out_src: Option<&mut QueueHandle>, wait: Wait) -> Option<Event> {
        let mut buf = [Event::default(); 1];
        let n = self.schedule_wait(out_src, wait, &mut buf, 1);
        if n > 0 {
            Some(buf[0])
        } else {
            None
        }
    }

    /// `schedule_multi(&out_src, wait, out[], n) -> count`.
    pub fn schedule_multi(
        &self,
        out_src: Option<&mut QueueHandle>,
        wait: Wait,
        out: &mut [Event],
    ) -> usize {
        let n = out.len();
        self.schedule_wait(out_src, wait, out, n)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MpmcQueue;

    #[test]
    fn schedule_returns_nothing_with_no_attached_sources() {
        let sched = Scheduler::new();
        sched.init_local();
        let mut out = [Event::default(); 4];
        assert_eq!(sched.schedule(None, &mut out, 4, MAX_DEQ), 0);
    }

    proptest::proptest! {
        /// Invariant 4 (spec.md §8): a call returning `n` events leaves
        /// `local_num` such that `local_num + n` equals the total drained,
        /// and `local_num` never goes negative (it's a `usize`, so this
        /// also just confirms `copy_events` never underflows).
        #[test]
        fn copy_events_conserves_the_drained_total(drained in 1usize..MAX_DEQ, max_num in 1usize..8) {
            let mut ctx = ThreadContext::new();
            ctx.local_num = drained;
            ctx.local_index = 0;
            for i in 0..drained {
                ctx.local_events[i] = Event::new(i as u64);
            }

            let mut out = vec![Event::default(); max_num];
            let n = Scheduler::copy_events(&mut ctx, &mut out, max_num);
            proptest::prop_assert_eq!(n + ctx.local_num, drained);
        }
    }

    #[test]
    fn attach_makes_a_parallel_queue_visible_exactly_once_per_event() {
        let sched = Scheduler::new();
        sched.init_local();

        let source: Arc<dyn crate::queue::EventSource> = MpmcQueue::new();
        source.enqueue(Event::new(1)).unwrap();
        let entry = QueueEntry::new(0, SyncClass::Parallel, GROUP_ALL, 0, source, sched.lanes_per_priority());
        sched.attach(&entry).unwrap();

        let mut out = [Event::default(); 1];
        assert_eq!(sched.schedule(None, &mut out, 1, 1), 1);
        assert_eq!(out[0].payload, 1);
        assert_eq!(sched.schedule(None, &mut out, 1, 1), 0, "no second event queued");
    }
}
