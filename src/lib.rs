//! Priority/group/ordering event scheduler for a data-plane packet
//! processing framework.
//!
//! Worker threads pull work items from many producer queues; the
//! scheduler multiplexes those queues onto the workers under priority,
//! synchronization-class (parallel/atomic/ordered), and group-membership
//! constraints, while also polling packet-input interfaces for newly
//! arrived packets.
//!
//! # Architecture
//!
//! - [`fabric`]: the priority lanes and their occupancy bitmasks.
//! - [`command`]: the scheduling token placed on a lane.
//! - [`queue`]: source queues and the substrate's event-source contract.
//! - [`pktio`]: packet-input polling integration.
//! - [`groups`]: named thread-eligibility masks.
//! - [`thread_id`]: per-thread identity assignment.
//! - [`context`]: per-thread cached events and atomic/ordered contexts.
//! - [`ordered`]: the per-lock-index ordered critical section primitive.
//! - [`dispatcher`]: `Scheduler`, the public entry point.
//!
//! # Example
//!
//! ```
//! use evsched::{Scheduler, Wait};
//! use evsched::event::{Event, SyncClass};
//! use evsched::groups::GROUP_ALL;
//! use evsched::queue::{MpmcQueue, QueueEntry};
//!
//! let _ = env_logger::try_init();
//!
//! let sched = Scheduler::new();
//! sched.init_local();
//!
//! let source = MpmcQueue::new();
//! let entry = QueueEntry::new(0, SyncClass::Parallel, GROUP_ALL, 0, source, sched.lanes_per_priority());
//! sched.attach(&entry).unwrap();
//! sched.enqueue(&entry, Event::new(42)).unwrap();
//!
//! let ev = sched.schedule_one(None, Wait::NoWait).expect("event was enqueued");
//! assert_eq!(ev.payload, 42);
//! ```

pub mod command;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod fabric;
pub mod groups;
pub mod ordered;
pub mod pktio;
pub mod queue;
pub mod thread_id;
pub mod thread_mask;
pub mod time;

pub use dispatcher::{Scheduler, Wait};
pub use error::{Error, Result};
pub use event::{Event, SyncClass};
pub use queue::{QueueEntry, QueueHandle};
pub use thread_mask::ThreadMask;
