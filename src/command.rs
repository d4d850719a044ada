//! Command tokens: the scheduling unit placed on a priority lane.
//!
//! Spec §4.2: "the command is the scheduling token: it is itself placed on
//! a lane, and its presence in the lane is what permits the lane's
//! underlying source to be visited." In the reference C implementation
//! this is a fixed-size struct in a pool-allocated buffer; here the
//! equivalent fixed-size, stable-discriminant representation is an enum
//! behind a cheaply-cloned `Arc`, so re-enqueueing a token is a pointer
//! copy rather than a fresh allocation.

use std::sync::Arc;

use crate::pktio::PktioEntry;
use crate::queue::QueueEntry;

/// One unit of schedulable work known to the fabric.
pub enum Command {
    /// Drain events from a source queue.
    Dequeue(Arc<QueueEntry>),
    /// Poll a packet-input port at a fixed priority.
    PollPktin(Arc<PktioEntry>),
}

/// A command placed on a lane. Presence on the lane is the permission to
/// visit the underlying source; re-enqueueing the same token is how a
/// source becomes visible for a future dispatch pass again.
pub type CommandToken = Arc<Command>;
