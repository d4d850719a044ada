//! Crate-local error taxonomy.
//!
//! Mirrors the error policy of spec §7: resource exhaustion and API misuse
//! are `Result::Err`, concurrent destruction is handled internally by the
//! dispatcher, and true invariant violations are fatal and never wrapped in
//! a `Result` at all (see [`fatal`]).

use core::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Recoverable scheduler errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No command-token slot was available (pool exhausted).
    ResourceExhausted,
    /// A group, queue, or pktio handle did not resolve to a live entry.
    InvalidHandle,
    /// `group_create` found no free named slot.
    NoFreeGroupSlot,
    /// `group_create` was called with a name already held by a live group.
    AlreadyExists,
    /// `group_lookup` found no group with that name.
    NotFound,
    /// `term_local` was called while the thread still holds cached events
    /// or an atomic/ordered context.
    ContextHeld,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::ResourceExhausted => "command token pool exhausted",
            Error::InvalidHandle => "invalid handle",
            Error::NoFreeGroupSlot => "no free schedule group slot",
            Error::AlreadyExists => "a group with that name already exists",
            Error::NotFound => "not found",
            Error::ContextHeld => "thread still holds cached events or a context",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

/// Abort the process after logging `msg` at `error` level.
///
/// Spec §7 classifies re-enqueue failure and `order_unlock` misuse as
/// invariant violations that "terminate the process with a diagnostic".
/// Unlike `Error`, callers cannot catch this: by construction the
/// conditions under which it fires should be unreachable given the
/// capacity guarantees of [`crate::config::NUM_SCHED_CMD`].
#[cold]
#[inline(never)]
pub fn fatal(msg: &str) -> ! {
    log::error!("fatal scheduler invariant violation: {msg}");
    panic!("evsched: {msg}");
}
