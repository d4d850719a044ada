//! Packet-input polling integration (spec §4.7).

use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identity of a packet-input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PktioHandle(pub u64);

static NEXT_PKTIO_HANDLE: AtomicU64 = AtomicU64::new(1);

impl PktioHandle {
    pub fn new() -> Self {
        PktioHandle(NEXT_PKTIO_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for PktioHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Substrate primitive: the packet-I/O driver layer (out of scope per
/// spec §1; the scheduler only calls `poll`).
pub trait PacketDriver: Send + Sync {
    /// Poll the port once. Returns `true` ("retire") when the port should
    /// stop being scheduled — e.g. the driver reports the link is down.
    /// Packets the driver receives are pushed by the driver itself into
    /// the appropriate source queues; they are not returned here.
    fn poll(&self) -> bool;
}

/// Fabric-side bookkeeping for a polled packet-input port.
pub struct PktioEntry {
    pub handle: PktioHandle,
    pub priority: usize,
    pub(crate) lane: usize,
    pub(crate) driver: std::sync::Arc<dyn PacketDriver>,
}

impl PktioEntry {
    pub fn new(
        priority: usize,
        driver: std::sync::Arc<dyn PacketDriver>,
        lanes_per_priority: usize,
    ) -> std::sync::Arc<Self> {
        let handle = PktioHandle::new();
        let lane = (handle.0 as usize) % lanes_per_priority;
        std::sync::Arc::new(PktioEntry { handle, priority, lane, driver })
    }
}
