//! Schedule groups (spec §4.6).

use hashbrown::HashMap;
use heapless::String as GroupName;
use spin::Mutex;

use crate::config::{GROUP_NAME_LEN, NUM_GROUPS, NUM_WELL_KNOWN_GROUPS};
use crate::error::{Error, Result};
use crate::thread_mask::ThreadMask;

/// Index into the group table.
pub type GroupId = usize;

/// Well-known group eligible for every event regardless of `group` tag
/// (spec §4.3 step 5: "if `qe.group > ALL`" — `ALL` never gates).
pub const GROUP_ALL: GroupId = 0;
/// Conventional group for data-plane worker threads.
pub const GROUP_WORKER: GroupId = 1;
/// Conventional group for control-plane threads.
pub const GROUP_CONTROL: GroupId = 2;

/// Sentinel returned by `create`/`lookup` on failure.
pub const GROUP_INVALID: GroupId = usize::MAX;

struct GroupSlot {
    /// Empty name marks the slot free. Well-known slots keep a fixed
    /// diagnostic label but are never matched by `lookup` (spec §4.6:
    /// "indices 0..W-1 ... not addressable by name"). A fixed-capacity
    /// string avoids a heap allocation per group, matching how the
    /// teacher stores short fixed-length labels (`sysinfo_lib`'s
    /// `heapless::String` fields).
    name: GroupName<GROUP_NAME_LEN>,
    mask: ThreadMask,
}

impl GroupSlot {
    fn empty() -> Self {
        GroupSlot { name: GroupName::new(), mask: ThreadMask::zero() }
    }

    fn is_free(&self) -> bool {
        self.name.is_empty()
    }

    fn name_str(&self) -> &str {
        &self.name
    }
}

/// State protected by the single group spinlock: the slot table plus a
/// name index, kept consistent under one lock rather than two so
/// `create`/`destroy`/`lookup` stay atomic with respect to each other.
struct GroupTable {
    slots: Vec<GroupSlot>,
    /// Accelerates `lookup` past the reference implementation's linear
    /// scan — the slot table remains the source of truth, this is purely
    /// an index over it.
    by_name: HashMap<String, GroupId>,
}

/// The group table, guarded by one spinlock matching spec §3/§4.6.
pub struct Groups {
    table: Mutex<GroupTable>,
}

impl Groups {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(NUM_GROUPS);
        for _ in 0..NUM_GROUPS {
            slots.push(GroupSlot::empty());
        }
        slots[GROUP_ALL].mask = ThreadMask::set_all();
        slots[GROUP_WORKER].mask = ThreadMask::set_all();
        slots[GROUP_CONTROL].mask = ThreadMask::zero();
        // Well-known slots carry a fixed diagnostic label (spec §4.6
        // supplement), but are never indexed in `by_name` — `lookup`
        // must keep reporting them as not addressable by name.
        let _ = slots[GROUP_ALL].name.push_str("all");
        let _ = slots[GROUP_WORKER].name.push_str("worker");
        let _ = slots[GROUP_CONTROL].name.push_str("control");
        Groups { table: Mutex::new(GroupTable { slots, by_name: HashMap::new() }) }
    }

    pub fn create(&self, name: &str, mask: ThreadMask) -> Result<GroupId> {
        if name.is_empty() {
            // An empty name would be indistinguishable from a free slot.
            return Err(Error::InvalidHandle);
        }
        // Truncate to the slot's fixed capacity rather than reject the
        // call; matches spec §4.6's "first N-1 bytes" rule.
        let n = name.len().min(GROUP_NAME_LEN - 1);
        let mut truncated = GroupName::new();
        let _ = truncated.push_str(&name[..n]);

        let mut table = self.table.lock();
        if table.by_name.contains_key(truncated.as_str()) {
            return Err(Error::AlreadyExists);
        }
        for id in NUM_WELL_KNOWN_GROUPS..NUM_GROUPS {
            if table.slots[id].is_free() {
                table.by_name.insert(truncated.as_str().to_string(), id);
                table.slots[id].name = truncated;
                table.slots[id].mask = mask;
                return Ok(id);
            }
        }
        Err(Error::NoFreeGroupSlot)
    }

    /// Diagnostic label for `id`, including the well-known groups' fixed
    /// names (`lookup` never matches those; this is read-only diagnostics).
    pub fn name(&self, id: GroupId) -> Option<String> {
        let table = self.table.lock();
        if id >= NUM_GROUPS || (id >= NUM_WELL_KNOWN_GROUPS && table.slots[id].is_free()) {
            return None;
        }
        Some(table.slots[id].name_str().to_string())
    }

    pub fn destroy(&self, id: GroupId) -> Result<()> {
        let mut table = self.table.lock();
        if id < NUM_WELL_KNOWN_GROUPS || id >= NUM_GROUPS || table.slots[id].is_free() {
            return Err(Error::InvalidHandle);
        }
        let name = table.slots[id].name_str().to_string();
        table.slots[id] = GroupSlot::empty();
        table.by_name.remove(&name);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> GroupId {
        let table = self.table.lock();
        table.by_name.get(name).copied().unwrap_or(GROUP_INVALID)
    }

    pub fn join(&self, id: GroupId, mask: ThreadMask) -> Result<()> {
        let mut table = self.table.lock();
        if id >= NUM_GROUPS || (id >= NUM_WELL_KNOWN_GROUPS && table.slots[id].is_free()) {
            return Err(Error::InvalidHandle);
        }
        table.slots[id].mask = table.slots[id].mask.or(mask);
        Ok(())
    }

    pub fn leave(&self, id: GroupId, mask: ThreadMask) -> Result<()> {
        let mut table = self.table.lock();
        if id >= NUM_GROUPS || (id >= NUM_WELL_KNOWN_GROUPS && table.slots[id].is_free()) {
            return Err(Error::InvalidHandle);
        }
        // Expressed via xor-against-all then intersection, matching spec
        // §4.6 so a substrate only exposing standard set ops suffices.
        let leave_mask = mask.xor(ThreadMask::set_all());
        table.slots[id].mask = table.slots[id].mask.and(leave_mask);
        Ok(())
    }

    pub fn thrmask(&self, id: GroupId) -> Result<ThreadMask> {
        let table = self.table.lock();
        if id >= NUM_GROUPS || (id >= NUM_WELL_KNOWN_GROUPS && table.slots[id].is_free()) {
            return Err(Error::InvalidHandle);
        }
        Ok(table.slots[id].mask)
    }

    /// Group-eligibility check used by the dispatcher's hot path.
    pub fn is_eligible(&self, id: GroupId, thread: usize) -> bool {
        if id <= GROUP_ALL {
            return true;
        }
        let table = self.table.lock();
        id < NUM_GROUPS && table.slots[id].mask.test(thread)
    }
}

impl Default for Groups {
    fn default() -> Self {
        Self::new()
    }
}
