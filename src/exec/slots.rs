use std::sync::{Arc, Mutex, MutexGuard};

use arrayvec::ArrayVec;

use crate::config::NUM_SLOTS;
use crate::error::{Result, RuntimeError};
use crate::record::KernelRecord;

/// Occupancy table for the hardware slots. The scheduler's `free_slots`
/// counter guarantees capacity before `allocate` is called, so failing to
/// find enough free bits here is an invariant violation, not contention.
pub struct SlotTable {
    in_use: Mutex<[bool; NUM_SLOTS]>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self {
            in_use: Mutex::new([false; NUM_SLOTS]),
        }
    }

    /// Marks the first `cu` free slots busy, low index first, and returns
    /// their bitmask.
    pub fn allocate(&self, cu: u32) -> Result<u32> {
        let mut in_use = self.in_use.lock().expect("slot table poisoned");
        let picked: ArrayVec<usize, NUM_SLOTS> = in_use
            .iter()
            .enumerate()
            .filter(|(_, busy)| !**busy)
            .map(|(s, _)| s)
            .take(cu as usize)
            .collect();
        if picked.len() < cu as usize {
            return Err(RuntimeError::invariant(
                "SCHED",
                format!("{} free slots short of cu={}", picked.len(), cu),
            ));
        }
        let mut mask = 0;
        for s in picked {
            in_use[s] = true;
            mask |= 1 << s;
        }
        Ok(mask)
    }

    /// Clears every bit of `mask`.
    pub fn release(&self, mask: u32) {
        let mut in_use = self.in_use.lock().expect("slot table poisoned");
        for (s, busy) in in_use.iter_mut().enumerate() {
            if mask & (1 << s) != 0 {
                *busy = false;
            }
        }
    }

    /// Bitmask of currently occupied slots.
    pub fn occupied_mask(&self) -> u32 {
        let in_use = self.in_use.lock().expect("slot table poisoned");
        in_use
            .iter()
            .enumerate()
            .filter(|(_, busy)| **busy)
            .fold(0, |mask, (s, _)| mask | 1 << s)
    }
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-slot lists of the kernels currently attributed to each slot.
/// Workers register before starting the execution clock; the monitor
/// drains each list under its lock when it closes a window and re-enqueues
/// whatever is still live.
pub struct SlotLiveLists {
    lists: [Mutex<Vec<Arc<KernelRecord>>>; NUM_SLOTS],
}

impl SlotLiveLists {
    pub fn new() -> Self {
        Self {
            lists: std::array::from_fn(|_| Mutex::new(Vec::new())),
        }
    }

    /// Enqueues the record on every slot of `mask`.
    pub fn register(&self, mask: u32, record: &Arc<KernelRecord>) {
        for (s, list) in self.lists.iter().enumerate() {
            if mask & (1 << s) != 0 {
                list.lock()
                    .expect("slot live list poisoned")
                    .push(Arc::clone(record));
            }
        }
    }

    pub fn lock_slot(&self, slot: usize) -> MutexGuard<'_, Vec<Arc<KernelRecord>>> {
        self.lists[slot].lock().expect("slot live list poisoned")
    }
}

impl Default for SlotLiveLists {
    fn default() -> Self {
        Self::new()
    }
}
