use std::collections::VecDeque;
use std::fs;
use std::io::Result;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::KernelRecord;
use crate::config::NUM_LABELS;

/// Pending-kernel store. Owns every admitted record for the lifetime of
/// the run; the queue itself only tracks which ones still await dispatch.
///
/// All traversal happens under the single queue lock, so a scan that
/// reaches the tail is atomic with respect to concurrent appends.
pub struct RecordStore {
    pending: Mutex<VecDeque<Arc<KernelRecord>>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends at the tail and hands back the shared record.
    pub fn append(&self, record: KernelRecord) -> Arc<KernelRecord> {
        let record = Arc::new(record);
        let mut pending = self.pending.lock().expect("pending queue poisoned");
        pending.push_back(Arc::clone(&record));
        record
    }

    /// Walks the queue from the head and removes the first record that
    /// fits the free slots and is not a duplicate of a running label.
    /// Head order is preserved for everything skipped.
    pub fn scan_and_remove_first_executable(
        &self,
        free_slots: u32,
        dup: &[u32; NUM_LABELS],
    ) -> Option<Arc<KernelRecord>> {
        let mut pending = self.pending.lock().expect("pending queue poisoned");
        let pos = pending
            .iter()
            .position(|r| r.cu <= free_slots && dup[r.label as usize] == 0)?;
        pending.remove(pos)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().expect("pending queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns everything still pending, so shutdown can
    /// account for records that never dispatched.
    pub fn drain(&self) -> Vec<Arc<KernelRecord>> {
        let mut pending = self.pending.lock().expect("pending queue poisoned");
        pending.drain(..).collect()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatch-ordered log of every kernel handed to the pool; flushed into
/// the packed report file at shutdown.
pub struct OutputLog {
    records: Mutex<Vec<Arc<KernelRecord>>>,
}

impl OutputLog {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, record: Arc<KernelRecord>) {
        self.records
            .lock()
            .expect("output log poisoned")
            .push(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("output log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch order of kernel ids so far.
    pub fn ids(&self) -> Vec<u32> {
        self.records
            .lock()
            .expect("output log poisoned")
            .iter()
            .map(|r| r.id)
            .collect()
    }

    /// Writes the packed report, one record per admitted kernel in
    /// definition (id) order.
    pub fn flush(&self, path: &Path) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .expect("output log poisoned")
            .clone();
        records.sort_by_key(|r| r.id);
        let mut buf = Vec::with_capacity(records.len() * super::ENCODED_RECORD_LEN);
        for record in records.iter() {
            record.encode_into(&mut buf);
        }
        fs::write(path, buf)
    }
}

impl Default for OutputLog {
    fn default() -> Self {
        Self::new()
    }
}
