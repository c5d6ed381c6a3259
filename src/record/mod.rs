#[cfg(test)]
mod test;

pub mod store;

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use crate::ffi::deref_offset;

/// "Far future" timestamp. Records start with every measured field at the
/// sentinel so an unset record compares as not-yet-running and
/// not-yet-finished under the windowing predicate, and two unset fields
/// compare equal.
pub const TIME_SENTINEL: i64 = i64::MAX;

/// Splits a monotonic nanosecond count into the `(sec, nsec)` pair used
/// by the on-disk and on-wire encodings. The sentinel maps to the maximal
/// pair so external consumers also see "far future".
pub fn split_timestamp(ns: i64) -> (i64, i64) {
    if ns == TIME_SENTINEL {
        (i64::MAX, i64::MAX)
    } else {
        (ns / 1_000_000_000, ns % 1_000_000_000)
    }
}

fn join_timestamp(sec: i64, nsec: i64) -> i64 {
    if sec == i64::MAX && nsec == i64::MAX {
        TIME_SENTINEL
    } else {
        sec * 1_000_000_000 + nsec
    }
}

/// One admitted kernel. Created by the producer, owned by the record
/// store for the whole run; the scheduler, the executing worker and the
/// per-slot live lists share it by `Arc`, so its address never changes
/// and nothing dangles.
///
/// The measured fields are written by the executing worker and read by
/// the monitoring thread; they use Release/Acquire atomics rather than a
/// per-record lock.
#[derive(Debug)]
pub struct KernelRecord {
    /// Dense, monotonically increasing within the run.
    pub id: u32,
    /// Kernel kind, in `[0, NUM_LABELS)`.
    pub label: u32,
    /// Accelerator invocations bundled into this record.
    pub executions: u32,
    /// Slot width occupied while dispatched.
    pub cu: u32,
    /// Inter-arrival delay relative to the previous record.
    pub intended_arrival_ms: f32,
    /// Absolute monotonic instant the producer targeted.
    pub commanded_arrival: i64,

    measured_arrival: AtomicI64,
    measured_finish: AtomicI64,
    measured_pre_exec: AtomicI64,
    measured_post_exec: AtomicI64,

    /// One bit per occupied slot; set at dispatch and kept for the final
    /// report (slot occupancy itself is released through the slot table).
    slot_mask: AtomicU32,
}

impl KernelRecord {
    pub fn new(
        id: u32,
        label: u32,
        executions: u32,
        cu: u32,
        intended_arrival_ms: f32,
        commanded_arrival: i64,
    ) -> Self {
        Self {
            id,
            label,
            executions,
            cu,
            intended_arrival_ms,
            commanded_arrival,
            measured_arrival: AtomicI64::new(TIME_SENTINEL),
            measured_finish: AtomicI64::new(TIME_SENTINEL),
            measured_pre_exec: AtomicI64::new(TIME_SENTINEL),
            measured_post_exec: AtomicI64::new(TIME_SENTINEL),
            slot_mask: AtomicU32::new(0),
        }
    }

    pub fn arrival(&self) -> i64 {
        self.measured_arrival.load(Ordering::Acquire)
    }

    pub fn finish(&self) -> i64 {
        self.measured_finish.load(Ordering::Acquire)
    }

    pub fn store_arrival(&self, ns: i64) {
        self.measured_arrival.store(ns, Ordering::Release);
    }

    pub fn store_finish(&self, ns: i64) {
        self.measured_finish.store(ns, Ordering::Release);
    }

    pub fn store_pre_exec(&self, ns: i64) {
        self.measured_pre_exec.store(ns, Ordering::Release);
    }

    pub fn store_post_exec(&self, ns: i64) {
        self.measured_post_exec.store(ns, Ordering::Release);
    }

    pub fn slot_mask(&self) -> u32 {
        self.slot_mask.load(Ordering::Acquire)
    }

    pub fn set_slot_mask(&self, mask: u32) {
        self.slot_mask.store(mask, Ordering::Release);
    }
}

/// Bytes per record in `kernels_info.bin`: five 32-bit words, five
/// timestamp pairs, one mask word.
pub const ENCODED_RECORD_LEN: usize = 5 * 4 + 5 * 16 + 4;

impl KernelRecord {
    /// Appends the packed little-endian encoding, field for field in
    /// definition order.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.label.to_le_bytes());
        buf.extend_from_slice(&self.executions.to_le_bytes());
        buf.extend_from_slice(&self.cu.to_le_bytes());
        buf.extend_from_slice(&self.intended_arrival_ms.to_le_bytes());
        for ns in [
            self.commanded_arrival,
            self.arrival(),
            self.finish(),
            self.measured_pre_exec.load(Ordering::Acquire),
            self.measured_post_exec.load(Ordering::Acquire),
        ] {
            let (sec, nsec) = split_timestamp(ns);
            buf.extend_from_slice(&sec.to_le_bytes());
            buf.extend_from_slice(&nsec.to_le_bytes());
        }
        buf.extend_from_slice(&self.slot_mask().to_le_bytes());
    }
}

/// Plain decoded view of one record, for consumers of the report file.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordSnapshot {
    pub id: u32,
    pub label: u32,
    pub executions: u32,
    pub cu: u32,
    pub intended_arrival_ms: f32,
    pub commanded_arrival: i64,
    pub measured_arrival: i64,
    pub measured_finish: i64,
    pub measured_pre_exec: i64,
    pub measured_post_exec: i64,
    pub slot_mask: u32,
}

impl RecordSnapshot {
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < ENCODED_RECORD_LEN {
            return None;
        }
        // Field order mirrors `encode_into`.
        let mut ptr = buf.as_ptr();
        let id = unsafe { deref_offset::<u32>(&mut ptr) };
        let label = unsafe { deref_offset::<u32>(&mut ptr) };
        let executions = unsafe { deref_offset::<u32>(&mut ptr) };
        let cu = unsafe { deref_offset::<u32>(&mut ptr) };
        let intended_arrival_ms = unsafe { deref_offset::<f32>(&mut ptr) };
        let mut ts = || {
            let sec = unsafe { deref_offset::<i64>(&mut ptr) };
            let nsec = unsafe { deref_offset::<i64>(&mut ptr) };
            join_timestamp(sec, nsec)
        };
        let commanded_arrival = ts();
        let measured_arrival = ts();
        let measured_finish = ts();
        let measured_pre_exec = ts();
        let measured_post_exec = ts();
        drop(ts);
        let slot_mask = unsafe { deref_offset::<u32>(&mut ptr) };
        Some(Self {
            id,
            label,
            executions,
            cu,
            intended_arrival_ms,
            commanded_arrival,
            measured_arrival,
            measured_finish,
            measured_pre_exec,
            measured_post_exec,
            slot_mask,
        })
    }

    /// Decodes a whole `kernels_info.bin` image.
    pub fn decode_all(buf: &[u8]) -> Vec<Self> {
        buf.chunks_exact(ENCODED_RECORD_LEN)
            .filter_map(Self::decode)
            .collect()
    }
}
