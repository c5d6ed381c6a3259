use std::io::{Error, ErrorKind, Result};

use super::cpu::CpuUsage;
use super::MonitorWindow;
use crate::ffi::deref_offset;
use crate::record::split_timestamp;

// One window in the online segment is a tagged stream:
//
// f32 cpu_user, f32 cpu_kernel, f32 cpu_idle
// i64 init_sec,  i64 init_nsec
// i64 start_sec, i64 start_nsec
// i64 fin_sec,   i64 fin_nsec
// i32 slot_count
// repeat slot_count times:
//     repeat:
//         i32 tag            # 1 = kernel snapshot follows, 0 = next slot
//         if tag == 0: break
//         i32 label
//         i64 arr_sec, i64 arr_nsec
//         i64 fin_sec, i64 fin_nsec
//
// so a consumer needs no prior knowledge of how many kernels ran on each
// slot. The segment footer carries the total byte count.

const TAG_KERNEL: i32 = 1;
const TAG_END_OF_SLOT: i32 = 0;

/// Streaming writer for one window's online record. Overflow is latched
/// and surfaced by `finish`; a window that outgrows its segment is an IO
/// error for the caller.
pub struct OnlineWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    overflow: bool,
}

impl<'a> OnlineWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            overflow: false,
        }
    }

    fn put(&mut self, bytes: &[u8]) {
        if self.pos + bytes.len() > self.buf.len() {
            self.overflow = true;
            return;
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_f32(&mut self, v: f32) {
        self.put(&v.to_le_bytes());
    }

    fn put_i32(&mut self, v: i32) {
        self.put(&v.to_le_bytes());
    }

    fn put_ts(&mut self, ns: i64) {
        let (sec, nsec) = split_timestamp(ns);
        self.put(&sec.to_le_bytes());
        self.put(&nsec.to_le_bytes());
    }

    pub fn header(&mut self, cpu: &CpuUsage, window: &MonitorWindow, slot_count: u32) {
        self.put_f32(cpu.user);
        self.put_f32(cpu.kernel);
        self.put_f32(cpu.idle);
        self.put_ts(window.initial);
        self.put_ts(window.start);
        self.put_ts(window.finish);
        self.put_i32(slot_count as i32);
    }

    pub fn kernel(&mut self, label: u32, arrival: i64, finish: i64) {
        self.put_i32(TAG_KERNEL);
        self.put_i32(label as i32);
        self.put_ts(arrival);
        self.put_ts(finish);
    }

    pub fn end_of_slot(&mut self) {
        self.put_i32(TAG_END_OF_SLOT);
    }

    /// Valid byte count, or an error if the segment overflowed.
    pub fn finish(self) -> Result<usize> {
        if self.overflow {
            Err(Error::new(
                ErrorKind::WriteZero,
                "online record larger than its ring segment",
            ))
        } else {
            Ok(self.pos)
        }
    }
}

/// One kernel snapshot as a consumer sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct OnlineKernel {
    pub label: i32,
    pub arrival: (i64, i64),
    pub finish: (i64, i64),
}

/// Decoded online record for one window.
#[derive(Clone, Debug)]
pub struct OnlineRecord {
    pub cpu: CpuUsage,
    pub initial: (i64, i64),
    pub start: (i64, i64),
    pub finish: (i64, i64),
    pub slots: Vec<Vec<OnlineKernel>>,
}

impl OnlineRecord {
    /// Parses the valid prefix of one online segment.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        // Fixed head: cpu triple, three timestamp pairs, slot count.
        if buf.len() < 3 * 4 + 6 * 8 + 4 {
            return None;
        }
        let end = buf.as_ptr() as usize + buf.len();
        let mut ptr = buf.as_ptr();

        let cpu = CpuUsage {
            user: unsafe { deref_offset::<f32>(&mut ptr) },
            kernel: unsafe { deref_offset::<f32>(&mut ptr) },
            idle: unsafe { deref_offset::<f32>(&mut ptr) },
        };
        let ts = |ptr: &mut *const u8| {
            let sec = unsafe { deref_offset::<i64>(ptr) };
            let nsec = unsafe { deref_offset::<i64>(ptr) };
            (sec, nsec)
        };
        let initial = ts(&mut ptr);
        let start = ts(&mut ptr);
        let finish = ts(&mut ptr);
        let slot_count = unsafe { deref_offset::<i32>(&mut ptr) };
        if slot_count < 0 {
            return None;
        }

        let mut slots = Vec::with_capacity(slot_count as usize);
        for _ in 0..slot_count {
            let mut kernels = Vec::new();
            loop {
                if ptr as usize + 4 > end {
                    return None;
                }
                let tag = unsafe { deref_offset::<i32>(&mut ptr) };
                if tag == TAG_END_OF_SLOT {
                    break;
                }
                if ptr as usize + 4 + 4 * 8 > end {
                    return None;
                }
                let label = unsafe { deref_offset::<i32>(&mut ptr) };
                let arrival = ts(&mut ptr);
                let finish = ts(&mut ptr);
                kernels.push(OnlineKernel {
                    label,
                    arrival,
                    finish,
                });
            }
            slots.push(kernels);
        }
        Some(Self {
            cpu,
            initial,
            start,
            finish,
            slots,
        })
    }
}
