
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::config::{NUM_LABELS, NUM_SLOTS};
use crate::error::{Result, RuntimeError};
use crate::exec::Service;
use crate::ffi::{monotonic_now, sleep_until};
use crate::record::store::RecordStore;
use crate::record::KernelRecord;

/// One workload as read from its input triple: per-kernel inter-arrival
/// delays, labels and execution counts, index-aligned.
#[derive(Clone, Debug)]
pub struct WorkloadSpec {
    pub arrivals_ms: Vec<f32>,
    pub labels: Vec<u32>,
    pub executions: Vec<u32>,
}

fn read_f32s(path: &Path) -> Result<Vec<f32>> {
    let raw = fs::read(path)?;
    if raw.len() % 4 != 0 {
        return Err(RuntimeError::admission(format!(
            "{}: truncated f32 stream",
            path.display()
        )));
    }
    Ok(raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn read_i32s(path: &Path) -> Result<Vec<i32>> {
    let raw = fs::read(path)?;
    if raw.len() % 4 != 0 {
        return Err(RuntimeError::admission(format!(
            "{}: truncated i32 stream",
            path.display()
        )));
    }
    Ok(raw
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

impl WorkloadSpec {
    /// Reads and validates workload `index` from `dir`. Admission-time
    /// validation lives here: out-of-range labels and non-positive
    /// execution counts are invariant errors.
    pub fn load(dir: &Path, index: usize) -> Result<Self> {
        let arrivals_ms = read_f32s(&dir.join(format!("inter_arrival_{index}.bin")))?;
        let labels = read_i32s(&dir.join(format!("kernel_id_{index}.bin")))?;
        let executions = read_i32s(&dir.join(format!("num_executions_{index}.bin")))?;

        if labels.len() != arrivals_ms.len() || executions.len() != arrivals_ms.len() {
            return Err(RuntimeError::admission(format!(
                "workload {index}: input lengths differ ({}/{}/{})",
                arrivals_ms.len(),
                labels.len(),
                executions.len()
            )));
        }
        for (i, &label) in labels.iter().enumerate() {
            if label < 0 || label as usize >= NUM_LABELS {
                return Err(RuntimeError::admission(format!(
                    "workload {index}, kernel {i}: label {label} out of range"
                )));
            }
        }
        for (i, &n) in executions.iter().enumerate() {
            if n <= 0 {
                return Err(RuntimeError::admission(format!(
                    "workload {index}, kernel {i}: non-positive executions {n}"
                )));
            }
        }

        Ok(Self {
            arrivals_ms,
            labels: labels.into_iter().map(|l| l as u32).collect(),
            executions: executions.into_iter().map(|n| n as u32).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.arrivals_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrivals_ms.is_empty()
    }
}

/// Producer loop: admits the workload's kernels on their commanded
/// schedule. Each inter-arrival delay advances an absolute deadline, so
/// pacing does not drift with admission overhead.
pub fn produce(
    spec: &WorkloadSpec,
    label_cu: &[u32; NUM_LABELS],
    first_id: u32,
    store: &Arc<RecordStore>,
    service: &Arc<Service>,
) -> Result<()> {
    let mut commanded = monotonic_now();
    for i in 0..spec.len() {
        commanded += (spec.arrivals_ms[i] as f64 * 1e6) as i64;
        sleep_until(commanded)?;

        let label = spec.labels[i];
        let cu = label_cu[label as usize];
        debug_assert!(cu.is_power_of_two() && cu as usize <= NUM_SLOTS);
        store.append(KernelRecord::new(
            first_id + i as u32,
            label,
            spec.executions[i],
            cu,
            spec.arrivals_ms[i],
            commanded,
        ));
        service.on_admitted();
    }
    Ok(())
}
