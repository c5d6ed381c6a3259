use std::io::Result;
use std::thread;
use std::time::Duration;

/// Accelerator seam. One call runs `executions` back-to-back invocations
/// of the `label` kernel on the slots of `slot_mask`; it returns when the
/// hardware is done and is trusted to terminate. The real driver lives
/// outside this crate.
pub trait Accelerator: Send + Sync {
    fn execute_kernel(&self, label: u32, cu: u32, slot_mask: u32, executions: u32) -> Result<()>;
}

/// Stand-in accelerator that models execution time only: a fixed setup
/// cost plus a per-invocation cost that scales down with the compute
/// units the kernel spans.
pub struct SyntheticAccelerator {
    pub base: Duration,
    pub per_execution: Duration,
}

impl SyntheticAccelerator {
    pub fn new(base: Duration, per_execution: Duration) -> Self {
        Self {
            base,
            per_execution,
        }
    }
}

impl Default for SyntheticAccelerator {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5),
            per_execution: Duration::from_millis(2),
        }
    }
}

impl Accelerator for SyntheticAccelerator {
    fn execute_kernel(&self, _label: u32, cu: u32, _slot_mask: u32, executions: u32) -> Result<()> {
        let work = self.per_execution * executions / cu.max(1);
        thread::sleep(self.base + work);
        Ok(())
    }
}
