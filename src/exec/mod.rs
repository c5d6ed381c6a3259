
pub mod pool;
pub mod slots;

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use pool::WorkerPool;
use slots::{SlotLiveLists, SlotTable};

use crate::config::{NUM_LABELS, NUM_SLOTS};
use crate::error::{self, Result, RuntimeError};
use crate::ffi::monotonic_now;
use crate::hal::Accelerator;
use crate::record::store::{OutputLog, RecordStore};

/// Exclusive runtime phases. During `Train` the monitor owns the ring
/// buffers end-to-end and new dispatches pause; kernels already on the
/// fabric keep running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatingMode {
    Execution,
    Train,
}

/// Everything the dispatch gate reads, under one mutex. The four gating
/// conditions are independently mutated by the producer, the workers and
/// the monitor, so waiters must recheck all of them after every wake.
pub struct ServiceState {
    /// Appended but not yet dispatched records.
    pub kernels_to_serve: usize,
    /// Hint that a new scan may find an executable record. Cleared only
    /// at the top of a scan; set on successful dispatch, on append and on
    /// completion. A dead-end scan leaves it untouched so a concurrent
    /// setter is never hidden.
    pub may_be_executable: bool,
    pub free_slots: u32,
    pub mode: OperatingMode,
    /// Live kernels per label; a label with a nonzero count is duplicated
    /// and not dispatched again.
    pub dup: [u32; NUM_LABELS],
}

pub struct Service {
    state: Mutex<ServiceState>,
    cond: Condvar,
}

impl Service {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState {
                kernels_to_serve: 0,
                may_be_executable: false,
                free_slots: NUM_SLOTS as u32,
                mode: OperatingMode::Execution,
                dup: [0; NUM_LABELS],
            }),
            cond: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().expect("service mutex poisoned")
    }

    pub fn wait<'a>(&'a self, guard: MutexGuard<'a, ServiceState>) -> MutexGuard<'a, ServiceState> {
        self.cond.wait(guard).expect("service condvar poisoned")
    }

    pub fn notify_all(&self) {
        self.cond.notify_all();
    }

    /// Producer side: one more record awaits dispatch.
    pub fn on_admitted(&self) {
        let mut st = self.lock();
        st.kernels_to_serve += 1;
        st.may_be_executable = true;
        self.notify_all();
    }

    /// Worker side, after the accelerator returns and slots are released.
    pub fn on_completion(&self, label: u32, cu: u32) {
        let mut st = self.lock();
        st.dup[label as usize] -= 1;
        st.free_slots += cu;
        st.may_be_executable = true;
        self.notify_all();
    }

    pub fn set_mode(&self, mode: OperatingMode) {
        let mut st = self.lock();
        st.mode = mode;
        self.notify_all();
    }
}

impl Default for Service {
    fn default() -> Self {
        Self::new()
    }
}

const PROGRESS_EVERY: usize = 32;

/// Dispatch scheduler. Selects the first executable pending kernel,
/// reserves its slots, marks its label live and hands the execution job
/// to the worker pool.
pub struct Dispatcher {
    pub store: Arc<RecordStore>,
    pub output: Arc<OutputLog>,
    pub slots: Arc<SlotTable>,
    pub live: Arc<SlotLiveLists>,
    pub pool: Arc<WorkerPool>,
    pub service: Arc<Service>,
    pub hal: Arc<dyn Accelerator>,
}

impl Dispatcher {
    /// Dispatches exactly `count` kernels, then returns. The producer
    /// admits records concurrently; this loop blocks on the service
    /// condition until a dispatch can make progress.
    pub fn run_workload(&self, count: usize) -> Result<()> {
        let mut served = 0;
        while served < count {
            let (free_now, dup_now) = {
                let mut st = self.service.lock();
                while st.kernels_to_serve == 0
                    || !st.may_be_executable
                    || st.free_slots == 0
                    || st.mode == OperatingMode::Train
                {
                    st = self.service.wait(st);
                }
                st.may_be_executable = false;
                (st.free_slots, st.dup)
            };

            let Some(record) = self
                .store
                .scan_and_remove_first_executable(free_now, &dup_now)
            else {
                // Dead end: whatever anyone set on the flag while we
                // scanned stays set, so the gate decides the retry.
                continue;
            };

            {
                let mut st = self.service.lock();
                st.may_be_executable = true;
                st.dup[record.label as usize] += 1;
                st.free_slots -= record.cu;
            }

            let mask = self.slots.allocate(record.cu)?;
            record.set_slot_mask(mask);
            self.output.push(Arc::clone(&record));

            let live = Arc::clone(&self.live);
            let slots = Arc::clone(&self.slots);
            let service = Arc::clone(&self.service);
            let hal = Arc::clone(&self.hal);
            let rec = Arc::clone(&record);
            self.pool.dispatch(Box::new(move || {
                // Registration precedes the arrival stamp so the record
                // can never attribute into a window it had not started in.
                live.register(mask, &rec);
                rec.store_arrival(monotonic_now());

                rec.store_pre_exec(monotonic_now());
                let result = hal.execute_kernel(rec.label, rec.cu, mask, rec.executions);
                rec.store_post_exec(monotonic_now());
                rec.store_finish(monotonic_now());

                if let Err(e) = result {
                    error::fatal(&RuntimeError::Hal {
                        id: rec.id,
                        source: e,
                    });
                }

                slots.release(mask);
                service.on_completion(rec.label, rec.cu);
            }));

            {
                let mut st = self.service.lock();
                st.kernels_to_serve -= 1;
            }

            served += 1;
            if served % PROGRESS_EVERY == 0 || served == count {
                tracing::info!(
                    target: "sched",
                    served,
                    pending = self.store.len(),
                    "dispatch progress"
                );
            }
        }
        Ok(())
    }

    /// Blocks until every dispatched kernel has completed and returned
    /// its slots.
    pub fn wait_drain(&self) {
        let mut st = self.service.lock();
        while st.free_slots != NUM_SLOTS as u32 {
            st = self.service.wait(st);
        }
        drop(st);
        self.pool.wait_idle();
    }
}
