use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::config::{
    RuntimeOpts, ONLINE_SEG_BYTES, POOL_WORKERS, POWER_SEG_BYTES, TRACES_SEG_BYTES,
};
use crate::error::{self, Result, RuntimeError};
use crate::exec::pool::WorkerPool;
use crate::exec::slots::{SlotLiveLists, SlotTable};
use crate::exec::{Dispatcher, Service};
use crate::hal::Accelerator;
use crate::model::ModelClient;
use crate::monitor::cpu::CpuMeter;
use crate::monitor::probe::MonitorProbe;
use crate::monitor::ring::RingSet;
use crate::monitor::MonitorEngine;
use crate::record::store::{OutputLog, RecordStore};
use crate::workload::{self, WorkloadSpec};

/// Whole-process wiring: builds every component, owns the long-lived
/// threads, runs workloads back to back and tears everything down once.
pub struct Runtime {
    opts: RuntimeOpts,
    dispatcher: Dispatcher,
    model: Option<Arc<Mutex<ModelClient>>>,
    monitor_stop: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
    cpu: Option<CpuMeter>,
    next_id: u32,
    finished: bool,
}

impl Runtime {
    pub fn new(
        opts: RuntimeOpts,
        hal: Arc<dyn Accelerator>,
        probe: Box<dyn MonitorProbe>,
    ) -> Result<Self> {
        let service = Arc::new(Service::new());
        let live = Arc::new(SlotLiveLists::new());

        let model = match &opts.model {
            Some(endpoints) => {
                let mut client = ModelClient::connect(&endpoints.train_addr, &endpoints.predict_addr)
                    .map_err(RuntimeError::Model)?;
                client
                    .announce_ring(opts.measurements_per_training as u32)
                    .map_err(RuntimeError::Model)?;
                Some(Arc::new(Mutex::new(client)))
            }
            None => {
                tracing::info!(target: "monitor", "no model service, training disabled");
                None
            }
        };

        let rings = RingSet::create(
            &opts.ring_dir,
            opts.ring_segments(),
            POWER_SEG_BYTES,
            TRACES_SEG_BYTES,
            ONLINE_SEG_BYTES,
        )
        .map_err(|e| RuntimeError::Monitor {
            context: "create ring files",
            source: e,
        })?;

        let cpu = CpuMeter::start(opts.window_period).map_err(|e| RuntimeError::Monitor {
            context: "start cpu meter",
            source: e,
        })?;

        let monitor_stop = Arc::new(AtomicBool::new(false));
        let engine = MonitorEngine {
            period: opts.window_period,
            startup_delay: opts.startup_delay,
            measurements_per_training: opts.measurements_per_training,
            rings,
            probe,
            model: model.clone(),
            service: Arc::clone(&service),
            live: Arc::clone(&live),
            cpu: cpu.reader(),
            stop: Arc::clone(&monitor_stop),
        };
        let monitor = std::thread::Builder::new()
            .name("monitor".into())
            .spawn(move || {
                let mut engine = engine;
                if let Err(e) = engine.run() {
                    error::fatal(&e);
                }
            })
            .expect("failed to spawn monitor thread");

        let dispatcher = Dispatcher {
            store: Arc::new(RecordStore::new()),
            output: Arc::new(OutputLog::new()),
            slots: Arc::new(SlotTable::new()),
            live,
            pool: Arc::new(WorkerPool::new(POOL_WORKERS)),
            service,
            hal,
        };

        Ok(Self {
            opts,
            dispatcher,
            model,
            monitor_stop,
            monitor: Some(monitor),
            cpu: Some(cpu),
            next_id: 0,
            finished: false,
        })
    }

    /// Runs one workload to completion: paced admission on a producer
    /// thread, dispatch on the calling thread, then a full drain.
    pub fn run_workload(&mut self, index: usize) -> Result<()> {
        let spec = WorkloadSpec::load(&self.opts.data_dir, index)?;
        let count = spec.len();
        tracing::info!(target: "sched", workload = index, kernels = count, "workload start");

        let first_id = self.next_id;
        let store = Arc::clone(&self.dispatcher.store);
        let service = Arc::clone(&self.dispatcher.service);
        let label_cu = self.opts.label_cu;
        let producer = std::thread::Builder::new()
            .name(format!("producer-{index}"))
            .spawn(move || workload::produce(&spec, &label_cu, first_id, &store, &service))
            .expect("failed to spawn producer thread");

        self.dispatcher.run_workload(count)?;
        producer
            .join()
            .expect("producer thread panicked")?;
        self.dispatcher.wait_drain();
        self.next_id += count as u32;

        tracing::info!(target: "sched", workload = index, "workload drained");
        Ok(())
    }

    /// Tears the process down: stops and joins the monitor (unmapping
    /// and removing the ring files), drains the pool, closes the model
    /// session and writes the final report. Idempotent.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.monitor_stop.store(true, Ordering::Release);
        if let Some(handle) = self.monitor.take() {
            handle.join().expect("monitor thread panicked");
        }
        if let Some(mut cpu) = self.cpu.take() {
            cpu.stop();
        }
        self.dispatcher.pool.shutdown();

        if let Some(model) = &self.model {
            if let Err(e) = model
                .lock()
                .expect("model client poisoned")
                .end_session()
            {
                tracing::warn!(target: "monitor", "end-of-session marker failed: {e}");
            }
        }

        // An interrupted run may leave records that never dispatched;
        // they still belong in the report.
        let leftover = self.dispatcher.store.drain();
        if !leftover.is_empty() {
            tracing::warn!(
                target: "sched",
                count = leftover.len(),
                "undispatched kernels at shutdown"
            );
            for record in leftover {
                self.dispatcher.output.push(record);
            }
        }

        self.dispatcher.output.flush(&self.opts.output_path)?;
        tracing::info!(
            target: "runtime",
            records = self.dispatcher.output.len(),
            path = %self.opts.output_path.display(),
            "final report written"
        );
        Ok(())
    }

    pub fn output(&self) -> &OutputLog {
        &self.dispatcher.output
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Binary entry point: runs `num_workloads` workloads and shuts down.
pub fn run(
    opts: RuntimeOpts,
    num_workloads: usize,
    hal: Arc<dyn Accelerator>,
    probe: Box<dyn MonitorProbe>,
) -> Result<()> {
    let mut runtime = Runtime::new(opts, hal, probe)?;
    for index in 0..num_workloads {
        runtime.run_workload(index)?;
    }
    runtime.shutdown()
}
