use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Number of hardware execution slots on the reconfigurable region.
pub const NUM_SLOTS: usize = 8;

/// Number of kernel kinds the platform ships bitstreams for.
pub const NUM_LABELS: usize = 11;

/// Worker threads in the execution pool. One more than the slot count so
/// a dispatch can always rendezvous even with every slot occupied.
pub const POOL_WORKERS: usize = NUM_SLOTS + 1;

/// Empirical ratio of power-monitor observations to monitoring windows,
/// used to convert a commanded observation count into an idle time.
pub const OBS_PER_WINDOW: f32 = 1.72;

/// Power acquisitions above this sample count indicate a misconfigured
/// reference voltage; the window is discarded and the monitor recovers.
pub const POWER_ERROR_SAMPLES: usize = 12_000;

/// Per-window ring segment capacities, including the byte-count footer.
/// Sized to the empirical per-window maxima of each stream.
pub const POWER_SEG_BYTES: usize = 64 * 1024;
pub const TRACES_SEG_BYTES: usize = 128 * 1024;
pub const ONLINE_SEG_BYTES: usize = 16 * 1024;

/// Compute-unit width per kernel kind. The width is a property of the
/// kernel's bitstream, so it rides on the label rather than on the
/// workload files. Every entry must be one of {1, 2, 4, 8}.
pub const DEFAULT_LABEL_CU: [u32; NUM_LABELS] = [8, 1, 2, 1, 4, 1, 2, 1, 1, 2, 1];

/// Model-service endpoints: one stream for training commands, one for
/// per-window predictions.
#[derive(Clone, Debug)]
pub struct ModelEndpoints {
    pub train_addr: String,
    pub predict_addr: String,
}

impl Default for ModelEndpoints {
    fn default() -> Self {
        Self {
            train_addr: "127.0.0.1:8890".into(),
            predict_addr: "127.0.0.1:8891".into(),
        }
    }
}

/// Everything the runtime reads from the outside world: file locations,
/// monitoring cadence and ring geometry, and the optional model service.
#[derive(Clone, Debug)]
pub struct RuntimeOpts {
    /// Directory holding the `inter_arrival_<w>.bin`, `kernel_id_<w>.bin`
    /// and `num_executions_<w>.bin` triples.
    pub data_dir: PathBuf,

    /// Directory the ring backing files are created in.
    pub ring_dir: PathBuf,

    /// Final report written at shutdown.
    pub output_path: PathBuf,

    /// Windows per training phase; also the ring segment count
    /// (a ping-pong pair when 1).
    pub measurements_per_training: usize,

    pub window_period: Duration,
    pub startup_delay: Duration,

    /// Compute-unit width per label.
    pub label_cu: [u32; NUM_LABELS],

    /// `None` runs standalone: the monitor still windows and rotates the
    /// rings, but never enters a training phase.
    pub model: Option<ModelEndpoints>,
}

impl Default for RuntimeOpts {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            ring_dir: PathBuf::from("/tmp/fpga-sched"),
            output_path: PathBuf::from("kernels_info.bin"),
            measurements_per_training: 200,
            window_period: Duration::from_millis(500),
            startup_delay: Duration::from_millis(2000),
            label_cu: DEFAULT_LABEL_CU,
            model: None,
        }
    }
}

impl RuntimeOpts {
    /// Ring segments per file: a training phase holds
    /// `measurements_per_training` windows end-to-end, except that a
    /// single-window phase still needs a ping-pong pair.
    pub fn ring_segments(&self) -> usize {
        self.measurements_per_training.max(2)
    }
}

impl fmt::Display for RuntimeOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "slots:                     {}", NUM_SLOTS)?;
        writeln!(f, "kernel labels:             {}", NUM_LABELS)?;
        writeln!(f, "pool workers:              {}", POOL_WORKERS)?;
        writeln!(f, "label CU widths:           {:?}", self.label_cu)?;
        writeln!(f, "data dir:                  {}", self.data_dir.display())?;
        writeln!(f, "ring dir:                  {}", self.ring_dir.display())?;
        writeln!(f, "output:                    {}", self.output_path.display())?;
        writeln!(f, "window period:             {:?}", self.window_period)?;
        writeln!(f, "startup delay:             {:?}", self.startup_delay)?;
        writeln!(
            f,
            "measurements per training: {}",
            self.measurements_per_training
        )?;
        writeln!(f, "ring segments:             {}", self.ring_segments())?;
        match &self.model {
            Some(m) => {
                writeln!(f, "model train stream:        {}", m.train_addr)?;
                writeln!(f, "model predict stream:      {}", m.predict_addr)
            }
            None => writeln!(f, "model service:             disabled"),
        }
    }
}
