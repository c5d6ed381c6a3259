use std::io::Result;

/// One window's raw acquisition.
pub struct Acquisition {
    /// Power-rail samples from the monitor ADC.
    pub power: Vec<f32>,
    /// Raw probe trace words.
    pub traces: Vec<u32>,
    /// Acquisition span reported by the hardware, in milliseconds.
    pub elapsed_ms: f32,
}

/// Monitoring-hardware seam: start an acquisition, block on its "done"
/// signal, read the captured buffers. The physical register map lives
/// outside this crate.
pub trait MonitorProbe: Send {
    fn start_acquisition(&mut self) -> Result<()>;
    fn wait_done(&mut self) -> Result<()>;
    fn read(&mut self) -> Result<Acquisition>;

    /// Recovery hook for over-threshold reads: reconfigure the reference
    /// voltage so the next window's acquisition is sane again.
    fn reconfigure_vref(&mut self) -> Result<()>;
}

/// Deterministic stand-in probe: a fixed-size ramp of power samples and a
/// short trace, tagged with a sequence number.
pub struct SyntheticProbe {
    pub samples_per_window: usize,
    seq: u32,
}

impl SyntheticProbe {
    pub fn new(samples_per_window: usize) -> Self {
        Self {
            samples_per_window,
            seq: 0,
        }
    }
}

impl Default for SyntheticProbe {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MonitorProbe for SyntheticProbe {
    fn start_acquisition(&mut self) -> Result<()> {
        Ok(())
    }

    fn wait_done(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self) -> Result<Acquisition> {
        self.seq += 1;
        let base = self.seq as f32;
        Ok(Acquisition {
            power: (0..self.samples_per_window)
                .map(|i| base + i as f32 * 0.001)
                .collect(),
            traces: (0..8).map(|i| self.seq.wrapping_mul(16) + i).collect(),
            elapsed_ms: 1.0,
        })
    }

    fn reconfigure_vref(&mut self) -> Result<()> {
        Ok(())
    }
}
