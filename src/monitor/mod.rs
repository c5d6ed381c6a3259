#[cfg(test)]
mod test;

pub mod cpu;
pub mod online;
pub mod probe;
pub mod ring;

use std::io::{Error, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpu::CpuReader;
use online::OnlineWriter;
use probe::MonitorProbe;
use ring::RingSet;

use crate::config::{NUM_SLOTS, OBS_PER_WINDOW, POWER_ERROR_SAMPLES};
use crate::error::{Result, RuntimeError};
use crate::exec::slots::SlotLiveLists;
use crate::exec::{OperatingMode, Service};
use crate::ffi::{monotonic_now, sleep_until};
use crate::model::ModelClient;

/// Bounds of one acquisition, absolute monotonic nanoseconds. `initial`
/// is the commanded tick; `start` and `finish` bracket the hardware
/// acquisition and bound the attribution predicate.
#[derive(Clone, Copy, Debug)]
pub struct MonitorWindow {
    pub initial: i64,
    pub start: i64,
    pub finish: i64,
}

/// The windowing predicate for one record against one window.
///
/// Write: the kernel overlapped the window. The sentinel initialization
/// makes an unstarted kernel fail `t0 < mf`, and a started-but-running
/// kernel pass `tf > m0` trivially.
///
/// Retain: the kernel may still overlap a future window, either because
/// it outlived this one or because it has not produced real timestamps
/// yet (`t0 == tf` only holds for the sentinel pair).
fn window_disposition(t0: i64, tf: i64, m0: i64, mf: i64) -> (bool, bool) {
    let write = tf > m0 && t0 < mf;
    let retain = tf > mf || t0 == tf;
    (write, retain)
}

fn write_power(buf: &mut [u8], elapsed_ms: f32, samples: &[f32]) -> std::io::Result<usize> {
    let need = 4 + samples.len() * 4;
    if need > buf.len() {
        return Err(Error::new(
            ErrorKind::WriteZero,
            "power samples larger than their ring segment",
        ));
    }
    buf[0..4].copy_from_slice(&elapsed_ms.to_le_bytes());
    for (i, s) in samples.iter().enumerate() {
        buf[4 + i * 4..8 + i * 4].copy_from_slice(&s.to_le_bytes());
    }
    Ok(need)
}

fn write_traces(buf: &mut [u8], words: &[u32]) -> std::io::Result<usize> {
    let need = words.len() * 4;
    if need > buf.len() {
        return Err(Error::new(
            ErrorKind::WriteZero,
            "trace words larger than their ring segment",
        ));
    }
    for (i, w) in words.iter().enumerate() {
        buf[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
    }
    Ok(need)
}

/// Periodic acquisition engine. Runs on its own thread against absolute
/// deadlines; every window it captures the probe, attributes the live
/// kernels to the window per slot, publishes the three ring segments and
/// advances the cursor. Every `measurements_per_training` windows it
/// pauses dispatch and hands the rings to the model service.
pub struct MonitorEngine {
    pub period: Duration,
    pub startup_delay: Duration,
    pub measurements_per_training: usize,
    pub rings: RingSet,
    pub probe: Box<dyn MonitorProbe>,
    pub model: Option<Arc<Mutex<ModelClient>>>,
    pub service: Arc<Service>,
    pub live: Arc<SlotLiveLists>,
    pub cpu: CpuReader,
    pub stop: Arc<AtomicBool>,
}

impl MonitorEngine {
    pub fn run(&mut self) -> Result<()> {
        let period = self.period.as_nanos() as i64;
        let mut next_tick = monotonic_now() + self.startup_delay.as_nanos() as i64;
        let mut window_index: u64 = 0;

        while !self.stop.load(Ordering::Acquire) {
            sleep_until(next_tick).map_err(|e| RuntimeError::Monitor {
                context: "deadline sleep",
                source: e,
            })?;

            // An over-threshold read discards the window and leaves the
            // cursor in place.
            if !self.capture_window(next_tick)? {
                next_tick += period;
                continue;
            }

            self.rings.advance();
            window_index += 1;

            if window_index % self.measurements_per_training as u64 == 0 {
                if let Some(model) = self.model.clone() {
                    self.training_phase(&model, period)?;
                    next_tick = monotonic_now();
                }
            }
            next_tick += period;
        }
        Ok(())
    }

    /// One acquisition. Returns false when the window was discarded.
    fn capture_window(&mut self, commanded: i64) -> Result<bool> {
        let monitor_err = |context: &'static str| {
            move |source: std::io::Error| RuntimeError::Monitor { context, source }
        };

        let mut window = MonitorWindow {
            initial: commanded,
            start: monotonic_now(),
            finish: 0,
        };
        let cpu = self.cpu.current();

        self.probe
            .start_acquisition()
            .map_err(monitor_err("start acquisition"))?;
        self.probe
            .wait_done()
            .map_err(monitor_err("wait acquisition"))?;
        window.finish = monotonic_now();

        let acq = self.probe.read().map_err(monitor_err("read acquisition"))?;
        if acq.power.len() > POWER_ERROR_SAMPLES {
            tracing::warn!(
                target: "monitor",
                samples = acq.power.len(),
                "over-threshold acquisition, discarding window"
            );
            self.probe
                .reconfigure_vref()
                .map_err(monitor_err("reconfigure vref"))?;
            return Ok(false);
        }

        let seg = self.rings.cursor();

        let bytes = write_power(self.rings.power.payload_mut(seg), acq.elapsed_ms, &acq.power)
            .map_err(monitor_err("write power segment"))?;
        self.rings.power.seal(seg, bytes as u64);

        let bytes = write_traces(self.rings.traces.payload_mut(seg), &acq.traces)
            .map_err(monitor_err("write traces segment"))?;
        self.rings.traces.seal(seg, bytes as u64);

        let mut writer = OnlineWriter::new(self.rings.online.payload_mut(seg));
        writer.header(&cpu, &window, NUM_SLOTS as u32);
        for slot in 0..NUM_SLOTS {
            let mut list = self.live.lock_slot(slot);
            let drained = std::mem::take(&mut *list);
            for record in drained {
                let (write, retain) =
                    window_disposition(record.arrival(), record.finish(), window.start, window.finish);
                if write {
                    writer.kernel(record.label, record.arrival(), record.finish());
                }
                if retain {
                    list.push(record);
                }
            }
            writer.end_of_slot();
        }
        let bytes = writer.finish().map_err(monitor_err("write online segment"))?;
        self.rings.online.seal(seg, bytes as u64);

        Ok(true)
    }

    /// Pauses dispatch, drives one model-service training pass over the
    /// rings, resumes dispatch, then honors the commanded idle time.
    fn training_phase(&mut self, model: &Arc<Mutex<ModelClient>>, period_ns: i64) -> Result<()> {
        self.service.set_mode(OperatingMode::Train);
        tracing::info!(target: "monitor", m = self.measurements_per_training, "training phase");

        let obs_to_wait = model
            .lock()
            .expect("model client poisoned")
            .operation(self.measurements_per_training as u32)
            .map_err(RuntimeError::Model)?;

        // Dispatch resumes before any commanded idle, so in-flight
        // execution is not starved while the fabric quiesces.
        self.service.set_mode(OperatingMode::Execution);

        if obs_to_wait > 0 {
            let extra = (obs_to_wait as f32 / OBS_PER_WINDOW * period_ns as f32) as i64;
            tracing::debug!(target: "monitor", obs_to_wait, "commanded idle");
            sleep_until(monotonic_now() + extra).map_err(|e| RuntimeError::Monitor {
                context: "commanded idle sleep",
                source: e,
            })?;
        }
        Ok(())
    }
}
