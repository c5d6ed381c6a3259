use std::fs;
use std::io::{Error, ErrorKind, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Aggregate CPU load over the last sampling period, in percent.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CpuUsage {
    pub user: f32,
    pub kernel: f32,
    pub idle: f32,
}

#[derive(Clone, Copy, Default)]
struct CpuTimes {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
    iowait: u64,
    irq: u64,
    softirq: u64,
    steal: u64,
}

impl CpuTimes {
    fn read() -> Result<Self> {
        let stat = fs::read_to_string("/proc/stat")?;
        let line = stat
            .lines()
            .next()
            .ok_or_else(|| Error::new(ErrorKind::InvalidData, "empty /proc/stat"))?;
        let mut fields = line.split_whitespace().skip(1).map(|f| f.parse::<u64>());
        let mut next = || {
            fields
                .next()
                .and_then(|v| v.ok())
                .ok_or_else(|| Error::new(ErrorKind::InvalidData, "short cpu line in /proc/stat"))
        };
        Ok(Self {
            user: next()?,
            nice: next()?,
            system: next()?,
            idle: next()?,
            iowait: next()?,
            irq: next()?,
            softirq: next()?,
            steal: next()?,
        })
    }

    fn usage_since(&self, prev: &Self) -> CpuUsage {
        let user = (self.user + self.nice) - (prev.user + prev.nice);
        let kernel =
            (self.system + self.irq + self.softirq) - (prev.system + prev.irq + prev.softirq);
        let idle = (self.idle + self.iowait) - (prev.idle + prev.iowait);
        let steal = self.steal - prev.steal;
        let total = user + kernel + idle + steal;
        if total == 0 {
            return CpuUsage::default();
        }
        let pct = |v: u64| v as f32 * 100.0 / total as f32;
        CpuUsage {
            user: pct(user),
            kernel: pct(kernel),
            idle: pct(idle),
        }
    }
}

/// Background `/proc/stat` sampler. The monitor reads the most recent
/// period's percentages when it opens a window.
pub struct CpuMeter {
    current: Arc<Mutex<CpuUsage>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CpuMeter {
    pub fn start(period: Duration) -> Result<Self> {
        let current = Arc::new(Mutex::new(CpuUsage::default()));
        let stop = Arc::new(AtomicBool::new(false));

        let shared = Arc::clone(&current);
        let stop_flag = Arc::clone(&stop);
        let mut prev = CpuTimes::read()?;
        let handle = std::thread::Builder::new()
            .name("cpu-meter".into())
            .spawn(move || {
                while !stop_flag.load(Ordering::Acquire) {
                    std::thread::sleep(period);
                    let Ok(now) = CpuTimes::read() else {
                        continue;
                    };
                    *shared.lock().expect("cpu meter poisoned") = now.usage_since(&prev);
                    prev = now;
                }
            })
            .expect("failed to spawn cpu meter");

        Ok(Self {
            current,
            stop,
            handle: Some(handle),
        })
    }

    pub fn current(&self) -> CpuUsage {
        *self.current.lock().expect("cpu meter poisoned")
    }

    /// Detached read handle for the monitoring thread.
    pub fn reader(&self) -> CpuReader {
        CpuReader {
            current: Arc::clone(&self.current),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpuMeter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Clone)]
pub struct CpuReader {
    current: Arc<Mutex<CpuUsage>>,
}

impl CpuReader {
    pub fn current(&self) -> CpuUsage {
        *self.current.lock().expect("cpu meter poisoned")
    }

    /// Reader with a fixed zero sample, for monitor setups that run
    /// without the sampler thread.
    pub fn fixed() -> Self {
        Self {
            current: Arc::new(Mutex::new(CpuUsage::default())),
        }
    }
}
