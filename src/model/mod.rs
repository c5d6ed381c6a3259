#[cfg(test)]
mod test;

use std::io::{Read, Result, Write};
use std::net::TcpStream;

use crate::config::NUM_LABELS;

// Every exchange is one fixed-width little-endian record per direction;
// `read_exact`/`write_all` absorb partial transfers. A lost connection
// is fatal to the runtime, so no reconnection logic lives here.

/// Training-stream command: the low 31 bits carry the measurement count,
/// the MSB the intent (set = train on them, clear = test).
const TRAIN_INTENT: u32 = 1 << 31;

/// End-of-session marker.
const END_OF_SESSION: u32 = 0;

/// Accuracy report for an offline train/test command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Metrics {
    pub ps_pow_err: f32,
    pub pl_pow_err: f32,
    pub time_err: f32,
}

/// Feature record for one prediction: the CPU triple plus the per-label
/// count of kernels in the window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Features {
    pub cpu_user: f32,
    pub cpu_kernel: f32,
    pub cpu_idle: f32,
    pub per_label: [u8; NUM_LABELS],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    pub power: f32,
    pub time: f32,
}

fn put_u32(stream: &mut TcpStream, v: u32) -> Result<()> {
    stream.write_all(&v.to_le_bytes())
}

fn get_u32(stream: &mut TcpStream) -> Result<u32> {
    let mut buf = [0; 4];
    stream.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn get_i32(stream: &mut TcpStream) -> Result<i32> {
    let mut buf = [0; 4];
    stream.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn get_f32(stream: &mut TcpStream) -> Result<f32> {
    let mut buf = [0; 4];
    stream.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

/// Client for the external predictor: a training stream driving the
/// online-model sessions over the ring files, and a prediction stream
/// answering per-window feature records.
pub struct ModelClient {
    train: TcpStream,
    predict: TcpStream,
}

impl ModelClient {
    pub fn connect(train_addr: &str, predict_addr: &str) -> Result<Self> {
        let train = TcpStream::connect(train_addr)?;
        let predict = TcpStream::connect(predict_addr)?;
        train.set_nodelay(true)?;
        predict.set_nodelay(true)?;
        Ok(Self { train, predict })
    }

    /// Announces the ring geometry. The service acknowledges with the
    /// same value before any operation may run.
    pub fn announce_ring(&mut self, measurements_per_training: u32) -> Result<()> {
        put_u32(&mut self.train, measurements_per_training)?;
        let ack = get_u32(&mut self.train)?;
        if ack != measurements_per_training {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("ring announcement not acknowledged: {ack}"),
            ));
        }
        Ok(())
    }

    /// One online-training pass over the `n` windows currently held in
    /// the rings. Blocks for the duration of the training phase; the
    /// reply commands how many observations to idle before the next
    /// measurement set.
    pub fn operation(&mut self, n: u32) -> Result<i32> {
        put_u32(&mut self.train, n | TRAIN_INTENT)?;
        get_i32(&mut self.train)
    }

    /// Offline evaluation commands. The command word is the same as in
    /// ring mode; the session mode (no ring announced) selects the
    /// metrics-shaped response.
    pub fn train(&mut self, n: u32) -> Result<Metrics> {
        put_u32(&mut self.train, n | TRAIN_INTENT)?;
        self.metrics()
    }

    pub fn test(&mut self, n: u32) -> Result<Metrics> {
        put_u32(&mut self.train, n & !TRAIN_INTENT)?;
        self.metrics()
    }

    fn metrics(&mut self) -> Result<Metrics> {
        Ok(Metrics {
            ps_pow_err: get_f32(&mut self.train)?,
            pl_pow_err: get_f32(&mut self.train)?,
            time_err: get_f32(&mut self.train)?,
        })
    }

    pub fn predict(&mut self, features: &Features) -> Result<Prediction> {
        let mut buf = [0u8; 3 * 4 + NUM_LABELS];
        buf[0..4].copy_from_slice(&features.cpu_user.to_le_bytes());
        buf[4..8].copy_from_slice(&features.cpu_kernel.to_le_bytes());
        buf[8..12].copy_from_slice(&features.cpu_idle.to_le_bytes());
        buf[12..].copy_from_slice(&features.per_label);
        self.predict.write_all(&buf)?;
        Ok(Prediction {
            power: get_f32(&mut self.predict)?,
            time: get_f32(&mut self.predict)?,
        })
    }

    /// Tells the service the session is over so it can unmap the rings
    /// and exit.
    pub fn end_session(&mut self) -> Result<()> {
        put_u32(&mut self.train, END_OF_SESSION)
    }
}
