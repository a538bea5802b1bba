// Wand Inference - Sampling Task
//
// Reads the 6-axis IMU on a fixed period, converts accel to m/s², and appends
// each sample to the active slab. A full slab is handed to the inference task.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::buffer::DoubleBuffer;
use crate::drivers::{SampleSource, Triple};
use crate::error::SensorError;
use crate::events::SensorData;
use crate::pipeline::RunFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Sample stored, slab not full yet.
    Sampled,
    /// Slab filled and handed off.
    SlabReady,
    /// Slab filled while the previous one was still unclaimed.
    Overrun,
    /// The source has no more data.
    EndOfStream,
}

pub struct SamplingLoop<S> {
    source: S,
    buffers: Arc<DoubleBuffer>,
    period: Duration,
    running: RunFlag,
    // Last-known-good readings, reused when a read fails.
    last_accel: Triple,
    last_gyro: Triple,
    read_failures: u64,
}

impl<S: SampleSource> SamplingLoop<S> {
    pub fn new(source: S, buffers: Arc<DoubleBuffer>, period: Duration, running: RunFlag) -> Self {
        Self {
            source,
            buffers,
            period,
            running,
            last_accel: (0.0, 0.0, 0.0),
            last_gyro: (0.0, 0.0, 0.0),
            read_failures: 0,
        }
    }

    pub fn read_failures(&self) -> u64 {
        self.read_failures
    }

    /// Take one sample and store it.
    pub fn tick(&mut self) -> TickOutcome {
        let accel = match self.source.read_accel() {
            Ok(v) => {
                self.last_accel = v;
                v
            }
            Err(SensorError::Exhausted) => return TickOutcome::EndOfStream,
            Err(e) => {
                self.read_failures += 1;
                log::warn!("Accelerometer read error: {} (reusing last reading)", e);
                self.last_accel
            }
        };
        let gyro = match self.source.read_gyro() {
            Ok(v) => {
                self.last_gyro = v;
                v
            }
            Err(SensorError::Exhausted) => return TickOutcome::EndOfStream,
            Err(e) => {
                self.read_failures += 1;
                log::warn!("Gyroscope read error: {} (reusing last reading)", e);
                self.last_gyro
            }
        };

        let sample = SensorData::from_parts(accel, gyro).to_channels();
        if !self.buffers.write(&sample) {
            return TickOutcome::Sampled;
        }

        match self.buffers.try_swap() {
            Ok(_) => TickOutcome::SlabReady,
            Err(e) => {
                log::warn!("{}", e);
                TickOutcome::Overrun
            }
        }
    }

    /// Sample until stopped or the source runs dry.
    ///
    /// Wake-ups are scheduled against a fixed start time so scheduling jitter
    /// does not accumulate; a late tick sleeps zero.
    pub fn run(mut self) {
        log::info!("Sampling task started ({:?} period)", self.period);

        let start = Instant::now();
        let mut target = Duration::ZERO;

        while self.running.is_running() {
            target += self.period;
            let to_sleep = target.saturating_sub(start.elapsed());
            thread::sleep(to_sleep);

            if !self.running.is_running() {
                break;
            }

            if self.tick() == TickOutcome::EndOfStream {
                log::info!("Sample source exhausted - closing buffers");
                self.buffers.close();
                break;
            }
        }

        log::info!(
            "Sampling task stopped ({} read failures)",
            self.read_failures
        );
    }
}
