// Wand Inference - Pipeline & System Configuration
// Target: Arduino-class IMU board or hosted replay (6-axis, 100 Hz)

use std::time::Duration;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Sensor channels
// ---------------------------------------------------------------------------
pub const NUM_CHANNELS: usize = 6; // accX, accY, accZ, gyrX, gyrY, gyrZ
pub const CONVERT_G_TO_MS2: f32 = 9.80665;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------
pub const SAMPLING_FREQ_HZ: u32 = 100;
pub const INFERENCE_POLL_INTERVAL_MS: u64 = 10;

// ---------------------------------------------------------------------------
// Task Stack Sizes (bytes)
// ---------------------------------------------------------------------------
#[cfg(target_os = "espidf")]
pub const STACK_SAMPLING: usize = 4096;
#[cfg(target_os = "espidf")]
pub const STACK_INFERENCE: usize = 16384;
// Hosted threads also carry the logger's formatting machinery.
#[cfg(not(target_os = "espidf"))]
pub const STACK_SAMPLING: usize = 256 * 1024;
#[cfg(not(target_os = "espidf"))]
pub const STACK_INFERENCE: usize = 512 * 1024;

// ---------------------------------------------------------------------------
// AI / Edge Impulse Model
// ---------------------------------------------------------------------------
pub const NUM_READINGS: usize = 150; // 1.5-second window @ 100 Hz
pub const SLICES_PER_WINDOW: usize = 6; // inferences per window
pub const ANOMALY_THRESHOLD: f32 = 0.3;
pub const LABELS: [&str; 4] = ["alpha", "beta", "gamma", "other"];

// Dataset statistics (accel in m/s², gyro in °/s) used for standardization.
pub const CHANNEL_MEANS: [f32; NUM_CHANNELS] =
    [-0.2238, -0.3129, 5.6543, -4.8021, 4.0536, -6.4238];
pub const CHANNEL_STD_DEVS: [f32; NUM_CHANNELS] =
    [5.6031, 7.5372, 7.6538, 149.2136, 125.0134, 133.8875];

/// Everything the sampling and inference loops need, fixed before start.
///
/// [`Default`] mirrors the build-time constants above; tests shrink the
/// window and speed up the clock.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub sampling_freq_hz: u32,
    /// Samples (not scalars) in one full inference window.
    pub window_len: usize,
    pub slices_per_window: usize,
    pub means: [f32; NUM_CHANNELS],
    pub std_devs: [f32; NUM_CHANNELS],
    pub anomaly_threshold: f32,
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_freq_hz: SAMPLING_FREQ_HZ,
            window_len: NUM_READINGS,
            slices_per_window: SLICES_PER_WINDOW,
            means: CHANNEL_MEANS,
            std_devs: CHANNEL_STD_DEVS,
            anomaly_threshold: ANOMALY_THRESHOLD,
            poll_interval: Duration::from_millis(INFERENCE_POLL_INTERVAL_MS),
        }
    }
}

impl PipelineConfig {
    /// Reject anything that would corrupt the buffers or divide by zero.
    /// Must pass before any thread is spawned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling_freq_hz == 0 {
            return Err(ConfigError::ZeroFrequency);
        }
        if self.window_len == 0 || self.slices_per_window == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if self.window_len % self.slices_per_window != 0 {
            return Err(ConfigError::UnevenSlices {
                window_len: self.window_len,
                slices: self.slices_per_window,
            });
        }
        for (channel, &std_dev) in self.std_devs.iter().enumerate() {
            if !std_dev.is_finite() || std_dev <= 0.0 {
                return Err(ConfigError::InvalidStdDev { channel, std_dev });
            }
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }

    /// Fixed tick for the sampling loop (10 ms at 100 Hz).
    pub fn sampling_period(&self) -> Duration {
        Duration::from_secs(1) / self.sampling_freq_hz
    }

    pub fn samples_per_slice(&self) -> usize {
        self.window_len / self.slices_per_window
    }

    /// Scalars held by one half of the double buffer.
    pub fn slab_len(&self) -> usize {
        self.samples_per_slice() * NUM_CHANNELS
    }

    /// Scalars held by the ring window presented to the classifier.
    pub fn window_scalars(&self) -> usize {
        self.window_len * NUM_CHANNELS
    }
}
