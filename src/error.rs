// Wand Inference - Error Types

use thiserror::Error;

/// Startup-time configuration problems. Fatal: nothing is spawned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sampling frequency must be non-zero")]
    ZeroFrequency,
    #[error("window length and slices per window must be non-zero")]
    EmptyWindow,
    #[error("window length {window_len} is not divisible by {slices} slices")]
    UnevenSlices { window_len: usize, slices: usize },
    #[error("channel {channel} has invalid standard deviation {std_dev}")]
    InvalidStdDev { channel: usize, std_dev: f32 },
    #[error("inference poll interval must be non-zero")]
    ZeroPollInterval,
    #[error("classifier reports no labels")]
    NoLabels,
    #[error("classifier expects {expected} labels, model reports {actual}")]
    LabelMismatch { expected: usize, actual: usize },
}

/// Failures reported by a [`SampleSource`](crate::drivers::SampleSource).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// Recorded data ran out; the pipeline should wind down.
    #[error("sample source exhausted")]
    Exhausted,
    #[error("sensor read failed: {0}")]
    Read(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifierError {
    #[error("classifier returned status {0}")]
    Status(i32),
    #[error("signal read {offset}+{length} exceeds window of {total}")]
    SignalOutOfRange {
        offset: usize,
        length: usize,
        total: usize,
    },
    #[error("classifier produced {actual} scores, expected {expected}")]
    LabelCount { expected: usize, actual: usize },
}

impl ClassifierError {
    /// Numeric status for the `run_classifier returned:` diagnostic line.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Status(code) => *code,
            // EIDSP_OUT_OF_BOUNDS / EI_IMPULSE_DSP_ERROR in the SDK numbering.
            Self::SignalOutOfRange { .. } => -1002,
            Self::LabelCount { .. } => -5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BufferError {
    #[error("range {offset}+{length} out of bounds for window of {capacity}")]
    OutOfBounds {
        offset: usize,
        length: usize,
        capacity: usize,
    },
    #[error("slice holds {expected} scalars, got {actual}")]
    SliceLength { expected: usize, actual: usize },
    #[error("slice index {index} out of range ({slices} slices)")]
    SliceIndex { index: usize, slices: usize },
}

/// The producer filled a slab while the previous one was still unclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("buffer overrun: slab filled before the previous one was drained")]
pub struct Overrun;
