//! Continuous motion inference over a 6-axis IMU.
//!
//! A high-priority sampling task fills one half of a [`buffer::DoubleBuffer`]
//! at a fixed rate while the inference task standardizes the other half into a
//! [`buffer::RingWindow`] and classifies the whole window. See
//! [`pipeline::Pipeline`] for the entry point.

pub mod buffer;
#[cfg(not(target_os = "espidf"))]
pub mod cli;
pub mod config;
pub mod drivers;
pub mod ei;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod preprocess;
pub mod tasks;

pub use config::PipelineConfig;
pub use error::{BufferError, ClassifierError, ConfigError, Overrun, SensorError};
pub use pipeline::{Pipeline, RunFlag};
