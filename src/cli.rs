// Wand Inference - Host Command Line

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{PipelineConfig, INFERENCE_POLL_INTERVAL_MS};

/// Replay recorded IMU data through the inference pipeline.
#[derive(Debug, Parser)]
#[command(name = "wand-inference")]
#[command(version)]
#[command(about = "Continuous gesture inference over recorded IMU data", long_about = None)]
pub struct Args {
    /// CSV recordings, replayed back to back
    #[arg(required = true)]
    pub recordings: Vec<PathBuf>,

    /// How often the inference task polls for a full slab
    #[arg(long, default_value_t = INFERENCE_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
}

impl Args {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            ..PipelineConfig::default()
        }
    }
}
