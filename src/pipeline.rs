// Wand Inference - Pipeline Orchestration
//
// Owns the shared buffers, spawns the sampling and inference tasks, and joins
// them on stop. Both tasks watch the same `RunFlag`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context};

use crate::buffer::DoubleBuffer;
use crate::config::{PipelineConfig, STACK_INFERENCE, STACK_SAMPLING};
use crate::drivers::SampleSource;
use crate::ei::Classifier;
use crate::events::PipelineEvent;
use crate::tasks::ai::InferenceLoop;
use crate::tasks::sensor::SamplingLoop;

/// Cooperative cancellation shared by the controller and both tasks.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Pipeline {
    running: RunFlag,
    sampling: JoinHandle<()>,
    inference: JoinHandle<()>,
}

impl Pipeline {
    /// Validate `config`, allocate the buffers and start both tasks.
    ///
    /// Reports arrive on `events`; the channel closes once the inference task
    /// has exited.
    pub fn start<S, C>(
        source: S,
        classifier: C,
        config: &PipelineConfig,
        events: Sender<PipelineEvent>,
    ) -> anyhow::Result<Self>
    where
        S: SampleSource + 'static,
        C: Classifier + 'static,
    {
        config.validate().context("invalid pipeline configuration")?;

        let buffers = Arc::new(DoubleBuffer::new(config.samples_per_slice()));
        let running = RunFlag::new();

        log::info!("Raw size: {}", buffers.slab_len());
        log::info!("Ring size: {}", config.window_scalars());

        let inference = InferenceLoop::new(
            Arc::clone(&buffers),
            classifier,
            config,
            running.clone(),
            events,
        )?;
        let sampling =
            SamplingLoop::new(source, buffers, config.sampling_period(), running.clone());

        let inference = thread::Builder::new()
            .name("inference".into())
            .stack_size(STACK_INFERENCE)
            .spawn(move || inference.run())
            .context("failed to spawn inference task")?;

        let sampling = match thread::Builder::new()
            .name("sampling".into())
            .stack_size(STACK_SAMPLING)
            .spawn(move || sampling.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                running.stop();
                let _ = inference.join();
                return Err(e).context("failed to spawn sampling task");
            }
        };

        Ok(Self {
            running,
            sampling,
            inference,
        })
    }

    /// Flag for cancelling the pipeline from another thread while this one joins.
    pub fn running(&self) -> RunFlag {
        self.running.clone()
    }

    /// True once both tasks have exited on their own.
    pub fn is_finished(&self) -> bool {
        self.sampling.is_finished() && self.inference.is_finished()
    }

    /// Cancel both tasks and wait for them.
    pub fn stop(self) -> anyhow::Result<()> {
        self.running.stop();
        self.join()
    }

    /// Wait for the inference task to finish (end of stream, cancellation or
    /// a closed report channel), then stop and join the sampling task.
    pub fn join(self) -> anyhow::Result<()> {
        let inference = self.inference.join();
        // Nobody drains slabs any more.
        self.running.stop();
        let sampling = self.sampling.join();

        inference.map_err(|_| anyhow!("inference task panicked"))?;
        sampling.map_err(|_| anyhow!("sampling task panicked"))?;
        log::info!("Pipeline stopped");
        Ok(())
    }
}
