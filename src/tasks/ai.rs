// Wand Inference - AI Inference Task
//
// Waits for the sampling task to hand off a full slab, standardizes it into the
// next slice of the ring window, runs the classifier over the whole window and
// forwards the report to the top-level loop.
//
// Overrun policy: overruns are checked at the top of every cycle. Each one is
// logged and reported as its own event and the cycle is skipped; the next
// cycle drains the newest slab. Nothing halts.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::buffer::{DoubleBuffer, RingWindow};
use crate::config::PipelineConfig;
use crate::ei::{self, Classifier};
use crate::error::ConfigError;
use crate::events::{InferenceReport, PipelineEvent};
use crate::pipeline::RunFlag;
use crate::preprocess::Standardizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceState {
    WaitingForSlab,
    Draining,
    Standardizing,
    Classifying,
    Reporting,
    Stopped,
}

/// What one pass through the loop did.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Overruns were reported; nothing was drained.
    SkippedOverrun(u64),
    Reported(InferenceReport),
    ClassifierFailed,
    NothingToDrain,
    Stopped,
}

pub struct InferenceLoop<C> {
    buffers: Arc<DoubleBuffer>,
    window: RingWindow,
    standardizer: Standardizer,
    classifier: C,
    anomaly_threshold: f32,
    poll_interval: Duration,
    running: RunFlag,
    events: Sender<PipelineEvent>,
    state: InferenceState,
    cycles: u64,
}

impl<C: Classifier> InferenceLoop<C> {
    pub fn new(
        buffers: Arc<DoubleBuffer>,
        classifier: C,
        config: &PipelineConfig,
        running: RunFlag,
        events: Sender<PipelineEvent>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let standardizer = Standardizer::new(config.means, config.std_devs)?;
        if classifier.labels().is_empty() {
            return Err(ConfigError::NoLabels);
        }

        Ok(Self {
            window: RingWindow::new(config.slices_per_window, buffers.slab_len()),
            buffers,
            standardizer,
            classifier,
            anomaly_threshold: config.anomaly_threshold,
            poll_interval: config.poll_interval,
            running,
            events,
            state: InferenceState::WaitingForSlab,
            cycles: 0,
        })
    }

    pub fn state(&self) -> InferenceState {
        self.state
    }

    pub fn window(&self) -> &RingWindow {
        &self.window
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    fn enter(&mut self, state: InferenceState) {
        log::trace!("inference {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn emit(&self, event: PipelineEvent) {
        if self.events.send(event).is_err() {
            // Nobody is listening; wind the whole pipeline down.
            log::warn!("Report channel closed - stopping pipeline");
            self.running.stop();
        }
    }

    /// Report and clear overruns recorded by the sampling task.
    fn check_overruns(&mut self) -> u64 {
        let overruns = self.buffers.take_overruns();
        for _ in 0..overruns {
            log::error!("ERROR: Buffer overrun");
            self.emit(PipelineEvent::Overrun);
        }
        overruns
    }

    /// Poll until a slab is ready. `false` when stopped, or when the stream
    /// has ended and nothing is left to drain.
    fn wait_for_slab(&self) -> bool {
        loop {
            if !self.running.is_running() {
                return false;
            }
            if self.buffers.is_ready() {
                return true;
            }
            if self.buffers.is_closed() {
                // The producer may have handed off right before closing.
                return self.buffers.is_ready();
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Standardize the ready slab into the next ring slice. Returns the slice
    /// written, or `None` if no slab was pending.
    fn drain(&mut self) -> Option<usize> {
        self.enter(InferenceState::Draining);
        let buffers = Arc::clone(&self.buffers);
        let slab = buffers.take_ready()?;

        self.enter(InferenceState::Standardizing);
        let standardizer = &self.standardizer;
        let slice = self
            .window
            .fill_next(|dst| standardizer.apply_interleaved(&slab, dst));
        drop(slab);
        Some(slice)
    }

    fn classify(&mut self) -> StepOutcome {
        self.enter(InferenceState::Classifying);
        let result = match self.classifier.classify(&self.window) {
            Ok(result) => result,
            Err(e) => {
                log::error!("run_classifier failed: {}", e);
                self.emit(PipelineEvent::ClassifierFailed {
                    status: e.status_code(),
                    message: e.to_string(),
                });
                return StepOutcome::ClassifierFailed;
            }
        };

        let (answer, predictions) = {
            let labels = self.classifier.labels();
            let predictions: Vec<(String, f32)> = labels
                .iter()
                .map(|l| l.to_string())
                .zip(result.scores.iter().copied())
                .collect();
            (
                ei::select_answer(&result, labels, self.anomaly_threshold),
                predictions,
            )
        };
        let answer = match answer {
            Ok(answer) => answer,
            Err(e) => {
                log::error!("Unusable classifier result: {}", e);
                self.emit(PipelineEvent::ClassifierFailed {
                    status: e.status_code(),
                    message: e.to_string(),
                });
                return StepOutcome::ClassifierFailed;
            }
        };

        self.enter(InferenceState::Reporting);
        self.cycles += 1;
        let report = InferenceReport {
            cycle: self.cycles,
            timing: result.timing,
            predictions,
            anomaly: result.anomaly,
            answer,
            window_complete: self.cycles % self.window.slices() as u64 == 0,
        };
        log::debug!("cycle {}: {}", report.cycle, report.answer);
        self.emit(PipelineEvent::Report(report.clone()));
        StepOutcome::Reported(report)
    }

    /// One pass: overrun check, wait, overrun check, drain, classify, report.
    pub fn step(&mut self) -> StepOutcome {
        self.enter(InferenceState::WaitingForSlab);

        let overruns = self.check_overruns();
        if overruns > 0 {
            return StepOutcome::SkippedOverrun(overruns);
        }

        if !self.wait_for_slab() {
            self.enter(InferenceState::Stopped);
            return StepOutcome::Stopped;
        }

        // The producer may have lapped us while we slept in the poll.
        let overruns = self.check_overruns();
        if overruns > 0 {
            return StepOutcome::SkippedOverrun(overruns);
        }

        if self.drain().is_none() {
            log::warn!("Ready flag raised without a slab to drain");
            return StepOutcome::NothingToDrain;
        }

        self.classify()
    }

    pub fn run(mut self) {
        log::info!(
            "Inference task started ({} slices of {} scalars)",
            self.window.slices(),
            self.window.slice_len()
        );

        while self.step() != StepOutcome::Stopped {}

        // Anything left over still counts.
        self.check_overruns();
        log::info!("Inference task stopped after {} inferences", self.cycles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NUM_CHANNELS;
    use crate::ei::Signal;
    use crate::error::ClassifierError;
    use crate::events::{Answer, ClassificationResult, Timing};
    use std::sync::mpsc;

    /// Records every window it is shown and returns scripted scores.
    struct Recorder {
        windows: Vec<Vec<f32>>,
        scores: Vec<f32>,
        anomaly: Option<f32>,
        fail: bool,
    }

    impl Recorder {
        fn new(scores: &[f32], anomaly: Option<f32>) -> Self {
            Self {
                windows: Vec::new(),
                scores: scores.to_vec(),
                anomaly,
                fail: false,
            }
        }
    }

    impl Classifier for Recorder {
        fn labels(&self) -> &[&str] {
            &["alpha", "beta", "gamma"]
        }

        fn classify(
            &mut self,
            signal: &dyn Signal,
        ) -> Result<ClassificationResult, ClassifierError> {
            if self.fail {
                return Err(ClassifierError::Status(-3));
            }
            let mut window = vec![0.0; signal.total_length()];
            signal.get_data(0, &mut window)?;
            self.windows.push(window);
            Ok(ClassificationResult {
                scores: self.scores.clone(),
                timing: Timing { dsp_ms: 1, inference_ms: 2, anomaly_ms: 0 },
                anomaly: self.anomaly,
            })
        }
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            window_len: 6,
            slices_per_window: 3,
            means: [0.0; NUM_CHANNELS],
            std_devs: [1.0; NUM_CHANNELS],
            poll_interval: Duration::from_millis(1),
            ..PipelineConfig::default()
        }
    }

    fn setup(
        classifier: Recorder,
        config: &PipelineConfig,
    ) -> (Arc<DoubleBuffer>, InferenceLoop<Recorder>, mpsc::Receiver<PipelineEvent>) {
        let buffers = Arc::new(DoubleBuffer::new(config.samples_per_slice()));
        let (tx, rx) = mpsc::channel();
        let inference =
            InferenceLoop::new(Arc::clone(&buffers), classifier, config, RunFlag::new(), tx)
                .unwrap();
        (buffers, inference, rx)
    }

    /// Push one slab of samples tagged with `tag` and hand it off.
    fn produce(buffers: &DoubleBuffer, tag: f32) {
        let samples = buffers.slab_len() / NUM_CHANNELS;
        for i in 0..samples {
            let v = tag + i as f32 / 10.0;
            buffers.write(&[v; NUM_CHANNELS]);
        }
        let _ = buffers.try_swap();
    }

    fn slab_values(buffers: &DoubleBuffer, tag: f32) -> Vec<f32> {
        let samples = buffers.slab_len() / NUM_CHANNELS;
        (0..samples)
            .flat_map(|i| [tag + i as f32 / 10.0; NUM_CHANNELS])
            .collect()
    }

    #[test]
    fn warms_up_one_slice_per_fill() {
        let config = small_config();
        let (buffers, mut inference, rx) = setup(Recorder::new(&[0.2, 0.7, 0.1], None), &config);

        for fill in 1..=3 {
            produce(&buffers, fill as f32);
            assert!(matches!(inference.step(), StepOutcome::Reported(_)));
            assert_eq!(inference.state(), InferenceState::Reporting);

            let window = inference.classifier().windows.last().unwrap();
            let nonzero_slices = window
                .chunks(buffers.slab_len())
                .filter(|s| s.iter().any(|&v| v != 0.0))
                .count();
            assert_eq!(nonzero_slices, fill);
        }
        assert_eq!(inference.classifier().windows.len(), 3);

        let reports: Vec<PipelineEvent> = rx.try_iter().collect();
        assert_eq!(reports.len(), 3);
        match &reports[2] {
            PipelineEvent::Report(r) => {
                assert_eq!(r.cycle, 3);
                assert!(r.window_complete);
                assert_eq!(r.answer.to_string(), "ANS: beta, 0.700000");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn window_holds_latest_slabs_in_order() {
        let config = small_config();
        let (buffers, mut inference, _rx) =
            setup(Recorder::new(&[0.2, 0.7, 0.1], None), &config);

        for fill in 1..=5 {
            produce(&buffers, fill as f32);
            inference.step();
        }
        let expected: Vec<f32> = [3.0, 4.0, 5.0]
            .iter()
            .flat_map(|&t| slab_values(&buffers, t))
            .collect();
        assert_eq!(inference.classifier().windows.last().unwrap(), &expected);
    }

    #[test]
    fn standardizes_while_draining() {
        let mut config = small_config();
        config.means = [1.0; NUM_CHANNELS];
        config.std_devs = [2.0; NUM_CHANNELS];
        let (buffers, mut inference, _rx) =
            setup(Recorder::new(&[0.2, 0.7, 0.1], None), &config);

        produce(&buffers, 5.0);
        inference.step();
        let window = inference.classifier().windows.last().unwrap();
        // Newest slice sits at the end of the time-ordered window.
        let newest = &window[window.len() - buffers.slab_len()..];
        assert_eq!(newest[0], (5.0 - 1.0) / 2.0);
    }

    #[test]
    fn anomaly_beats_arg_max() {
        let config = small_config();
        let (buffers, mut inference, _rx) =
            setup(Recorder::new(&[0.05, 0.9, 0.05], Some(0.35)), &config);
        produce(&buffers, 1.0);
        match inference.step() {
            StepOutcome::Reported(r) => {
                assert_eq!(r.answer, Answer::Anomaly { score: 0.35 });
                assert!(r.to_string().contains("ANS: anomaly, 0.350000"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn overrun_skips_cycle_then_drains_newest() {
        let config = small_config();
        let (buffers, mut inference, rx) = setup(Recorder::new(&[0.2, 0.7, 0.1], None), &config);

        produce(&buffers, 1.0);
        produce(&buffers, 2.0);
        produce(&buffers, 3.0);

        assert_eq!(inference.step(), StepOutcome::SkippedOverrun(2));
        assert!(inference.classifier().windows.is_empty());

        assert!(matches!(inference.step(), StepOutcome::Reported(_)));
        let window = inference.classifier().windows.last().unwrap();
        let newest = &window[window.len() - buffers.slab_len()..];
        assert_eq!(newest, slab_values(&buffers, 3.0).as_slice());

        let overruns = rx
            .try_iter()
            .filter(|e| *e == PipelineEvent::Overrun)
            .count();
        assert_eq!(overruns, 2);
    }

    #[test]
    fn overrun_during_poll_is_reported_before_drain() {
        let mut config = small_config();
        config.poll_interval = Duration::from_millis(300);
        let (buffers, mut inference, rx) = setup(Recorder::new(&[0.2, 0.7, 0.1], None), &config);

        let producer = {
            let buffers = Arc::clone(&buffers);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                produce(&buffers, 1.0);
                produce(&buffers, 2.0);
            })
        };

        // Nothing is ready on entry, so the overrun lands while we poll.
        assert_eq!(inference.step(), StepOutcome::SkippedOverrun(1));
        producer.join().unwrap();
        assert!(inference.classifier().windows.is_empty());
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![PipelineEvent::Overrun]);

        assert!(matches!(inference.step(), StepOutcome::Reported(_)));
        let window = inference.classifier().windows.last().unwrap();
        let newest = &window[window.len() - buffers.slab_len()..];
        assert_eq!(newest, slab_values(&buffers, 2.0).as_slice());
        assert!(matches!(rx.try_recv(), Ok(PipelineEvent::Report(_))));
    }

    #[test]
    fn rejects_classifier_without_labels() {
        struct Unlabelled;

        impl Classifier for Unlabelled {
            fn labels(&self) -> &[&str] {
                &[]
            }

            fn classify(
                &mut self,
                _signal: &dyn Signal,
            ) -> Result<ClassificationResult, ClassifierError> {
                Err(ClassifierError::Status(-1))
            }
        }

        let config = small_config();
        let buffers = Arc::new(DoubleBuffer::new(config.samples_per_slice()));
        let (tx, _rx) = mpsc::channel();
        let result = InferenceLoop::new(buffers, Unlabelled, &config, RunFlag::new(), tx);
        assert!(matches!(result, Err(ConfigError::NoLabels)));
    }

    #[test]
    fn classifier_failure_does_not_stop_loop() {
        let config = small_config();
        let mut recorder = Recorder::new(&[0.2, 0.7, 0.1], None);
        recorder.fail = true;
        let (buffers, mut inference, rx) = setup(recorder, &config);

        produce(&buffers, 1.0);
        assert_eq!(inference.step(), StepOutcome::ClassifierFailed);
        assert!(matches!(
            rx.try_recv(),
            Ok(PipelineEvent::ClassifierFailed { status: -3, .. })
        ));

        inference.classifier.fail = false;
        produce(&buffers, 2.0);
        assert!(matches!(inference.step(), StepOutcome::Reported(_)));
    }

    #[test]
    fn stops_when_stream_closed_and_drained() {
        let config = small_config();
        let (buffers, mut inference, _rx) =
            setup(Recorder::new(&[0.2, 0.7, 0.1], None), &config);

        produce(&buffers, 1.0);
        buffers.close();
        assert!(matches!(inference.step(), StepOutcome::Reported(_)));
        assert_eq!(inference.step(), StepOutcome::Stopped);
        assert_eq!(inference.state(), InferenceState::Stopped);
    }

    #[test]
    fn stops_promptly_when_cancelled() {
        let config = small_config();
        let buffers = Arc::new(DoubleBuffer::new(config.samples_per_slice()));
        let (tx, _rx) = mpsc::channel();
        let running = RunFlag::new();
        let inference = InferenceLoop::new(
            Arc::clone(&buffers),
            Recorder::new(&[0.2, 0.7, 0.1], None),
            &config,
            running.clone(),
            tx,
        )
        .unwrap();

        let handle = thread::spawn(move || inference.run());
        thread::sleep(Duration::from_millis(20));
        running.stop();
        handle.join().unwrap();
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = small_config();
        config.std_devs[0] = 0.0;
        let buffers = Arc::new(DoubleBuffer::new(2));
        let (tx, _rx) = mpsc::channel();
        let result = InferenceLoop::new(
            buffers,
            Recorder::new(&[0.2, 0.7, 0.1], None),
            &config,
            RunFlag::new(),
            tx,
        );
        assert!(matches!(result, Err(ConfigError::InvalidStdDev { channel: 0, .. })));
    }
}
