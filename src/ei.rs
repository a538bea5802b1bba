// Wand Inference - Edge Impulse Inference Interface
//
// The inference task only needs one thing from the model: hand it a pull-based
// view of the standardized window and get per-class scores back.
//
// Back-ends:
//   1. STUB mode (default) - a small heuristic so the pipeline can be run and
//      tested without the C++ Edge Impulse SDK compiled in.
//   2. FFI mode - enable the `edge-impulse` feature; build.rs compiles the SDK
//      and the C shim in ffi/ei_shim.cpp and this module calls through it.

use std::time::Instant;

use crate::buffer::RingWindow;
use crate::config::{LABELS, NUM_CHANNELS};
use crate::error::{BufferError, ClassifierError};
use crate::events::{Answer, ClassificationResult, Timing};

// ---------------------------------------------------------------------------
// Public interface
// ---------------------------------------------------------------------------

/// Pull interface the classifier reads its input through.
pub trait Signal {
    fn total_length(&self) -> usize;

    /// Fill `out` with the scalars at `offset..offset + out.len()`.
    fn get_data(&self, offset: usize, out: &mut [f32]) -> Result<(), ClassifierError>;
}

impl Signal for RingWindow {
    fn total_length(&self) -> usize {
        self.capacity()
    }

    fn get_data(&self, offset: usize, out: &mut [f32]) -> Result<(), ClassifierError> {
        self.read_range(offset, out).map_err(|e| match e {
            BufferError::OutOfBounds {
                offset,
                length,
                capacity,
            } => ClassifierError::SignalOutOfRange {
                offset,
                length,
                total: capacity,
            },
            _ => ClassifierError::Status(-1),
        })
    }
}

pub trait Classifier: Send {
    /// Class labels in score order.
    fn labels(&self) -> &[&str];

    fn classify(&mut self, signal: &dyn Signal) -> Result<ClassificationResult, ClassifierError>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn labels(&self) -> &[&str] {
        (**self).labels()
    }

    fn classify(&mut self, signal: &dyn Signal) -> Result<ClassificationResult, ClassifierError> {
        (**self).classify(signal)
    }
}

/// Index of the highest score. Ties keep the earliest index.
pub fn arg_max(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        match best {
            Some((_, max)) if score > max => best = Some((idx, score)),
            None => best = Some((idx, score)),
            _ => {}
        }
    }
    best.map(|(idx, _)| idx)
}

/// Pick the reported answer: the arg-max label, unless the anomaly score
/// exceeds `anomaly_threshold`.
pub fn select_answer(
    result: &ClassificationResult,
    labels: &[&str],
    anomaly_threshold: f32,
) -> Result<Answer, ClassifierError> {
    if result.scores.len() != labels.len() || labels.is_empty() {
        return Err(ClassifierError::LabelCount {
            expected: labels.len(),
            actual: result.scores.len(),
        });
    }

    if let Some(anomaly) = result.anomaly {
        if anomaly > anomaly_threshold {
            return Ok(Answer::Anomaly { score: anomaly });
        }
    }

    let best = arg_max(&result.scores).ok_or(ClassifierError::LabelCount {
        expected: labels.len(),
        actual: 0,
    })?;
    Ok(Answer::Label {
        label: labels[best].to_string(),
        score: result.scores[best],
    })
}

/// The back-end selected at build time.
pub fn default_classifier() -> anyhow::Result<Box<dyn Classifier>> {
    #[cfg(feature = "edge-impulse")]
    {
        return Ok(Box::new(ffi::EdgeImpulseClassifier::new()?));
    }

    #[cfg(not(feature = "edge-impulse"))]
    {
        return Ok(Box::new(StubClassifier::new()));
    }
}

// ---------------------------------------------------------------------------
// Stub back-end - development / testing without the C++ SDK
// ---------------------------------------------------------------------------

/// Outlier threshold (in standard deviations) for the stub anomaly score.
const STUB_OUTLIER_Z: f32 = 3.0;

pub struct StubClassifier {
    scratch: Vec<f32>,
}

impl StubClassifier {
    pub fn new() -> Self {
        Self {
            scratch: vec![0.0; NUM_CHANNELS],
        }
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for StubClassifier {
    fn labels(&self) -> &[&str] {
        &LABELS
    }

    fn classify(&mut self, signal: &dyn Signal) -> Result<ClassificationResult, ClassifierError> {
        let dsp_start = Instant::now();
        let total = signal.total_length();
        if total == 0 {
            return Err(ClassifierError::SignalOutOfRange {
                offset: 0,
                length: 0,
                total,
            });
        }

        // Pull one frame at a time, the way the DSP block walks the signal.
        let mut sum_abs = 0.0f32;
        let mut outliers = 0usize;
        let mut offset = 0;
        while offset < total {
            let len = NUM_CHANNELS.min(total - offset);
            let frame = &mut self.scratch[..len];
            signal.get_data(offset, frame)?;
            for &v in frame.iter() {
                sum_abs += v.abs();
                if v.abs() > STUB_OUTLIER_Z {
                    outliers += 1;
                }
            }
            offset += len;
        }
        let dsp_ms = dsp_start.elapsed().as_millis() as u32;

        let mean_abs = sum_abs / total as f32;
        let scores = if mean_abs < 0.3 {
            vec![0.03, 0.04, 0.03, 0.90] // other (resting)
        } else if mean_abs < 0.8 {
            vec![0.85, 0.05, 0.05, 0.05]
        } else if mean_abs < 1.5 {
            vec![0.05, 0.88, 0.04, 0.03]
        } else {
            vec![0.03, 0.03, 0.92, 0.02]
        };
        let anomaly = outliers as f32 / total as f32;

        log::debug!(
            "STUB inference - mean |z| = {:.2}, outliers = {}, preds = {:?}",
            mean_abs,
            outliers,
            scores
        );

        Ok(ClassificationResult {
            scores,
            timing: Timing {
                dsp_ms,
                inference_ms: 0,
                anomaly_ms: 0,
            },
            anomaly: Some(anomaly),
        })
    }
}

// ---------------------------------------------------------------------------
// Real FFI back-end - calls the C++ Edge Impulse compiled library
// ---------------------------------------------------------------------------
#[cfg(feature = "edge-impulse")]
mod ffi {
    use std::cell::Cell;

    use super::{Classifier, ClassificationResult, ClassifierError, Signal, Timing};
    use crate::config::LABELS;
    use crate::error::ConfigError;

    #[repr(C)]
    #[derive(Default)]
    struct WandTiming {
        dsp_ms: i32,
        classification_ms: i32,
        anomaly_ms: i32,
    }

    type GetDataFn = unsafe extern "C" fn(usize, usize, *mut f32) -> i32;

    extern "C" {
        fn wand_label_count() -> usize;
        fn wand_input_frame_size() -> usize;
        fn wand_run_classifier(
            get_data: GetDataFn,
            total_length: usize,
            scores: *mut f32,
            score_count: usize,
            timing: *mut WandTiming,
            anomaly: *mut f32,
            has_anomaly: *mut i32,
        ) -> i32;
    }

    // EIDSP_OK / EIDSP_OUT_OF_BOUNDS
    const DSP_OK: i32 = 0;
    const DSP_OUT_OF_BOUNDS: i32 = -1002;

    thread_local! {
        // Signal being classified on this thread; set only for the duration
        // of one wand_run_classifier call.
        static ACTIVE_SIGNAL: Cell<Option<*const (dyn Signal + 'static)>> = const { Cell::new(None) };
    }

    struct ActiveSignal;

    impl ActiveSignal {
        fn set(signal: &dyn Signal) -> Self {
            let ptr: *const (dyn Signal + '_) = signal;
            // SAFETY: the pointer is cleared when the guard drops, before the
            // borrow it came from ends.
            let ptr: *const (dyn Signal + 'static) = unsafe { std::mem::transmute(ptr) };
            ACTIVE_SIGNAL.with(|s| s.set(Some(ptr)));
            ActiveSignal
        }
    }

    impl Drop for ActiveSignal {
        fn drop(&mut self) {
            ACTIVE_SIGNAL.with(|s| s.set(None));
        }
    }

    unsafe extern "C" fn get_data(offset: usize, length: usize, out: *mut f32) -> i32 {
        let Some(ptr) = ACTIVE_SIGNAL.with(|s| s.get()) else {
            return DSP_OUT_OF_BOUNDS;
        };
        if out.is_null() {
            return DSP_OUT_OF_BOUNDS;
        }
        // SAFETY: the SDK hands us a buffer of `length` floats and the signal
        // outlives the classifier call (see ActiveSignal).
        let (signal, out) = unsafe { (&*ptr, std::slice::from_raw_parts_mut(out, length)) };
        match signal.get_data(offset, out) {
            Ok(()) => DSP_OK,
            Err(_) => DSP_OUT_OF_BOUNDS,
        }
    }

    pub struct EdgeImpulseClassifier {
        scores: Vec<f32>,
    }

    impl EdgeImpulseClassifier {
        pub fn new() -> Result<Self, ConfigError> {
            // SAFETY: plain getters over compile-time constants.
            let label_count = unsafe { wand_label_count() };
            if label_count != LABELS.len() {
                return Err(ConfigError::LabelMismatch {
                    expected: LABELS.len(),
                    actual: label_count,
                });
            }
            log::info!(
                "Edge Impulse model: {} labels, input frame {}",
                label_count,
                unsafe { wand_input_frame_size() }
            );
            Ok(Self {
                scores: vec![0.0; label_count],
            })
        }
    }

    impl Classifier for EdgeImpulseClassifier {
        fn labels(&self) -> &[&str] {
            &LABELS
        }

        fn classify(
            &mut self,
            signal: &dyn Signal,
        ) -> Result<ClassificationResult, ClassifierError> {
            let _active = ActiveSignal::set(signal);

            let mut timing = WandTiming::default();
            let mut anomaly = 0.0f32;
            let mut has_anomaly = 0i32;

            // SAFETY: all out-pointers reference live locals / owned buffers
            // sized as declared.
            let err = unsafe {
                wand_run_classifier(
                    get_data,
                    signal.total_length(),
                    self.scores.as_mut_ptr(),
                    self.scores.len(),
                    &mut timing,
                    &mut anomaly,
                    &mut has_anomaly,
                )
            };
            if err != 0 {
                log::error!("Edge Impulse classifier error: {}", err);
                return Err(ClassifierError::Status(err));
            }

            Ok(ClassificationResult {
                scores: self.scores.clone(),
                timing: Timing {
                    dsp_ms: timing.dsp_ms.max(0) as u32,
                    inference_ms: timing.classification_ms.max(0) as u32,
                    anomaly_ms: timing.anomaly_ms.max(0) as u32,
                },
                anomaly: (has_anomaly != 0).then_some(anomaly),
            })
        }
    }
}
