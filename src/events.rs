// Wand Inference - Samples, Results & Pipeline Events

use std::fmt;

use crate::config::{CONVERT_G_TO_MS2, NUM_CHANNELS};

// ---------------------------------------------------------------------------
// Sensor Data (6-axis IMU reading)
// ---------------------------------------------------------------------------
/// One IMU reading. Accel in g, gyro in °/s as read from the sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorData {
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
}

impl SensorData {
    pub fn from_parts(accel: (f32, f32, f32), gyro: (f32, f32, f32)) -> Self {
        Self {
            ax: accel.0,
            ay: accel.1,
            az: accel.2,
            gx: gyro.0,
            gy: gyro.1,
            gz: gyro.2,
        }
    }

    /// Flatten into slab order with accelerometer converted to m/s².
    /// The gyroscope passes through untouched.
    pub fn to_channels(&self) -> [f32; NUM_CHANNELS] {
        [
            self.ax * CONVERT_G_TO_MS2,
            self.ay * CONVERT_G_TO_MS2,
            self.az * CONVERT_G_TO_MS2,
            self.gx,
            self.gy,
            self.gz,
        ]
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    pub dsp_ms: u32,
    pub inference_ms: u32,
    pub anomaly_ms: u32,
}

/// Output of one classifier invocation. Scores are in label order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub scores: Vec<f32>,
    pub timing: Timing,
    pub anomaly: Option<f32>,
}

/// The contractual answer for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Label { label: String, score: f32 },
    Anomaly { score: f32 },
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label { label, score } => write!(f, "ANS: {}, {:.6}", label, score),
            Self::Anomaly { score } => write!(f, "ANS: anomaly, {:.6}", score),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports - sent to the top-level loop via channel
// ---------------------------------------------------------------------------
/// Everything printed for one inference cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceReport {
    /// 1-based count of completed inferences.
    pub cycle: u64,
    pub timing: Timing,
    pub predictions: Vec<(String, f32)>,
    pub anomaly: Option<f32>,
    pub answer: Answer,
    /// Set once every `slices_per_window` inferences.
    pub window_complete: bool,
}

impl fmt::Display for InferenceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run_classifier returned: 0")?;
        writeln!(
            f,
            "Timing: DSP {} ms, inference {} ms, anomaly {} ms",
            self.timing.dsp_ms, self.timing.inference_ms, self.timing.anomaly_ms
        )?;
        writeln!(f, "Predictions:")?;
        for (label, score) in &self.predictions {
            writeln!(f, "  {}: {:.5}", label, score)?;
        }
        if let Some(anomaly) = self.anomaly {
            writeln!(f, "Anomaly: {:.3}", anomaly)?;
        }
        writeln!(f, "{}", self.answer)?;
        if self.window_complete {
            writeln!(f, "^^^")?;
        }
        write!(f, "---")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A completed inference cycle.
    Report(InferenceReport),
    /// One slab was overwritten before it could be drained.
    Overrun,
    /// The classifier failed; the cycle was skipped.
    ClassifierFailed { status: i32, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_accel_only() {
        let data = SensorData::from_parts((1.0, -0.5, 0.0), (10.0, 20.0, -30.0));
        let ch = data.to_channels();
        assert!((ch[0] - 9.80665).abs() < 1e-6);
        assert!((ch[1] + 4.903325).abs() < 1e-6);
        assert_eq!(ch[2], 0.0);
        assert_eq!(&ch[3..], &[10.0, 20.0, -30.0]);
    }

    #[test]
    fn answer_lines() {
        let label = Answer::Label { label: "beta".into(), score: 0.9 };
        assert_eq!(label.to_string(), "ANS: beta, 0.900000");
        assert_eq!(Answer::Anomaly { score: 0.35 }.to_string(), "ANS: anomaly, 0.350000");
    }

    #[test]
    fn report_layout() {
        let report = InferenceReport {
            cycle: 6,
            timing: Timing { dsp_ms: 1, inference_ms: 2, anomaly_ms: 0 },
            predictions: vec![("alpha".into(), 0.25), ("beta".into(), 0.75)],
            anomaly: Some(0.1),
            answer: Answer::Label { label: "beta".into(), score: 0.75 },
            window_complete: true,
        };
        let text = report.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "run_classifier returned: 0",
                "Timing: DSP 1 ms, inference 2 ms, anomaly 0 ms",
                "Predictions:",
                "  alpha: 0.25000",
                "  beta: 0.75000",
                "Anomaly: 0.100",
                "ANS: beta, 0.750000",
                "^^^",
                "---",
            ]
        );
    }
}
