// Wand Inference - Standardization
//
// Per-channel z-score using fixed dataset statistics. Applied by the
// inference task while copying a drained slab into the ring window.

use crate::config::NUM_CHANNELS;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    means: [f32; NUM_CHANNELS],
    std_devs: [f32; NUM_CHANNELS],
}

impl Standardizer {
    /// Fails on a zero, negative or non-finite standard deviation.
    pub fn new(
        means: [f32; NUM_CHANNELS],
        std_devs: [f32; NUM_CHANNELS],
    ) -> Result<Self, ConfigError> {
        for (channel, &std_dev) in std_devs.iter().enumerate() {
            if !std_dev.is_finite() || std_dev <= 0.0 {
                return Err(ConfigError::InvalidStdDev { channel, std_dev });
            }
        }
        Ok(Self { means, std_devs })
    }

    /// Mean 0, std-dev 1 on every channel.
    pub fn identity() -> Self {
        Self {
            means: [0.0; NUM_CHANNELS],
            std_devs: [1.0; NUM_CHANNELS],
        }
    }

    pub fn apply(&self, sample: &[f32; NUM_CHANNELS]) -> [f32; NUM_CHANNELS] {
        let mut out = [0.0; NUM_CHANNELS];
        for (ch, value) in out.iter_mut().enumerate() {
            *value = (sample[ch] - self.means[ch]) / self.std_devs[ch];
        }
        out
    }

    /// Standardize a run of interleaved samples. Both slices must have the
    /// same length, a multiple of [`NUM_CHANNELS`].
    pub fn apply_interleaved(&self, raw: &[f32], out: &mut [f32]) {
        debug_assert_eq!(raw.len(), out.len());
        for (src, dst) in raw
            .chunks_exact(NUM_CHANNELS)
            .zip(out.chunks_exact_mut(NUM_CHANNELS))
        {
            for ch in 0..NUM_CHANNELS {
                dst[ch] = (src[ch] - self.means[ch]) / self.std_devs[ch];
            }
        }
    }
}
