//! Loudness normalizer
//!
//! Estimates the buffer's loudness from its RMS and applies the flat gain
//! that moves it to the target, bounded to [0.1, 3.0].

use crate::analysis::{self, db_to_gain};
use crate::error::Result;
use crate::stage::{scale, Stage};

/// Lower bound on the normalization gain
pub const MIN_GAIN: f32 = 0.1;

/// Upper bound on the normalization gain
pub const MAX_GAIN: f32 = 3.0;

/// RMS-based loudness normalizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    target_lufs: f32,
}

impl Normalizer {
    /// Create a normalizer aiming at `target_lufs`
    pub fn new(target_lufs: f32) -> Self {
        Self { target_lufs }
    }

    pub fn target_lufs(&self) -> f32 {
        self.target_lufs
    }

    /// Gain this normalizer would apply to `buffer`
    pub fn gain_for(&self, buffer: &[f32]) -> f32 {
        let current_lufs = analysis::lufs_estimate(analysis::rms(buffer));
        db_to_gain(self.target_lufs - current_lufs).clamp(MIN_GAIN, MAX_GAIN)
    }
}

impl Stage for Normalizer {
    fn name(&self) -> &'static str {
        "normalizer"
    }

    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        let gain = self.gain_for(buffer);
        scale(buffer, gain);
        Ok(())
    }
}
