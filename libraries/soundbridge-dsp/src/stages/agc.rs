//! Automatic gain control
//!
//! Pulls the buffer's RMS towards a fixed target. The gain is bounded to
//! [0.5, 2.0] so a single chunk can never more than double or halve.

use crate::analysis;
use crate::error::Result;
use crate::stage::{scale, Stage};

/// RMS level the AGC steers towards
pub const TARGET_RMS: f32 = 0.1;

/// Gain bounds applied by the AGC
pub const GAIN_RANGE: (f32, f32) = (0.5, 2.0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoGainControl {
    target_rms: f32,
    min_gain: f32,
    max_gain: f32,
}

impl Default for AutoGainControl {
    fn default() -> Self {
        Self {
            target_rms: TARGET_RMS,
            min_gain: GAIN_RANGE.0,
            max_gain: GAIN_RANGE.1,
        }
    }
}

impl AutoGainControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gain this AGC would apply to `buffer`
    pub fn gain_for(&self, buffer: &[f32]) -> f32 {
        let rms = analysis::rms(buffer).max(analysis::SILENCE_RMS);
        (self.target_rms / rms).clamp(self.min_gain, self.max_gain)
    }
}

impl Stage for AutoGainControl {
    fn name(&self) -> &'static str {
        "agc"
    }

    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        let gain = self.gain_for(buffer);
        scale(buffer, gain);
        Ok(())
    }
}
