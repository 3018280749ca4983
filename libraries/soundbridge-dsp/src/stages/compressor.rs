//! Soft-knee peak compressor
//!
//! Samples above the threshold keep only `1 - ratio` of their excess.
//! A ratio of 0 is a bypass; a ratio of 1 clamps every peak to the threshold.

use crate::error::{DspError, Result};
use crate::stage::Stage;

/// Default compression threshold (linear amplitude)
pub const DEFAULT_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compressor {
    threshold: f32,
    ratio: f32,
}

impl Compressor {
    /// Compressor with the default 0.7 threshold
    pub fn new(ratio: f32) -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD, ratio)
    }

    pub fn with_threshold(threshold: f32, ratio: f32) -> Self {
        Self { threshold, ratio }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Gain applied to a sample of magnitude `magnitude`
    #[inline]
    pub fn gain_for(&self, magnitude: f32) -> f32 {
        if magnitude <= self.threshold {
            return 1.0;
        }
        let excess = magnitude - self.threshold;
        let compressed = excess * (1.0 - self.ratio);
        (self.threshold + compressed) / magnitude
    }

    fn check(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.ratio) {
            return Err(DspError::InvalidParameter {
                stage: "compressor",
                name: "ratio",
                value: self.ratio,
            });
        }
        if !(self.threshold > 0.0 && self.threshold.is_finite()) {
            return Err(DspError::InvalidParameter {
                stage: "compressor",
                name: "threshold",
                value: self.threshold,
            });
        }
        Ok(())
    }
}

impl Stage for Compressor {
    fn name(&self) -> &'static str {
        "compressor"
    }

    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        self.check()?;
        for sample in buffer.iter_mut() {
            *sample *= self.gain_for(sample.abs());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_passes_through() {
        let mut buffer = vec![0.5, -0.7, 0.1];
        Compressor::new(1.0).apply(&mut buffer).unwrap();
        assert_eq!(buffer, vec![0.5, -0.7, 0.1]);
    }

    #[test]
    fn excess_is_scaled_and_sign_kept() {
        let mut buffer = vec![0.9, -0.9];
        Compressor::new(0.5).apply(&mut buffer).unwrap();
        assert!((buffer[0] - 0.8).abs() < 1e-6);
        assert!((buffer[1] + 0.8).abs() < 1e-6);
    }

    #[test]
    fn full_ratio_clamps_to_threshold() {
        let mut buffer = vec![1.0];
        Compressor::new(1.0).apply(&mut buffer).unwrap();
        assert!((buffer[0] - DEFAULT_THRESHOLD).abs() < 1e-6);
    }

    #[test]
    fn invalid_ratio_is_an_error() {
        let mut buffer = vec![0.9];
        assert!(Compressor::new(1.5).apply(&mut buffer).is_err());
    }
}
