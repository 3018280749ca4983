//! Constant-attenuation ducking
//!
//! There is no voice-activity sidechain yet, so ducking attenuates by a
//! fixed `1 - level * 0.5` whenever it is enabled.
// TODO: drive the attenuation from a voice-activity signal once the voice
// transport exposes one.

use crate::error::{DspError, Result};
use crate::stage::{scale, Stage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ducking {
    level: f32,
}

impl Ducking {
    /// Ducking with `level` in [0.0, 1.0]
    pub fn new(level: f32) -> Self {
        Self { level }
    }

    /// Linear gain applied to every sample
    pub fn gain(&self) -> f32 {
        1.0 - self.level * 0.5
    }
}

impl Stage for Ducking {
    fn name(&self) -> &'static str {
        "ducking"
    }

    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if !(0.0..=1.0).contains(&self.level) {
            return Err(DspError::InvalidParameter {
                stage: "ducking",
                name: "level",
                value: self.level,
            });
        }
        scale(buffer, self.gain());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_level_halves_output() {
        let mut buffer = vec![0.8; 4];
        Ducking::new(1.0).apply(&mut buffer).unwrap();
        assert!(buffer.iter().all(|&s| (s - 0.4).abs() < 1e-7));
    }

    #[test]
    fn default_level_attenuates_by_fifteen_percent() {
        assert!((Ducking::new(0.3).gain() - 0.85).abs() < 1e-6);
    }
}
