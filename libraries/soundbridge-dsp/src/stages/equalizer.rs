//! Positional three-band equalizer
//!
//! Not frequency-selective: the mid gain is applied to the whole buffer,
//! the bass gain to the first third of samples and the treble gain to the
//! last third. The `biquad-eq` feature provides a filter-based
//! alternative in [`super::shelving`].

use crate::analysis::db_to_gain;
use crate::error::Result;
use crate::stage::Stage;
use soundbridge_core::EqBands;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleEqualizer {
    bands: EqBands,
}

impl SimpleEqualizer {
    pub fn new(bands: EqBands) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> EqBands {
        self.bands
    }
}

impl Stage for SimpleEqualizer {
    fn name(&self) -> &'static str {
        "equalizer"
    }

    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        let bass_gain = db_to_gain(self.bands.bass);
        let mid_gain = db_to_gain(self.bands.mid);
        let treble_gain = db_to_gain(self.bands.treble);

        let third = buffer.len() / 3;
        let treble_start = buffer.len() - third;

        for (i, sample) in buffer.iter_mut().enumerate() {
            let mut gain = mid_gain;
            if i < third {
                gain *= bass_gain;
            }
            if i >= treble_start {
                gain *= treble_gain;
            }
            *sample *= gain;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_bands_are_identity() {
        let mut buffer = vec![0.3; 9];
        SimpleEqualizer::new(EqBands::default())
            .apply(&mut buffer)
            .unwrap();
        assert!(buffer.iter().all(|&s| (s - 0.3).abs() < 1e-7));
    }

    #[test]
    fn gains_apply_by_position() {
        let six_db = db_to_gain(6.0);
        let mut buffer = vec![0.1; 9];
        SimpleEqualizer::new(EqBands::new(6.0, 0.0, -6.0))
            .apply(&mut buffer)
            .unwrap();

        for &s in &buffer[..3] {
            assert!((s - 0.1 * six_db).abs() < 1e-6);
        }
        for &s in &buffer[3..6] {
            assert!((s - 0.1).abs() < 1e-7);
        }
        for &s in &buffer[6..] {
            assert!((s - 0.1 / six_db).abs() < 1e-6);
        }
    }

    #[test]
    fn mid_gain_covers_every_sample() {
        let mut buffer = vec![0.1; 10];
        SimpleEqualizer::new(EqBands::new(0.0, -6.0, 0.0))
            .apply(&mut buffer)
            .unwrap();
        let expected = 0.1 * db_to_gain(-6.0);
        assert!(buffer.iter().all(|&s| (s - expected).abs() < 1e-6));
    }
}
