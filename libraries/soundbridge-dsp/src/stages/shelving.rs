//! Filter-based three-band equalizer (`biquad-eq` feature)
//!
//! Low shelf at 250 Hz, peaking band at 1 kHz and high shelf at 4 kHz.
//! Filters keep per-channel state across calls, so one instance must be
//! reused for consecutive chunks of the same stream.

use crate::error::{DspError, Result};
use crate::stage::Stage;
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};
use soundbridge_core::EqBands;

pub const BASS_FREQ_HZ: f32 = 250.0;
pub const MID_FREQ_HZ: f32 = 1000.0;
pub const TREBLE_FREQ_HZ: f32 = 4000.0;

struct ChannelFilters {
    bass: DirectForm2Transposed<f32>,
    mid: DirectForm2Transposed<f32>,
    treble: DirectForm2Transposed<f32>,
}

impl ChannelFilters {
    fn run(&mut self, sample: f32) -> f32 {
        let out = self.bass.run(sample);
        let out = self.mid.run(out);
        self.treble.run(out)
    }
}

pub struct ShelvingEqualizer {
    bands: EqBands,
    sample_rate: u32,
    channels: Vec<ChannelFilters>,
}

impl ShelvingEqualizer {
    /// Design filters for `channels` interleaved channels at `sample_rate`
    pub fn new(bands: EqBands, sample_rate: u32, channels: usize) -> Result<Self> {
        let channels = (0..channels.max(1))
            .map(|_| design(bands, sample_rate))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            bands,
            sample_rate,
            channels,
        })
    }

    pub fn bands(&self) -> EqBands {
        self.bands
    }

    /// Retune for new gains, keeping filter state
    pub fn set_bands(&mut self, bands: EqBands) -> Result<()> {
        if bands == self.bands {
            return Ok(());
        }
        let (bass, mid, treble) = coefficients(bands, self.sample_rate)?;
        for filters in &mut self.channels {
            filters.bass.update_coefficients(bass);
            filters.mid.update_coefficients(mid);
            filters.treble.update_coefficients(treble);
        }
        self.bands = bands;
        Ok(())
    }

    /// Clear filter memory (call between unrelated streams)
    pub fn reset(&mut self) {
        for filters in &mut self.channels {
            filters.bass.reset_state();
            filters.mid.reset_state();
            filters.treble.reset_state();
        }
    }
}

fn coefficients(
    bands: EqBands,
    sample_rate: u32,
) -> Result<(Coefficients<f32>, Coefficients<f32>, Coefficients<f32>)> {
    let fs = (sample_rate as f32).hz();
    let make = |kind: Type<f32>, freq: f32| {
        Coefficients::<f32>::from_params(kind, fs, freq.hz(), Q_BUTTERWORTH_F32)
            .map_err(|e| DspError::FilterDesign(format!("{freq} Hz: {e:?}")))
    };
    Ok((
        make(Type::LowShelf(bands.bass), BASS_FREQ_HZ)?,
        make(Type::PeakingEQ(bands.mid), MID_FREQ_HZ)?,
        make(Type::HighShelf(bands.treble), TREBLE_FREQ_HZ)?,
    ))
}

fn design(bands: EqBands, sample_rate: u32) -> Result<ChannelFilters> {
    let (bass, mid, treble) = coefficients(bands, sample_rate)?;
    Ok(ChannelFilters {
        bass: DirectForm2Transposed::<f32>::new(bass),
        mid: DirectForm2Transposed::<f32>::new(mid),
        treble: DirectForm2Transposed::<f32>::new(treble),
    })
}

impl Stage for ShelvingEqualizer {
    fn name(&self) -> &'static str {
        "shelving_equalizer"
    }

    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        let channels = self.channels.len();
        for frame in buffer.chunks_mut(channels) {
            for (sample, filters) in frame.iter_mut().zip(self.channels.iter_mut()) {
                *sample = filters.run(*sample);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::rms;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.25 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn flat_bands_leave_tone_unchanged() {
        let mut eq = ShelvingEqualizer::new(EqBands::default(), 48000, 1).unwrap();
        let input = sine(1000.0, 48000, 4800);
        let mut buffer = input.clone();
        eq.apply(&mut buffer).unwrap();
        assert!((rms(&buffer) - rms(&input)).abs() < 1e-3);
    }

    #[test]
    fn bass_boost_raises_low_tone_more_than_high_tone() {
        let bands = EqBands::new(12.0, 0.0, 0.0);
        let mut low_eq = ShelvingEqualizer::new(bands, 48000, 1).unwrap();
        let mut high_eq = ShelvingEqualizer::new(bands, 48000, 1).unwrap();

        let mut low = sine(60.0, 48000, 9600);
        let mut high = sine(10_000.0, 48000, 9600);
        let low_in = rms(&low);
        let high_in = rms(&high);
        low_eq.apply(&mut low).unwrap();
        high_eq.apply(&mut high).unwrap();

        assert!(rms(&low) / low_in > 2.0);
        assert!((rms(&high) / high_in - 1.0).abs() < 0.1);
    }
}
