//! Enhancement stages
//!
//! Each stage is built from the guild's current settings for a pass and
//! run through [`crate::apply_fail_open`].

mod agc;
mod compressor;
mod ducking;
mod equalizer;
mod normalizer;
#[cfg(feature = "biquad-eq")]
mod shelving;
mod volume;

pub use agc::{AutoGainControl, GAIN_RANGE as AGC_GAIN_RANGE, TARGET_RMS as AGC_TARGET_RMS};
pub use compressor::{Compressor, DEFAULT_THRESHOLD as COMPRESSOR_THRESHOLD};
pub use ducking::Ducking;
pub use equalizer::SimpleEqualizer;
pub use normalizer::{Normalizer, MAX_GAIN as NORMALIZER_MAX_GAIN, MIN_GAIN as NORMALIZER_MIN_GAIN};
#[cfg(feature = "biquad-eq")]
pub use shelving::{ShelvingEqualizer, BASS_FREQ_HZ, MID_FREQ_HZ, TREBLE_FREQ_HZ};
pub use volume::{MasterVolume, VolumeRamp, DEFAULT_RAMP};
