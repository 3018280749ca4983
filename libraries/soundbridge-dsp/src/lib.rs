//! SoundBridge DSP
//!
//! Stateless enhancement stages for 16-bit PCM chunks.
//!
//! This crate provides:
//! - **PCM conversion**: int16 little-endian bytes to normalized f32 and back
//! - **Level analysis**: RMS, peak, LUFS estimate, crest factor
//! - **Stages**: `Normalizer`, `AutoGainControl`, `Compressor`,
//!   `MasterVolume`, `SimpleEqualizer`, `Ducking`
//! - **Fail-open execution**: [`apply_fail_open`] keeps the input when a
//!   stage errors or produces non-finite samples
//! - **Fades**: `FadeCurve` and the smoothstep `VolumeRamp`
//!
//! # Example
//!
//! ```rust
//! use soundbridge_dsp::{apply_fail_open, pcm, stages::MasterVolume};
//!
//! let bytes = pcm::i16_to_bytes(&[1000; 8]);
//! let mut samples = pcm::decode_i16_le(&bytes, 2).unwrap();
//! let mut scratch = Vec::new();
//! apply_fail_open(&mut MasterVolume::new(0.5), &mut samples, &mut scratch);
//! assert_eq!(pcm::bytes_to_i16(&pcm::encode_i16_le(&samples)), vec![500; 8]);
//! ```
//!
//! # Features
//!
//! - `biquad-eq`: frequency-selective `ShelvingEqualizer` built on `biquad`

#![forbid(unsafe_code)]

pub mod analysis;
pub mod error;
pub mod fade;
pub mod pcm;
pub mod stage;
pub mod stages;

pub use analysis::{analyze, LevelAnalysis};
pub use error::{DspError, Result};
pub use fade::FadeCurve;
pub use stage::{apply_fail_open, clip, try_apply, Stage};
