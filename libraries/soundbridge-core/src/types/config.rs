//! Per-guild audio configuration
//!
//! `AudioConfig` is plain data plus validation. Updates are validated as a
//! whole: a config that fails any check is rejected and the previous one
//! stays in force.

use super::quality::QualityTier;
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};

/// Supported sample rates (Hz)
pub const SUPPORTED_SAMPLE_RATES: &[u32] = &[22050, 44100, 48000];

/// Supported channel counts
pub const SUPPORTED_CHANNELS: &[u32] = &[1, 2];

/// Supported bit depths
pub const SUPPORTED_BIT_DEPTHS: &[u32] = &[8, 16, 24];

/// EQ band gain limit in dB (symmetric)
pub const EQ_GAIN_LIMIT_DB: f32 = 12.0;

/// Normalization target range in LUFS
pub const NORMALIZATION_TARGET_RANGE: (f32, f32) = (-30.0, -16.0);

/// Maximum crossfade duration in seconds
pub const MAX_CROSSFADE_SECS: f32 = 10.0;

/// Three-band EQ gains in dB
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EqBands {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

impl EqBands {
    /// Create a band triple
    pub const fn new(bass: f32, mid: f32, treble: f32) -> Self {
        Self { bass, mid, treble }
    }

    /// Check every band lies within ±12 dB
    pub fn validate(&self) -> Result<()> {
        let limit = f64::from(EQ_GAIN_LIMIT_DB);
        ConfigError::check_range("eq_bass", f64::from(self.bass), -limit, limit)?;
        ConfigError::check_range("eq_mid", f64::from(self.mid), -limit, limit)?;
        ConfigError::check_range("eq_treble", f64::from(self.treble), -limit, limit)
    }

    /// True when all bands are 0 dB
    pub fn is_flat(&self) -> bool {
        self.bass == 0.0 && self.mid == 0.0 && self.treble == 0.0
    }
}

/// Audio configuration for a guild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    // Volume
    /// Master volume (0.0 to 1.0)
    pub master_volume: f32,
    pub normalization_enabled: bool,
    /// Normalization target (-30 to -16 LUFS)
    pub normalization_target_lufs: f32,
    pub auto_gain_control: bool,
    /// Compression amount (0.0 = off, 1.0 = hard clamp at threshold)
    pub dynamic_range_compression: f32,

    // EQ
    pub eq_enabled: bool,
    pub eq_bass: f32,
    pub eq_mid: f32,
    pub eq_treble: f32,
    /// Name of the last preset applied, if any
    pub eq_preset: Option<String>,

    // Effects
    /// Gates the effects chain pass
    pub effects_enabled: bool,
    /// Crossfade duration in seconds
    pub crossfade_duration: f32,
    pub ducking_enabled: bool,
    pub ducking_level: f32,
    pub ducking_sensitivity: f32,

    // Format / quality
    pub quality: QualityTier,
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_depth: u32,
    pub buffer_size: u32,
    pub low_latency_mode: bool,
    /// CPU budget for audio processing, percent
    pub cpu_limit_percent: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            master_volume: 0.8,
            normalization_enabled: true,
            normalization_target_lufs: -23.0,
            auto_gain_control: false,
            dynamic_range_compression: 0.0,
            eq_enabled: false,
            eq_bass: 0.0,
            eq_mid: 0.0,
            eq_treble: 0.0,
            eq_preset: None,
            effects_enabled: true,
            crossfade_duration: 3.0,
            ducking_enabled: false,
            ducking_level: 0.3,
            ducking_sensitivity: 0.5,
            quality: QualityTier::High,
            sample_rate: 48000,
            channels: 2,
            bit_depth: 16,
            buffer_size: 2048,
            low_latency_mode: false,
            cpu_limit_percent: 50.0,
        }
    }
}

impl AudioConfig {
    /// Validate every field against its permitted range
    pub fn validate(&self) -> Result<()> {
        let (lufs_min, lufs_max) = NORMALIZATION_TARGET_RANGE;

        ConfigError::check_range("master_volume", f64::from(self.master_volume), 0.0, 1.0)?;
        ConfigError::check_range(
            "normalization_target_lufs",
            f64::from(self.normalization_target_lufs),
            f64::from(lufs_min),
            f64::from(lufs_max),
        )?;
        ConfigError::check_range(
            "dynamic_range_compression",
            f64::from(self.dynamic_range_compression),
            0.0,
            1.0,
        )?;
        self.eq_bands().validate()?;
        ConfigError::check_range(
            "crossfade_duration",
            f64::from(self.crossfade_duration),
            0.0,
            f64::from(MAX_CROSSFADE_SECS),
        )?;
        ConfigError::check_range("ducking_level", f64::from(self.ducking_level), 0.0, 1.0)?;
        ConfigError::check_range(
            "ducking_sensitivity",
            f64::from(self.ducking_sensitivity),
            0.0,
            1.0,
        )?;
        ConfigError::check_allowed("sample_rate", self.sample_rate, SUPPORTED_SAMPLE_RATES)?;
        ConfigError::check_allowed("channels", self.channels, SUPPORTED_CHANNELS)?;
        ConfigError::check_allowed("bit_depth", self.bit_depth, SUPPORTED_BIT_DEPTHS)?;
        ConfigError::check_range(
            "cpu_limit_percent",
            f64::from(self.cpu_limit_percent),
            1.0,
            100.0,
        )?;
        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidInput(
                "buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Current EQ gains
    pub fn eq_bands(&self) -> EqBands {
        EqBands::new(self.eq_bass, self.eq_mid, self.eq_treble)
    }

    /// Write EQ gains (unvalidated)
    pub fn set_eq_bands(&mut self, bands: EqBands) {
        self.eq_bass = bands.bass;
        self.eq_mid = bands.mid;
        self.eq_treble = bands.treble;
    }

    /// Whether switching from `self` to `next` changes decode/encode framing
    ///
    /// Sample rate, channel count, bit depth and quality tier cannot be
    /// hot-swapped mid-stream; processing must be stopped and started again.
    pub fn needs_restart(&self, next: &AudioConfig) -> bool {
        self.sample_rate != next.sample_rate
            || self.channels != next.channels
            || self.bit_depth != next.bit_depth
            || self.quality != next.quality
    }

    /// Bytes per interleaved frame at the configured bit depth
    pub fn frame_bytes(&self) -> usize {
        (self.bit_depth / 8).max(1) as usize * self.channels.max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AudioConfig::default().validate().is_ok());
    }

    #[test]
    fn frame_bytes_follow_bit_depth() {
        let stereo_24 = AudioConfig {
            bit_depth: 24,
            channels: 2,
            ..Default::default()
        };
        assert_eq!(stereo_24.frame_bytes(), 6);
        assert_eq!(AudioConfig::default().frame_bytes(), 4);
    }

    #[test]
    fn rejects_volume_above_one() {
        let config = AudioConfig {
            master_volume: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "master_volume",
                ..
            })
        ));
    }

    #[test]
    fn rejects_unsupported_sample_rate() {
        let config = AudioConfig {
            sample_rate: 96000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Unsupported {
                field: "sample_rate",
                ..
            })
        ));
    }

    #[test]
    fn rejects_eq_band_out_of_range() {
        let config = AudioConfig {
            eq_treble: -12.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_normalization_target_outside_window() {
        for target in [-31.0, -15.0, f32::NAN] {
            let config = AudioConfig {
                normalization_target_lufs: target,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "target {target} accepted");
        }
    }

    #[test]
    fn restart_needed_only_for_framing_fields() {
        let base = AudioConfig::default();

        let louder = AudioConfig {
            master_volume: 0.2,
            ..base.clone()
        };
        assert!(!base.needs_restart(&louder));

        let mono = AudioConfig {
            channels: 1,
            ..base.clone()
        };
        assert!(base.needs_restart(&mono));

        let ultra = AudioConfig {
            quality: QualityTier::Ultra,
            ..base.clone()
        };
        assert!(base.needs_restart(&ultra));
    }

    #[test]
    fn partial_document_fills_defaults() {
        let config: AudioConfig =
            serde_json::from_str(r#"{"master_volume": 0.5, "quality": "low"}"#).unwrap();
        assert_eq!(config.master_volume, 0.5);
        assert_eq!(config.quality, QualityTier::Low);
        assert_eq!(config.sample_rate, 48000);
    }
}
