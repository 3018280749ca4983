//! Effect and mixing mode enumerations shared by events and the engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of effect that can sit in a guild's effects chain
///
/// Only `Equalizer`, `Compressor` and `Ducking` have processors; the rest
/// are accepted and pass audio through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Equalizer,
    Compressor,
    Limiter,
    Reverb,
    Chorus,
    Distortion,
    NoiseGate,
    Ducking,
    Crossfade,
}

impl EffectKind {
    /// Snake-case name used in events and statistics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equalizer => "equalizer",
            Self::Compressor => "compressor",
            Self::Limiter => "limiter",
            Self::Reverb => "reverb",
            Self::Chorus => "chorus",
            Self::Distortion => "distortion",
            Self::NoiseGate => "noise_gate",
            Self::Ducking => "ducking",
            Self::Crossfade => "crossfade",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How simultaneous streams of one guild are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixingMode {
    /// Highest-priority stream plays alone
    #[default]
    Replace,
    /// Equal shares scaled by each stream's volume
    Overlay,
    /// Shares proportional to priority, scaled by volume
    Priority,
    /// Weights follow stream volume; transitions handled by the crossfade state
    Crossfade,
}

impl MixingMode {
    /// Lowercase name used in events and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Overlay => "overlay",
            Self::Priority => "priority",
            Self::Crossfade => "crossfade",
        }
    }
}

impl fmt::Display for MixingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
