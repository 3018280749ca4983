//! Core domain types for SoundBridge

mod config;
mod effect;
mod ids;
mod metrics;
mod quality;

pub use config::{
    AudioConfig, EqBands, EQ_GAIN_LIMIT_DB, MAX_CROSSFADE_SECS, NORMALIZATION_TARGET_RANGE,
    SUPPORTED_BIT_DEPTHS, SUPPORTED_CHANNELS, SUPPORTED_SAMPLE_RATES,
};
pub use effect::{EffectKind, MixingMode};
pub use ids::{EffectId, GuildId, StreamId};
pub use metrics::{quality_score, AudioMetrics, LATENCY_BUDGET_MS};
pub use quality::{QualityTier, StepDirection};
