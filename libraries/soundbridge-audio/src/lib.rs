//! SoundBridge Audio
//!
//! Per-guild audio engine for a voice-chat bot.
//!
//! This crate provides:
//! - **Pipeline**: [`AudioPipeline`] runs normalizer, AGC, compressor,
//!   master volume and EQ over int16 PCM chunks, per guild
//! - **Effects**: [`EffectsChain`] with EQ presets, ducking and crossfade
//!   settings
//! - **Mixing**: [`StreamMixer`] combines concurrent streams in replace,
//!   overlay, priority or crossfade mode
//! - **Quality control**: [`QualityController`] steps quality tiers to fit
//!   each guild's CPU budget
//! - **I/O**: [`StreamPump`] moves chunks from a source through processing
//!   into a sink
//!
//! Every guild's state sits behind its own lock, and every processing path
//! fails open: on error the caller gets the unprocessed audio back.
//!
//! # Example
//!
//! ```rust
//! use soundbridge_audio::AudioPipeline;
//! use soundbridge_core::{AudioConfig, GuildId, NullEventSink};
//! use std::sync::Arc;
//!
//! let pipeline = AudioPipeline::new(Arc::new(NullEventSink));
//! let guild = GuildId::new(1);
//! pipeline.start_processing(guild);
//!
//! let config = AudioConfig {
//!     master_volume: 0.5,
//!     normalization_enabled: false,
//!     ..Default::default()
//! };
//! let out = pipeline.process(guild, &[0xE8, 0x03, 0xE8, 0x03], &config);
//! assert_eq!(out, vec![0xF4, 0x01, 0xF4, 0x01]);
//! ```

#![forbid(unsafe_code)]

pub mod effects;
pub mod error;
pub mod events;
pub mod guild;
pub mod io;
pub mod mixer;
pub mod pipeline;
pub mod presets;
pub mod quality;

pub use effects::{Effect, EffectParams, EffectsChain, EffectsStats};
pub use error::{AudioError, Result};
pub use events::BroadcastEventSink;
pub use guild::GuildMap;
pub use io::{PlaybackSink, PumpStatus, ReaderSource, StreamPump, StreamSource, WriterSink};
pub use mixer::{
    compute_weights, AudioStream, MixMetrics, MixReport, MixerStats, StreamInfo, StreamMixer,
};
pub use pipeline::{AudioPipeline, ConfigChange};
pub use presets::{find_preset, preset_names, EqPreset, EQ_PRESETS};
pub use quality::{CpuGauge, CpuUsageProbe, QualityController, QualitySettings, QualityTransition};
