//! Audio Events
//!
//! Notifications emitted by the engine for an external event bus.
//! The engine only emits; delivery and persistence belong to the sink.

use crate::types::{AudioConfig, EffectId, EffectKind, GuildId, MixingMode, QualityTier, StreamId};
use serde::{Deserialize, Serialize};

/// Why the quality controller changed tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityChangeReason {
    /// Average CPU usage exceeded the guild's limit
    CpuOverload,
    /// Average CPU usage fell below half the limit
    PerformanceImproved,
}

/// Events emitted by the audio engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AudioEvent {
    /// A validated config replaced the previous one
    ConfigChanged {
        guild_id: GuildId,
        config: Box<AudioConfig>,
        /// Whether the change requires stop-then-start
        restart_required: bool,
    },

    /// Master volume changed (a ramp towards `new_volume` has started)
    VolumeChanged {
        guild_id: GuildId,
        old_volume: f32,
        new_volume: f32,
    },

    /// Quality tier stepped up or down
    QualityChanged {
        guild_id: GuildId,
        previous: QualityTier,
        quality: QualityTier,
        reason: QualityChangeReason,
    },

    /// Effect added to (or updated in) a guild's chain
    EffectApplied {
        guild_id: GuildId,
        effect_id: EffectId,
        effect_type: EffectKind,
    },

    /// Effect removed from a guild's chain
    EffectRemoved {
        guild_id: GuildId,
        effect_id: EffectId,
        effect_type: EffectKind,
    },

    /// Stream registered with the mixer
    StreamAdded {
        guild_id: GuildId,
        stream_id: StreamId,
        mixing_mode: MixingMode,
        priority: u8,
    },

    /// Stream removed from the mixer
    StreamRemoved {
        guild_id: GuildId,
        stream_id: StreamId,
        fade_out: bool,
    },

    /// Processing started for a guild
    ProcessingStarted { guild_id: GuildId },

    /// Processing stopped for a guild
    ProcessingStopped { guild_id: GuildId },
}

impl AudioEvent {
    /// Guild the event concerns
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::ConfigChanged { guild_id, .. }
            | Self::VolumeChanged { guild_id, .. }
            | Self::QualityChanged { guild_id, .. }
            | Self::EffectApplied { guild_id, .. }
            | Self::EffectRemoved { guild_id, .. }
            | Self::StreamAdded { guild_id, .. }
            | Self::StreamRemoved { guild_id, .. }
            | Self::ProcessingStarted { guild_id }
            | Self::ProcessingStopped { guild_id } => *guild_id,
        }
    }

    /// Snake-case event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConfigChanged { .. } => "audio_config_changed",
            Self::VolumeChanged { .. } => "audio_volume_changed",
            Self::QualityChanged { .. } => "audio_quality_changed",
            Self::EffectApplied { .. } => "audio_effect_applied",
            Self::EffectRemoved { .. } => "audio_effect_removed",
            Self::StreamAdded { .. } => "audio_stream_added",
            Self::StreamRemoved { .. } => "audio_stream_removed",
            Self::ProcessingStarted { .. } => "audio_processing_started",
            Self::ProcessingStopped { .. } => "audio_processing_stopped",
        }
    }
}

/// Destination for engine events
///
/// Implementations must not block: `emit` is called while per-guild state
/// is locked.
pub trait EventSink: Send + Sync {
    /// Publish an event
    fn emit(&self, event: AudioEvent);
}

/// Sink that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: AudioEvent) {}
}
