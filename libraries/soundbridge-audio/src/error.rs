//! Error types for the audio engine

use soundbridge_core::{ConfigError, EffectId, GuildId, StreamId};
use soundbridge_dsp::DspError;
use thiserror::Error;

/// Audio engine errors
///
/// Configuration-level calls return these. Hot-path calls (`process`,
/// `mix`) never do: they fall back to passing audio through.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Rejected configuration value
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Stage or PCM conversion failure
    #[error(transparent)]
    Dsp(#[from] DspError),

    /// No effect with this id in the guild's chain
    #[error("Effect {effect_id} not found in guild {guild_id}")]
    EffectNotFound {
        guild_id: GuildId,
        effect_id: EffectId,
    },

    /// No stream with this id registered for the guild
    #[error("Stream {stream_id} not found in guild {guild_id}")]
    StreamNotFound {
        guild_id: GuildId,
        stream_id: StreamId,
    },

    /// Stream id already registered for the guild
    #[error("Stream {stream_id} already registered in guild {guild_id}")]
    DuplicateStream {
        guild_id: GuildId,
        stream_id: StreamId,
    },

    /// Stream source failed to deliver data
    #[error("Stream source error: {0}")]
    Source(String),

    /// Playback sink rejected data
    #[error("Playback sink error: {0}")]
    Sink(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for audio engine operations
pub type Result<T> = std::result::Result<T, AudioError>;
