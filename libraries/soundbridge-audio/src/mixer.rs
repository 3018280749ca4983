//! Multi-stream mixer
//!
//! Combines one chunk per stream into a single output chunk according to
//! the guild's mixing mode:
//!
//! - **Replace**: the highest-priority stream plays alone
//! - **Overlay**: equal shares, each scaled by the stream's volume
//! - **Priority**: shares proportional to priority, scaled by volume
//! - **Crossfade**: equal shares scaled by volume, with timed fades
//!
//! Weights are recomputed whenever streams, volumes or the mode change.
//! A crossfade scales the whole mixed output by the fade curve until its
//! duration has elapsed.

use crate::error::{AudioError, Result};
use crate::guild::{lock, GuildMap};
use crate::pipeline::AudioPipeline;
use chrono::{DateTime, Utc};
use serde::Serialize;
use soundbridge_core::{
    AudioConfig, AudioEvent, ConfigError, EventSink, GuildId, MixingMode, StreamId,
};
use soundbridge_dsp::{clip, pcm, FadeCurve};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Priority bounds for streams
pub const PRIORITY_RANGE: (u8, u8) = (1, 10);

/// A playback source registered with the mixer
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStream {
    pub id: StreamId,
    /// 1 to 10, higher is more important
    pub priority: u8,
    /// Per-stream volume multiplier (0.0 to 1.0)
    pub volume: f32,
    pub fade_in: Duration,
    pub fade_out: Duration,
    pub looped: bool,
    /// Stream is excluded from mixing after this instant
    pub end_time: Option<Instant>,
}

impl AudioStream {
    /// Stream with priority 1, full volume and no fades
    pub fn new(id: impl Into<StreamId>) -> Self {
        Self {
            id: id.into(),
            priority: 1,
            volume: 1.0,
            fade_in: Duration::ZERO,
            fade_out: Duration::ZERO,
            looped: false,
            end_time: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_fade_in(mut self, fade_in: Duration) -> Self {
        self.fade_in = fade_in;
        self
    }

    pub fn with_fade_out(mut self, fade_out: Duration) -> Self {
        self.fade_out = fade_out;
        self
    }

    pub fn with_end_time(mut self, end_time: Instant) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn looped(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    /// Whether the stream may still be mixed at `now`
    pub fn is_live(&self, now: Instant) -> bool {
        self.end_time.map_or(true, |end| now <= end)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        let (min, max) = PRIORITY_RANGE;
        ConfigError::check_range(
            "priority",
            f64::from(self.priority),
            f64::from(min),
            f64::from(max),
        )?;
        ConfigError::check_range("volume", f64::from(self.volume), 0.0, 1.0)
    }
}

/// Static mixing weights for `streams` under `mode`, in stream order
///
/// Replace gives 1.0 to the first stream with the highest priority and 0.0
/// to the rest. Overlay shares are `1/N`; priority shares are
/// `priority / Σpriority`. Both are then scaled by stream volume.
/// Crossfade weights are the raw volumes.
pub fn compute_weights(streams: &[AudioStream], mode: MixingMode) -> Vec<f32> {
    if streams.is_empty() {
        return Vec::new();
    }
    let count = streams.len() as f32;

    match mode {
        MixingMode::Replace => {
            let winner = highest_priority(streams.iter().enumerate().map(|(i, s)| (i, s.priority)));
            (0..streams.len())
                .map(|i| if Some(i) == winner { 1.0 } else { 0.0 })
                .collect()
        }
        MixingMode::Overlay => streams.iter().map(|s| s.volume / count).collect(),
        MixingMode::Priority => {
            let total: u32 = streams.iter().map(|s| u32::from(s.priority)).sum();
            streams
                .iter()
                .map(|s| {
                    let share = if total > 0 {
                        f32::from(s.priority) / total as f32
                    } else {
                        1.0 / count
                    };
                    share * s.volume
                })
                .collect()
        }
        MixingMode::Crossfade => streams.iter().map(|s| s.volume).collect(),
    }
}

/// Index of the first item with the highest priority
fn highest_priority(items: impl Iterator<Item = (usize, u8)>) -> Option<usize> {
    let mut best: Option<(usize, u8)> = None;
    for (index, priority) in items {
        if best.map_or(true, |(_, p)| priority > p) {
            best = Some((index, priority));
        }
    }
    best.map(|(index, _)| index)
}

/// Timed fade applied to the whole mix
#[derive(Debug, Clone, PartialEq)]
pub struct CrossfadeState {
    pub target: StreamId,
    pub duration: Duration,
    pub started: Instant,
    pub curve: FadeCurve,
}

impl CrossfadeState {
    /// Gain at `now`, or `None` once the fade has completed
    fn gain_at(&self, now: Instant) -> Option<f32> {
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed >= self.duration {
            return None;
        }
        let progress = elapsed.as_secs_f32() / self.duration.as_secs_f32();
        Some(self.curve.gain(progress, false))
    }
}

/// Metrics of one mix call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixMetrics {
    pub stream_count: usize,
    pub processing_time_ms: f64,
    pub output_size_bytes: usize,
    pub throughput_bps: f64,
    pub timestamp: DateTime<Utc>,
}

/// Per-stream entry of a [`MixReport`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamInfo {
    pub stream_id: StreamId,
    pub priority: u8,
    pub volume: f32,
    pub weight: f32,
}

/// Mixing state of one guild
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixReport {
    pub last_mix: Option<MixMetrics>,
    pub active_stream_count: usize,
    pub mixing_mode: MixingMode,
    pub streams: Vec<StreamInfo>,
    pub has_crossfade: bool,
    pub fading_out: usize,
    pub last_mix_time: Option<DateTime<Utc>>,
}

/// Mixer-wide statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixerStats {
    pub total_guilds: usize,
    pub total_active_streams: usize,
    pub mixing_mode_distribution: BTreeMap<&'static str, usize>,
    pub active_crossfades: usize,
    pub average_streams_per_guild: f64,
}

struct StreamEntry {
    stream: AudioStream,
    added: Instant,
}

impl StreamEntry {
    /// Linear fade-in multiplier at `now`
    fn fade_in_gain(&self, now: Instant) -> f32 {
        if self.stream.fade_in.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.added);
        (elapsed.as_secs_f32() / self.stream.fade_in.as_secs_f32()).min(1.0)
    }
}

/// A removed stream still fading out
struct FadingStream {
    id: StreamId,
    weight: f32,
    started: Instant,
    duration: Duration,
}

impl FadingStream {
    fn gain_at(&self, now: Instant) -> Option<f32> {
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed >= self.duration {
            return None;
        }
        let progress = elapsed.as_secs_f32() / self.duration.as_secs_f32();
        Some(self.weight * FadeCurve::Linear.gain(progress, true))
    }
}

#[derive(Default)]
struct GuildMix {
    streams: Vec<StreamEntry>,
    mode: MixingMode,
    weights: Vec<f32>,
    crossfade: Option<CrossfadeState>,
    fading: Vec<FadingStream>,
    last_mix: Option<MixMetrics>,
}

impl GuildMix {
    fn recompute_weights(&mut self) {
        let streams: Vec<AudioStream> = self.streams.iter().map(|e| e.stream.clone()).collect();
        self.weights = compute_weights(&streams, self.mode);
    }

    fn position(&self, stream_id: &StreamId) -> Option<usize> {
        self.streams.iter().position(|e| &e.stream.id == stream_id)
    }

    fn weight_of(&self, stream_id: &StreamId) -> f32 {
        self.position(stream_id)
            .and_then(|i| self.weights.get(i).copied())
            .unwrap_or(0.0)
    }
}

/// Per-guild multi-stream mixer
pub struct StreamMixer {
    guilds: GuildMap<GuildMix>,
    pipeline: Arc<AudioPipeline>,
    events: Arc<dyn EventSink>,
}

impl StreamMixer {
    /// Mixer that stops producing output for guilds `pipeline` reports inactive
    pub fn new(pipeline: Arc<AudioPipeline>, events: Arc<dyn EventSink>) -> Self {
        Self {
            guilds: GuildMap::new(),
            pipeline,
            events,
        }
    }

    // ===== Stream management =====

    /// Register a stream and switch the guild to `mode`
    ///
    /// In replace mode every existing stream is dropped first.
    pub fn add_stream(&self, guild_id: GuildId, stream: AudioStream, mode: MixingMode) -> Result<StreamId> {
        stream.validate()?;
        let id = stream.id.clone();
        let priority = stream.priority;

        self.guilds.with_or_insert(guild_id, GuildMix::default, |state| {
            if mode == MixingMode::Replace {
                if !state.streams.is_empty() {
                    debug!(guild = %guild_id, count = state.streams.len(), "Replacing streams");
                }
                state.streams.clear();
                state.fading.clear();
            } else if state.position(&id).is_some() {
                return Err(AudioError::DuplicateStream {
                    guild_id,
                    stream_id: id.clone(),
                });
            }

            state.fading.retain(|f| f.id != id);
            state.streams.push(StreamEntry {
                stream,
                added: Instant::now(),
            });
            state.mode = mode;
            state.recompute_weights();
            Ok(())
        })?;

        self.events.emit(AudioEvent::StreamAdded {
            guild_id,
            stream_id: id.clone(),
            mixing_mode: mode,
            priority,
        });
        info!(guild = %guild_id, stream = %id, mode = %mode, priority, "Stream added");
        Ok(id)
    }

    /// Remove a stream
    ///
    /// With `fade_out` and a non-zero fade-out duration, chunks still
    /// supplied for the stream keep being mixed with a linearly decaying
    /// gain until the fade completes.
    pub fn remove_stream(&self, guild_id: GuildId, stream_id: &StreamId, fade_out: bool) -> Result<()> {
        self.guilds
            .with(guild_id, |state| {
                let index = state.position(stream_id)?;
                let weight = state.weights.get(index).copied().unwrap_or(0.0);
                let entry = state.streams.remove(index);

                if fade_out && !entry.stream.fade_out.is_zero() {
                    debug!(
                        guild = %guild_id,
                        stream = %stream_id,
                        duration_ms = entry.stream.fade_out.as_millis() as u64,
                        "Fading out stream"
                    );
                    state.fading.push(FadingStream {
                        id: entry.stream.id,
                        weight,
                        started: Instant::now(),
                        duration: entry.stream.fade_out,
                    });
                }
                if state
                    .crossfade
                    .as_ref()
                    .is_some_and(|c| &c.target == stream_id)
                {
                    state.crossfade = None;
                }
                state.recompute_weights();
                Some(())
            })
            .flatten()
            .ok_or_else(|| AudioError::StreamNotFound {
                guild_id,
                stream_id: stream_id.clone(),
            })?;

        self.events.emit(AudioEvent::StreamRemoved {
            guild_id,
            stream_id: stream_id.clone(),
            fade_out,
        });
        info!(guild = %guild_id, stream = %stream_id, fade_out, "Stream removed");
        Ok(())
    }

    /// Set a stream's volume, clamped to [0, 1]
    pub fn set_stream_volume(&self, guild_id: GuildId, stream_id: &StreamId, volume: f32) -> Result<f32> {
        if volume.is_nan() {
            return Err(ConfigError::InvalidInput("stream volume is NaN".to_string()).into());
        }
        let volume = volume.clamp(0.0, 1.0);

        self.guilds
            .with(guild_id, |state| {
                let index = state.position(stream_id)?;
                state.streams[index].stream.volume = volume;
                state.recompute_weights();
                Some(())
            })
            .flatten()
            .ok_or_else(|| AudioError::StreamNotFound {
                guild_id,
                stream_id: stream_id.clone(),
            })?;

        info!(guild = %guild_id, stream = %stream_id, volume, "Stream volume set");
        Ok(volume)
    }

    /// Change the guild's mixing mode, keeping its streams
    pub fn set_mixing_mode(&self, guild_id: GuildId, mode: MixingMode) {
        self.guilds.with_or_insert(guild_id, GuildMix::default, |state| {
            state.mode = mode;
            state.recompute_weights();
        });
        info!(guild = %guild_id, mode = %mode, "Mixing mode set");
    }

    /// Fade the mix in over `duration` using a linear curve
    pub fn crossfade_to_stream(&self, guild_id: GuildId, target: &StreamId, duration: Duration) -> Result<()> {
        self.crossfade_with_curve(guild_id, target, duration, FadeCurve::Linear)
    }

    /// Fade the mix in over `duration` using `curve`
    pub fn crossfade_with_curve(
        &self,
        guild_id: GuildId,
        target: &StreamId,
        duration: Duration,
        curve: FadeCurve,
    ) -> Result<()> {
        self.guilds
            .with(guild_id, |state| {
                state.position(target)?;
                state.crossfade = (!duration.is_zero()).then(|| CrossfadeState {
                    target: target.clone(),
                    duration,
                    started: Instant::now(),
                    curve,
                });
                Some(())
            })
            .flatten()
            .ok_or_else(|| {
                warn!(guild = %guild_id, stream = %target, "Crossfade target not found");
                AudioError::StreamNotFound {
                    guild_id,
                    stream_id: target.clone(),
                }
            })?;

        info!(
            guild = %guild_id,
            stream = %target,
            duration_ms = duration.as_millis() as u64,
            curve = curve.as_str(),
            "Crossfade started"
        );
        Ok(())
    }

    /// Registered streams in registration order
    pub fn active_streams(&self, guild_id: GuildId) -> Vec<AudioStream> {
        self.guilds
            .with(guild_id, |state| {
                state.streams.iter().map(|e| e.stream.clone()).collect()
            })
            .unwrap_or_default()
    }

    /// Current static weights per stream
    pub fn weights(&self, guild_id: GuildId) -> HashMap<StreamId, f32> {
        self.guilds
            .with(guild_id, |state| {
                state
                    .streams
                    .iter()
                    .zip(&state.weights)
                    .map(|(e, &w)| (e.stream.id.clone(), w))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn mixing_mode(&self, guild_id: GuildId) -> MixingMode {
        self.guilds
            .with(guild_id, |state| state.mode)
            .unwrap_or_default()
    }

    /// Drop all mixing state for a guild
    pub fn clear_guild(&self, guild_id: GuildId) {
        if self.guilds.remove(guild_id).is_some() {
            debug!(guild = %guild_id, "Mixer state cleared");
        }
    }

    // ===== Mixing =====

    /// Mix one chunk per stream into a single chunk
    ///
    /// Chunks for unregistered streams and empty chunks are ignored; with
    /// nothing left the result is empty. If mixing fails, the first
    /// non-empty raw chunk is returned instead.
    pub fn mix(&self, guild_id: GuildId, chunks: &[(StreamId, Vec<u8>)], config: &AudioConfig) -> Vec<u8> {
        self.mix_at(guild_id, chunks, config, Instant::now())
    }

    /// [`mix`](Self::mix) with an explicit clock
    pub fn mix_at(
        &self,
        guild_id: GuildId,
        chunks: &[(StreamId, Vec<u8>)],
        config: &AudioConfig,
        now: Instant,
    ) -> Vec<u8> {
        if !self.pipeline.is_active(guild_id) {
            debug!(guild = %guild_id, "Not mixing for inactive guild");
            return Vec::new();
        }
        let Some(entry) = self.guilds.get(guild_id) else {
            return Vec::new();
        };
        let mut state = lock(&entry);

        let started = Instant::now();
        match Self::try_mix(&mut state, chunks, config, now) {
            Ok((out, stream_count)) => {
                if !out.is_empty() {
                    let elapsed = started.elapsed().as_secs_f64();
                    state.last_mix = Some(MixMetrics {
                        stream_count,
                        processing_time_ms: elapsed * 1000.0,
                        output_size_bytes: out.len(),
                        throughput_bps: if elapsed > 0.0 {
                            out.len() as f64 / elapsed
                        } else {
                            0.0
                        },
                        timestamp: Utc::now(),
                    });
                }
                out
            }
            Err(e) => {
                warn!(guild = %guild_id, error = %e, "Mixing failed, using first raw chunk");
                chunks
                    .iter()
                    .find(|(_, data)| !data.is_empty())
                    .map(|(_, data)| data.clone())
                    .unwrap_or_default()
            }
        }
    }

    fn try_mix(
        state: &mut GuildMix,
        chunks: &[(StreamId, Vec<u8>)],
        config: &AudioConfig,
        now: Instant,
    ) -> Result<(Vec<u8>, usize)> {
        state.fading.retain(|f| f.gain_at(now).is_some());
        pcm::check_bit_depth(config.bit_depth)?;

        // (decoded samples, gain, priority) for every usable chunk; in replace
        // mode a registered stream's gain is its fade-in alone
        let replace = state.mode == MixingMode::Replace;
        let mut inputs: Vec<(Vec<f32>, f32, Option<u8>)> = Vec::new();
        for (stream_id, data) in chunks {
            if data.is_empty() {
                continue;
            }
            if let Some(index) = state.position(stream_id) {
                let entry = &state.streams[index];
                if !entry.stream.is_live(now) {
                    continue;
                }
                let weight = state.weights.get(index).copied().unwrap_or(0.0);
                let samples = pcm::decode_i16_le(data, config.frame_bytes())?;
                let gain = if replace {
                    entry.fade_in_gain(now)
                } else {
                    weight * entry.fade_in_gain(now)
                };
                inputs.push((samples, gain, Some(entry.stream.priority)));
            } else if let Some(fading) = state.fading.iter().find(|f| &f.id == stream_id) {
                let gain = fading.gain_at(now).unwrap_or(0.0);
                let samples = pcm::decode_i16_le(data, config.frame_bytes())?;
                inputs.push((samples, gain, None));
            }
        }

        if inputs.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let len = inputs.iter().map(|(s, _, _)| s.len()).max().unwrap_or(0);
        let mut mixed = vec![0.0f32; len];

        match state.mode {
            MixingMode::Replace => {
                // Highest priority among the chunks present plays; fading streams decay on top
                let winner = highest_priority(
                    inputs
                        .iter()
                        .enumerate()
                        .filter_map(|(i, (_, _, p))| p.map(|p| (i, p))),
                );
                for (i, (samples, gain, priority)) in inputs.iter().enumerate() {
                    if priority.is_some() && Some(i) != winner {
                        continue;
                    }
                    accumulate(&mut mixed, samples, *gain);
                }
            }
            MixingMode::Overlay | MixingMode::Priority => {
                for (samples, gain, _) in &inputs {
                    accumulate(&mut mixed, samples, *gain);
                }
            }
            MixingMode::Crossfade => {
                let live = inputs.iter().filter(|(_, _, p)| p.is_some()).count().max(1) as f32;
                for (samples, gain, priority) in &inputs {
                    let share = if priority.is_some() { gain / live } else { *gain };
                    accumulate(&mut mixed, samples, share);
                }
            }
        }

        match state.crossfade.as_ref().map(|c| c.gain_at(now)) {
            Some(Some(gain)) => mixed.iter_mut().for_each(|s| *s *= gain),
            Some(None) => state.crossfade = None,
            None => {}
        }

        clip(&mut mixed);
        Ok((pcm::encode_i16_le(&mixed), inputs.len()))
    }

    // ===== Reporting =====

    /// Last mix metrics plus current stream state for a guild
    pub fn mix_report(&self, guild_id: GuildId) -> MixReport {
        self.guilds
            .with(guild_id, |state| MixReport {
                last_mix: state.last_mix.clone(),
                active_stream_count: state.streams.len(),
                mixing_mode: state.mode,
                streams: state
                    .streams
                    .iter()
                    .map(|e| StreamInfo {
                        stream_id: e.stream.id.clone(),
                        priority: e.stream.priority,
                        volume: e.stream.volume,
                        weight: state.weight_of(&e.stream.id),
                    })
                    .collect(),
                has_crossfade: state.crossfade.is_some(),
                fading_out: state.fading.len(),
                last_mix_time: state.last_mix.as_ref().map(|m| m.timestamp),
            })
            .unwrap_or_else(|| MixReport {
                last_mix: None,
                active_stream_count: 0,
                mixing_mode: MixingMode::default(),
                streams: Vec::new(),
                has_crossfade: false,
                fading_out: 0,
                last_mix_time: None,
            })
    }

    pub fn mixer_stats(&self) -> MixerStats {
        let mut stats = MixerStats {
            total_guilds: 0,
            total_active_streams: 0,
            mixing_mode_distribution: BTreeMap::new(),
            active_crossfades: 0,
            average_streams_per_guild: 0.0,
        };

        for (_, entry) in self.guilds.entries() {
            let state = lock(&entry);
            stats.total_guilds += 1;
            stats.total_active_streams += state.streams.len();
            *stats
                .mixing_mode_distribution
                .entry(state.mode.as_str())
                .or_insert(0) += 1;
            if state.crossfade.is_some() {
                stats.active_crossfades += 1;
            }
        }
        if stats.total_guilds > 0 {
            stats.average_streams_per_guild =
                stats.total_active_streams as f64 / stats.total_guilds as f64;
        }
        stats
    }
}

fn accumulate(mixed: &mut [f32], samples: &[f32], gain: f32) {
    if gain == 0.0 {
        return;
    }
    for (out, sample) in mixed.iter_mut().zip(samples) {
        *out += sample * gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soundbridge_core::NullEventSink;
    use soundbridge_dsp::pcm::{bytes_to_i16, i16_to_bytes};

    fn mixer() -> (Arc<AudioPipeline>, StreamMixer) {
        let pipeline = Arc::new(AudioPipeline::new(Arc::new(NullEventSink)));
        let mixer = StreamMixer::new(Arc::clone(&pipeline), Arc::new(NullEventSink));
        (pipeline, mixer)
    }

    fn chunk(id: &str, value: i16, len: usize) -> (StreamId, Vec<u8>) {
        (StreamId::from(id), i16_to_bytes(&vec![value; len]))
    }

    #[test]
    fn replace_weights_pick_first_highest() {
        let streams = vec![
            AudioStream::new("a").with_priority(5),
            AudioStream::new("b").with_priority(5),
            AudioStream::new("c").with_priority(2),
        ];
        assert_eq!(
            compute_weights(&streams, MixingMode::Replace),
            vec![1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn replace_mode_clears_previous_streams() {
        let (_, mixer) = mixer();
        let guild = GuildId::new(1);
        mixer
            .add_stream(guild, AudioStream::new("a"), MixingMode::Overlay)
            .unwrap();
        mixer
            .add_stream(guild, AudioStream::new("b"), MixingMode::Overlay)
            .unwrap();
        mixer
            .add_stream(guild, AudioStream::new("c"), MixingMode::Replace)
            .unwrap();
        let ids: Vec<_> = mixer.active_streams(guild).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![StreamId::from("c")]);
    }

    #[test]
    fn invalid_priority_is_rejected() {
        let (_, mixer) = mixer();
        let stream = AudioStream::new("a").with_priority(11);
        assert!(mixer
            .add_stream(GuildId::new(1), stream, MixingMode::Overlay)
            .is_err());
    }

    #[test]
    fn inactive_guild_mixes_nothing() {
        let (_, mixer) = mixer();
        let guild = GuildId::new(1);
        mixer
            .add_stream(guild, AudioStream::new("a"), MixingMode::Replace)
            .unwrap();
        let out = mixer.mix(guild, &[chunk("a", 100, 4)], &AudioConfig::default());
        assert!(out.is_empty());
    }

    #[test]
    fn overlay_sums_weighted_chunks_and_pads() {
        let (pipeline, mixer) = mixer();
        let guild = GuildId::new(1);
        pipeline.start_processing(guild);
        mixer
            .add_stream(guild, AudioStream::new("a"), MixingMode::Overlay)
            .unwrap();
        mixer
            .add_stream(guild, AudioStream::new("b"), MixingMode::Overlay)
            .unwrap();

        let out = mixer.mix(
            guild,
            &[chunk("a", 1000, 8), chunk("b", 3000, 4)],
            &AudioConfig::default(),
        );
        let samples = bytes_to_i16(&out);
        assert_eq!(samples.len(), 8);
        assert!((i32::from(samples[0]) - 2000).abs() <= 1);
        assert!((i32::from(samples[7]) - 500).abs() <= 1);
    }

    #[test]
    fn unregistered_chunks_are_ignored() {
        let (pipeline, mixer) = mixer();
        let guild = GuildId::new(1);
        pipeline.start_processing(guild);
        mixer
            .add_stream(guild, AudioStream::new("a"), MixingMode::Replace)
            .unwrap();
        let out = mixer.mix(guild, &[chunk("ghost", 500, 4)], &AudioConfig::default());
        assert!(out.is_empty());
    }

    #[test]
    fn malformed_chunk_falls_back_to_first_raw() {
        let (pipeline, mixer) = mixer();
        let guild = GuildId::new(1);
        pipeline.start_processing(guild);
        mixer
            .add_stream(guild, AudioStream::new("a"), MixingMode::Overlay)
            .unwrap();
        mixer
            .add_stream(guild, AudioStream::new("b"), MixingMode::Overlay)
            .unwrap();
        let good = chunk("a", 700, 4);
        let bad = (StreamId::from("b"), vec![1u8, 2, 3]);
        let out = mixer.mix(guild, &[good.clone(), bad], &AudioConfig::default());
        assert_eq!(out, good.1);
    }

    #[test]
    fn non_16_bit_chunks_are_not_summed() {
        let (pipeline, mixer) = mixer();
        let guild = GuildId::new(1);
        pipeline.start_processing(guild);
        mixer
            .add_stream(guild, AudioStream::new("a"), MixingMode::Overlay)
            .unwrap();
        mixer
            .add_stream(guild, AudioStream::new("b"), MixingMode::Overlay)
            .unwrap();
        let config = AudioConfig {
            channels: 1,
            bit_depth: 24,
            ..Default::default()
        };
        let first = (StreamId::from("a"), [0x00, 0x00, 0x01].repeat(4));
        let second = (StreamId::from("b"), [0x00, 0x00, 0x02].repeat(4));
        let out = mixer.mix(guild, &[first.clone(), second], &config);
        assert_eq!(out, first.1);
    }

    #[test]
    fn crossfade_requires_known_target() {
        let (_, mixer) = mixer();
        let guild = GuildId::new(1);
        mixer
            .add_stream(guild, AudioStream::new("a"), MixingMode::Replace)
            .unwrap();
        assert!(mixer
            .crossfade_to_stream(guild, &StreamId::from("zzz"), Duration::from_secs(1))
            .is_err());
        assert!(mixer
            .crossfade_to_stream(guild, &StreamId::from("a"), Duration::from_secs(1))
            .is_ok());
        assert!(mixer.mix_report(guild).has_crossfade);
    }

    #[test]
    fn report_serializes_for_the_event_bus() {
        let (_, mixer) = mixer();
        let guild = GuildId::new(1);
        mixer
            .add_stream(guild, AudioStream::new("a").with_priority(4), MixingMode::Overlay)
            .unwrap();
        let json = serde_json::to_value(mixer.mix_report(guild)).unwrap();
        assert_eq!(json["mixing_mode"], "overlay");
        assert_eq!(json["streams"][0]["stream_id"], "a");
        assert_eq!(json["streams"][0]["weight"], 1.0);
        assert!(json["last_mix"].is_null());
    }

    #[test]
    fn stats_count_modes() {
        let (_, mixer) = mixer();
        mixer
            .add_stream(GuildId::new(1), AudioStream::new("a"), MixingMode::Replace)
            .unwrap();
        mixer
            .add_stream(GuildId::new(2), AudioStream::new("b"), MixingMode::Overlay)
            .unwrap();
        mixer
            .add_stream(GuildId::new(2), AudioStream::new("c"), MixingMode::Overlay)
            .unwrap();
        let stats = mixer.mixer_stats();
        assert_eq!(stats.total_guilds, 2);
        assert_eq!(stats.total_active_streams, 3);
        assert_eq!(stats.mixing_mode_distribution.get("overlay"), Some(&1));
        assert!((stats.average_streams_per_guild - 1.5).abs() < 1e-9);
    }
}
