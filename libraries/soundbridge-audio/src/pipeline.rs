//! Per-guild enhancement pipeline
//!
//! Decodes int16 PCM, runs the fixed stage order
//! (normalizer, AGC, compressor, master volume, EQ), clips and re-encodes.
//! Each stage is gated by its config flag and run through
//! [`apply_fail_open`], so a failing stage is skipped rather than
//! interrupting playback.

use crate::error::Result;
use crate::guild::{lock, GuildMap};
use crate::quality::CpuUsageProbe;
use soundbridge_core::{AudioConfig, AudioEvent, AudioMetrics, ConfigError, EventSink, GuildId};
use soundbridge_dsp::stages::{AutoGainControl, Compressor, MasterVolume, Normalizer, VolumeRamp};
use soundbridge_dsp::{analysis, apply_fail_open, clip, pcm, LevelAnalysis};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(not(feature = "biquad-eq"))]
use soundbridge_dsp::stages::SimpleEqualizer;
#[cfg(feature = "biquad-eq")]
use soundbridge_dsp::stages::ShelvingEqualizer;

/// Result of a successful configuration update
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    /// Config in force before the update
    pub previous: AudioConfig,
    /// Sample format or quality changed: stop and start processing again
    pub restart_required: bool,
}

/// Buffers allocated while a guild is processing
#[derive(Default)]
struct Buffers {
    samples: Vec<f32>,
    scratch: Vec<f32>,
}

impl Buffers {
    fn with_capacity(samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(samples),
            scratch: Vec::with_capacity(samples),
        }
    }
}

struct GuildAudio {
    config: AudioConfig,
    active: bool,
    token: Option<CancellationToken>,
    buffers: Option<Buffers>,
    ramp: Option<VolumeRamp>,
    metrics: Option<AudioMetrics>,
    levels: Option<LevelAnalysis>,
    #[cfg(feature = "biquad-eq")]
    shelving: Option<ShelvingEqualizer>,
}

impl GuildAudio {
    fn new(config: AudioConfig) -> Self {
        Self {
            config,
            active: false,
            token: None,
            buffers: None,
            ramp: None,
            metrics: None,
            levels: None,
            #[cfg(feature = "biquad-eq")]
            shelving: None,
        }
    }

    /// Volume the master-volume stage should use right now
    fn effective_volume(&mut self, target: f32, now: Instant) -> f32 {
        let Some(ramp) = self.ramp else {
            return target;
        };
        if ramp.is_finished(now) {
            self.ramp = None;
            return target;
        }
        if ramp.target() == target {
            ramp.value_at(now)
        } else {
            target
        }
    }
}

/// Per-guild audio enhancement pipeline
pub struct AudioPipeline {
    guilds: GuildMap<GuildAudio>,
    defaults: AudioConfig,
    events: Arc<dyn EventSink>,
    cpu_probe: Option<Arc<dyn CpuUsageProbe>>,
    root: CancellationToken,
}

impl AudioPipeline {
    /// Pipeline whose guilds start from `AudioConfig::default()`
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            guilds: GuildMap::new(),
            defaults: AudioConfig::default(),
            events,
            cpu_probe: None,
            root: CancellationToken::new(),
        }
    }

    /// Use `config` as the starting config for new guilds
    pub fn with_default_config(mut self, config: AudioConfig) -> Result<Self> {
        config.validate()?;
        self.defaults = config;
        Ok(self)
    }

    /// Attach the CPU usage source recorded in each pass's metrics
    pub fn with_cpu_probe(mut self, probe: Arc<dyn CpuUsageProbe>) -> Self {
        self.cpu_probe = Some(probe);
        self
    }

    fn entry(&self, guild_id: GuildId) -> Arc<std::sync::Mutex<GuildAudio>> {
        self.guilds
            .get_or_insert_with(guild_id, || GuildAudio::new(self.defaults.clone()))
    }

    // ===== Processing =====

    /// Enhance one chunk of int16 LE PCM using `config`
    ///
    /// Returns an empty buffer when the guild is not processing. Any
    /// internal failure returns the original bytes unchanged.
    pub fn process(&self, guild_id: GuildId, raw: &[u8], config: &AudioConfig) -> Vec<u8> {
        if raw.is_empty() {
            return Vec::new();
        }
        let Some(entry) = self.guilds.get(guild_id) else {
            debug!(guild = %guild_id, "Dropping chunk for unknown guild");
            return Vec::new();
        };
        let mut state = lock(&entry);
        if !state.active {
            debug!(guild = %guild_id, "Dropping chunk for inactive guild");
            return Vec::new();
        }

        let started = Instant::now();
        match self.try_process(&mut state, raw, config, started) {
            Ok(out) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                let cpu = self
                    .cpu_probe
                    .as_ref()
                    .and_then(|probe| probe.cpu_usage(guild_id));
                state.metrics = Some(AudioMetrics::new(guild_id, latency_ms, cpu, config));
                out
            }
            Err(e) => {
                warn!(guild = %guild_id, error = %e, "Processing failed, passing audio through");
                raw.to_vec()
            }
        }
    }

    /// Enhance one chunk using the guild's stored config
    pub fn process_current(&self, guild_id: GuildId, raw: &[u8]) -> Vec<u8> {
        let config = self.get_config(guild_id);
        self.process(guild_id, raw, &config)
    }

    fn try_process(
        &self,
        state: &mut GuildAudio,
        raw: &[u8],
        config: &AudioConfig,
        now: Instant,
    ) -> Result<Vec<u8>> {
        config.validate()?;

        let volume = state.effective_volume(config.master_volume, now);
        let mut buffers = state.buffers.take().unwrap_or_default();
        let result = self.run_stages(state, &mut buffers, raw, config, volume);
        state.buffers = Some(buffers);
        result
    }

    fn run_stages(
        &self,
        state: &mut GuildAudio,
        buffers: &mut Buffers,
        raw: &[u8],
        config: &AudioConfig,
        volume: f32,
    ) -> Result<Vec<u8>> {
        let Buffers { samples, scratch } = buffers;
        pcm::check_bit_depth(config.bit_depth)?;
        pcm::decode_i16_le_into(raw, config.frame_bytes(), samples)?;
        state.levels = analysis::analyze(samples);

        if config.normalization_enabled {
            apply_fail_open(
                &mut Normalizer::new(config.normalization_target_lufs),
                samples,
                scratch,
            );
        }
        if config.auto_gain_control {
            apply_fail_open(&mut AutoGainControl::new(), samples, scratch);
        }
        if config.dynamic_range_compression > 0.0 {
            apply_fail_open(
                &mut Compressor::new(config.dynamic_range_compression),
                samples,
                scratch,
            );
        }
        apply_fail_open(&mut MasterVolume::new(volume), samples, scratch);
        if config.eq_enabled {
            self.equalize(state, samples, scratch, config);
        }

        clip(samples);
        Ok(pcm::encode_i16_le(samples))
    }

    #[cfg(not(feature = "biquad-eq"))]
    fn equalize(
        &self,
        _state: &mut GuildAudio,
        samples: &mut [f32],
        scratch: &mut Vec<f32>,
        config: &AudioConfig,
    ) {
        let bands = config.eq_bands();
        if !bands.is_flat() {
            apply_fail_open(&mut SimpleEqualizer::new(bands), samples, scratch);
        }
    }

    #[cfg(feature = "biquad-eq")]
    fn equalize(
        &self,
        state: &mut GuildAudio,
        samples: &mut [f32],
        scratch: &mut Vec<f32>,
        config: &AudioConfig,
    ) {
        let bands = config.eq_bands();
        if state.shelving.is_none() {
            match ShelvingEqualizer::new(bands, config.sample_rate, config.channels as usize) {
                Ok(eq) => state.shelving = Some(eq),
                Err(e) => {
                    warn!(error = %e, "Equalizer design failed, skipping EQ");
                    return;
                }
            }
        }
        if let Some(eq) = state.shelving.as_mut() {
            if let Err(e) = eq.set_bands(bands) {
                warn!(error = %e, "Equalizer retune failed, skipping EQ");
                return;
            }
            apply_fail_open(eq, samples, scratch);
        }
    }

    // ===== Configuration =====

    /// Current config for a guild, creating the default on first read
    pub fn get_config(&self, guild_id: GuildId) -> AudioConfig {
        lock(&self.entry(guild_id)).config.clone()
    }

    /// Replace a guild's config
    ///
    /// The new config is validated as a whole; on rejection the previous
    /// config stays in force. Framing changes are not hot-swapped: the
    /// returned change says whether the caller must restart processing.
    pub fn set_config(&self, guild_id: GuildId, config: AudioConfig) -> Result<ConfigChange> {
        self.update_config(guild_id, move |current| *current = config)
    }

    /// Modify a guild's config in place, atomically
    ///
    /// `update` runs on a copy while the guild is locked; the copy is only
    /// stored if it validates.
    pub fn update_config(
        &self,
        guild_id: GuildId,
        update: impl FnOnce(&mut AudioConfig),
    ) -> Result<ConfigChange> {
        let change = self.modify_config(guild_id, |config| {
            update(config);
            Some(())
        })?;
        // The closure above always returns Some
        change.map(|((), change)| change).ok_or_else(|| {
            ConfigError::InvalidInput("config update was abandoned".to_string()).into()
        })
    }

    /// Decide on and apply a config change under the guild's lock
    ///
    /// `decide` sees a copy of the current config. Returning `None` leaves
    /// everything untouched and emits nothing; returning `Some` stores the
    /// modified copy if it validates.
    pub fn modify_config<R>(
        &self,
        guild_id: GuildId,
        decide: impl FnOnce(&mut AudioConfig) -> Option<R>,
    ) -> Result<Option<(R, ConfigChange)>> {
        let entry = self.entry(guild_id);
        let mut state = lock(&entry);

        let mut next = state.config.clone();
        let Some(outcome) = decide(&mut next) else {
            return Ok(None);
        };
        if let Err(e) = next.validate() {
            warn!(guild = %guild_id, error = %e, "Rejected config update");
            return Err(e.into());
        }

        let restart_required = state.config.needs_restart(&next);
        if next.master_volume != state.config.master_volume {
            state.ramp = None;
        }
        #[cfg(feature = "biquad-eq")]
        if restart_required {
            state.shelving = None;
        }
        let previous = std::mem::replace(&mut state.config, next);

        self.events.emit(AudioEvent::ConfigChanged {
            guild_id,
            config: Box::new(state.config.clone()),
            restart_required,
        });
        debug!(guild = %guild_id, restart_required, "Config updated");

        Ok(Some((
            outcome,
            ConfigChange {
                previous,
                restart_required,
            },
        )))
    }

    /// Change master volume with a short smoothstep ramp
    pub fn set_master_volume(&self, guild_id: GuildId, volume: f32) -> Result<()> {
        ConfigError::check_range("master_volume", f64::from(volume), 0.0, 1.0)?;

        let entry = self.entry(guild_id);
        let mut state = lock(&entry);
        let now = Instant::now();
        let old_volume = state.config.master_volume;
        let current = state.effective_volume(old_volume, now);

        state.config.master_volume = volume;
        state.ramp = Some(VolumeRamp::new(
            current,
            volume,
            now,
            soundbridge_dsp::stages::DEFAULT_RAMP,
        ));

        self.events.emit(AudioEvent::VolumeChanged {
            guild_id,
            old_volume,
            new_volume: volume,
        });
        info!(guild = %guild_id, old_volume, new_volume = volume, "Master volume changed");
        Ok(())
    }

    // ===== Lifecycle =====

    /// Start processing for a guild
    ///
    /// Idempotent: an already active guild keeps its token and buffers.
    /// The returned token is cancelled when processing stops.
    pub fn start_processing(&self, guild_id: GuildId) -> CancellationToken {
        let entry = self.entry(guild_id);
        let mut state = lock(&entry);

        if state.active {
            if let Some(token) = &state.token {
                return token.clone();
            }
        }

        let token = self.root.child_token();
        state.active = true;
        state.token = Some(token.clone());
        state.buffers = Some(Buffers::with_capacity(state.config.buffer_size as usize));

        self.events.emit(AudioEvent::ProcessingStarted { guild_id });
        info!(guild = %guild_id, "Audio processing started");
        token
    }

    /// Stop processing for a guild, releasing its buffers
    ///
    /// Returns whether the guild was active.
    pub fn stop_processing(&self, guild_id: GuildId) -> bool {
        let Some(entry) = self.guilds.get(guild_id) else {
            return false;
        };
        let mut state = lock(&entry);
        if !state.active {
            return false;
        }

        state.active = false;
        if let Some(token) = state.token.take() {
            token.cancel();
        }
        state.buffers = None;
        state.ramp = None;
        #[cfg(feature = "biquad-eq")]
        {
            state.shelving = None;
        }

        self.events.emit(AudioEvent::ProcessingStopped { guild_id });
        info!(guild = %guild_id, "Audio processing stopped");
        true
    }

    /// Stop then start, applying a framing change
    ///
    /// The swap happens under the guild's lock, so the guild never reads as
    /// inactive in between: the old token is cancelled, buffers are
    /// reallocated for the current config and a fresh token is issued.
    pub fn restart_processing(&self, guild_id: GuildId) -> CancellationToken {
        let entry = self.entry(guild_id);
        let mut state = lock(&entry);

        let was_active = state.active;
        if let Some(old) = state.token.take() {
            old.cancel();
        }
        state.ramp = None;
        #[cfg(feature = "biquad-eq")]
        {
            state.shelving = None;
        }
        if was_active {
            self.events.emit(AudioEvent::ProcessingStopped { guild_id });
        }

        let token = self.root.child_token();
        state.active = true;
        state.token = Some(token.clone());
        state.buffers = Some(Buffers::with_capacity(state.config.buffer_size as usize));

        self.events.emit(AudioEvent::ProcessingStarted { guild_id });
        info!(guild = %guild_id, was_active, "Audio processing restarted");
        token
    }

    /// Stop every guild and cancel all outstanding tokens
    pub fn shutdown(&self) {
        for guild_id in self.active_guilds() {
            self.stop_processing(guild_id);
        }
        self.root.cancel();
    }

    pub fn is_active(&self, guild_id: GuildId) -> bool {
        self.guilds
            .with(guild_id, |state| state.active)
            .unwrap_or(false)
    }

    /// Guilds currently processing (sorted)
    pub fn active_guilds(&self) -> Vec<GuildId> {
        self.guilds
            .guilds()
            .into_iter()
            .filter(|&guild_id| self.is_active(guild_id))
            .collect()
    }

    /// Cancellation token of an active guild
    pub fn guild_token(&self, guild_id: GuildId) -> Option<CancellationToken> {
        self.guilds
            .with(guild_id, |state| state.token.clone())
            .flatten()
    }

    // ===== Observability =====

    /// Metrics of the guild's last successful pass
    pub fn metrics(&self, guild_id: GuildId) -> Option<AudioMetrics> {
        self.guilds
            .with(guild_id, |state| state.metrics.clone())
            .flatten()
    }

    /// Level analysis of the guild's last input chunk
    pub fn volume_metrics(&self, guild_id: GuildId) -> Option<LevelAnalysis> {
        self.guilds.with(guild_id, |state| state.levels).flatten()
    }

    /// Whether a guild currently holds processing buffers
    pub fn has_buffers(&self, guild_id: GuildId) -> bool {
        self.guilds
            .with(guild_id, |state| state.buffers.is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soundbridge_core::{NullEventSink, QualityTier};
    use soundbridge_dsp::pcm::{bytes_to_i16, i16_to_bytes};

    fn pipeline() -> AudioPipeline {
        AudioPipeline::new(Arc::new(NullEventSink))
    }

    #[test]
    fn inactive_guild_produces_nothing() {
        let p = pipeline();
        let out = p.process_current(GuildId::new(1), &i16_to_bytes(&[100; 8]));
        assert!(out.is_empty());
    }

    #[test]
    fn malformed_chunk_passes_through() {
        let p = pipeline();
        let guild = GuildId::new(1);
        p.start_processing(guild);
        let raw = vec![1u8, 2, 3];
        assert_eq!(p.process_current(guild, &raw), raw);
    }

    #[test]
    fn invalid_explicit_config_passes_through() {
        let p = pipeline();
        let guild = GuildId::new(1);
        p.start_processing(guild);
        let raw = i16_to_bytes(&[1000; 16]);
        let bad = AudioConfig {
            master_volume: 7.0,
            ..Default::default()
        };
        assert_eq!(p.process(guild, &raw, &bad), raw);
    }

    #[test]
    fn start_is_idempotent_and_stop_releases() {
        let p = pipeline();
        let guild = GuildId::new(2);
        let first = p.start_processing(guild);
        let second = p.start_processing(guild);
        assert!(p.is_active(guild));
        assert!(p.has_buffers(guild));

        assert!(p.stop_processing(guild));
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());
        assert!(!p.has_buffers(guild));
        assert!(!p.stop_processing(guild));
    }

    #[test]
    fn rejected_update_keeps_previous_config() {
        let p = pipeline();
        let guild = GuildId::new(3);
        let before = p.get_config(guild);
        let result = p.update_config(guild, |c| {
            c.master_volume = 0.1;
            c.eq_bass = 40.0;
        });
        assert!(result.is_err());
        assert_eq!(p.get_config(guild), before);
    }

    #[test]
    fn quality_change_requires_restart() {
        let p = pipeline();
        let guild = GuildId::new(4);
        let change = p
            .update_config(guild, |c| c.quality = QualityTier::Low)
            .unwrap();
        assert!(change.restart_required);
        assert_eq!(change.previous.quality, QualityTier::High);

        let change = p.update_config(guild, |c| c.master_volume = 0.3).unwrap();
        assert!(!change.restart_required);
    }

    #[test]
    fn volume_metrics_follow_input() {
        let p = pipeline();
        let guild = GuildId::new(5);
        p.start_processing(guild);
        p.process_current(guild, &i16_to_bytes(&[16384; 64]));
        let levels = p.volume_metrics(guild).unwrap();
        assert!((levels.rms - 0.5).abs() < 1e-6);
        assert!(p.metrics(guild).is_some());
    }

    #[test]
    fn volume_ramp_starts_from_previous_level() {
        let p = pipeline();
        let guild = GuildId::new(6);
        p.update_config(guild, |c| {
            c.normalization_enabled = false;
            c.master_volume = 1.0;
        })
        .unwrap();
        p.start_processing(guild);
        p.set_master_volume(guild, 0.0).unwrap();

        // Immediately after the change the ramp is still near full volume
        let out = bytes_to_i16(&p.process_current(guild, &i16_to_bytes(&[10000; 32])));
        assert!(out[0] > 9000, "ramp skipped: {}", out[0]);
        assert_eq!(p.get_config(guild).master_volume, 0.0);
    }

    #[test]
    fn restart_never_reads_inactive() {
        let p = Arc::new(pipeline());
        let guild = GuildId::new(7);
        let first = p.start_processing(guild);

        let restarter = {
            let p = Arc::clone(&p);
            std::thread::spawn(move || {
                for _ in 0..5_000 {
                    p.restart_processing(guild);
                }
            })
        };
        let mut inactive = 0;
        while !restarter.is_finished() {
            if !p.is_active(guild) {
                inactive += 1;
            }
        }
        restarter.join().unwrap();

        assert_eq!(inactive, 0);
        assert!(first.is_cancelled());
        assert!(p.is_active(guild));
        assert!(p.has_buffers(guild));
        assert!(!p.guild_token(guild).unwrap().is_cancelled());
    }

    #[test]
    fn non_16_bit_chunks_pass_through() {
        let p = pipeline();
        let guild = GuildId::new(8);
        p.start_processing(guild);
        let config = AudioConfig {
            master_volume: 0.5,
            normalization_enabled: false,
            channels: 1,
            bit_depth: 24,
            ..Default::default()
        };
        let raw = [0x00, 0x00, 0x01].repeat(4);
        assert_eq!(p.process(guild, &raw, &config), raw);
    }

    #[test]
    fn stray_chunks_do_not_register_guilds() {
        let p = pipeline();
        for id in 0..100 {
            let out = p.process(GuildId::new(id), &i16_to_bytes(&[1; 4]), &AudioConfig::default());
            assert!(out.is_empty());
        }
        assert!(p.guilds.is_empty());
    }

    #[test]
    fn declined_modification_changes_nothing() {
        let p = pipeline();
        let guild = GuildId::new(9);
        let before = p.get_config(guild);
        let outcome = p
            .modify_config(guild, |c| {
                c.master_volume = 0.1;
                None::<()>
            })
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(p.get_config(guild), before);
    }

    #[test]
    fn out_of_range_volume_is_rejected() {
        let p = pipeline();
        assert!(p.set_master_volume(GuildId::new(1), 1.5).is_err());
        assert!(p.set_master_volume(GuildId::new(1), f32::NAN).is_err());
    }
}
