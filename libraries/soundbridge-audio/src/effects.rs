//! Per-guild effects chain
//!
//! An ordered list of effects applied as a pass separate from the
//! pipeline's built-in stages. Only equalizer, compressor and ducking
//! effects process audio; other kinds are kept in the chain but pass
//! audio through unchanged.

use crate::error::{AudioError, Result};
use crate::guild::GuildMap;
use crate::pipeline::AudioPipeline;
use crate::presets::{self, EqPreset};
use chrono::{DateTime, Utc};
use serde::Serialize;
use soundbridge_core::types::MAX_CROSSFADE_SECS;
use soundbridge_core::{
    AudioConfig, AudioEvent, ConfigError, EffectId, EffectKind, EqBands, EventSink, GuildId,
};
use soundbridge_dsp::stages::{Compressor, Ducking, SimpleEqualizer, COMPRESSOR_THRESHOLD};
use soundbridge_dsp::{apply_fail_open, clip, pcm, Stage};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Named numeric parameters of an effect
pub type EffectParams = BTreeMap<String, f32>;

/// Ratio used by compressor effects without a `ratio` parameter
pub const DEFAULT_EFFECT_RATIO: f32 = 0.5;

/// Shortest crossfade accepted by [`EffectsChain::enable_crossfade`] (s)
pub const MIN_CROSSFADE_SECS: f32 = 0.1;

/// One entry in a guild's chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Effect {
    pub id: EffectId,
    pub kind: EffectKind,
    pub params: EffectParams,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Effect {
    fn new(kind: EffectKind, params: EffectParams) -> Self {
        Self {
            id: EffectId::generate(),
            kind,
            params,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    fn param(&self, name: &str, default: f32) -> f32 {
        self.params.get(name).copied().unwrap_or(default)
    }

    /// Stage implementing this effect, or `None` for pass-through kinds
    fn stage(&self) -> Option<Box<dyn Stage>> {
        match self.kind {
            EffectKind::Equalizer => Some(Box::new(SimpleEqualizer::new(EqBands::new(
                self.param("bass", 0.0),
                self.param("mid", 0.0),
                self.param("treble", 0.0),
            )))),
            EffectKind::Compressor => Some(Box::new(Compressor::with_threshold(
                self.param("threshold", COMPRESSOR_THRESHOLD),
                self.param("ratio", DEFAULT_EFFECT_RATIO),
            ))),
            EffectKind::Ducking => Some(Box::new(Ducking::new(self.param("level", 0.3)))),
            _ => None,
        }
    }
}

/// Summary of a guild's chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectsStats {
    pub total_effects: usize,
    pub enabled_effects: usize,
    pub effect_counts: BTreeMap<EffectKind, usize>,
    pub crossfade_enabled: bool,
    pub available_presets: usize,
    pub effects: Vec<Effect>,
}

#[derive(Default)]
struct GuildEffects {
    effects: Vec<Effect>,
    crossfade_secs: Option<f32>,
}

impl GuildEffects {
    fn find_kind_mut(&mut self, kind: EffectKind) -> Option<&mut Effect> {
        self.effects.iter_mut().find(|effect| effect.kind == kind)
    }
}

fn eq_params(bands: EqBands) -> EffectParams {
    EffectParams::from([
        ("bass".to_string(), bands.bass),
        ("mid".to_string(), bands.mid),
        ("treble".to_string(), bands.treble),
    ])
}

/// Per-guild effects chain
pub struct EffectsChain {
    guilds: GuildMap<GuildEffects>,
    pipeline: Arc<AudioPipeline>,
    events: Arc<dyn EventSink>,
}

impl EffectsChain {
    /// Chain that mirrors EQ, ducking and crossfade settings into `pipeline`
    pub fn new(pipeline: Arc<AudioPipeline>, events: Arc<dyn EventSink>) -> Self {
        Self {
            guilds: GuildMap::new(),
            pipeline,
            events,
        }
    }

    // ===== Chain editing =====

    /// Append an effect and return its id
    pub fn add_effect(
        &self,
        guild_id: GuildId,
        kind: EffectKind,
        params: EffectParams,
    ) -> EffectId {
        let effect = Effect::new(kind, params);
        let id = effect.id.clone();
        self.guilds
            .with_or_insert(guild_id, GuildEffects::default, |state| {
                state.effects.push(effect);
            });

        self.events.emit(AudioEvent::EffectApplied {
            guild_id,
            effect_id: id.clone(),
            effect_type: kind,
        });
        info!(guild = %guild_id, effect = %id, kind = %kind, "Effect added");
        id
    }

    /// Remove an effect by id
    pub fn remove_effect(&self, guild_id: GuildId, effect_id: &EffectId) -> Result<Effect> {
        let removed = self
            .guilds
            .with(guild_id, |state| {
                let index = state.effects.iter().position(|e| &e.id == effect_id)?;
                Some(state.effects.remove(index))
            })
            .flatten()
            .ok_or_else(|| not_found(guild_id, effect_id))?;

        self.events.emit(AudioEvent::EffectRemoved {
            guild_id,
            effect_id: effect_id.clone(),
            effect_type: removed.kind,
        });
        info!(guild = %guild_id, effect = %effect_id, "Effect removed");
        Ok(removed)
    }

    /// Merge `params` into an existing effect's parameters
    pub fn update_effect(
        &self,
        guild_id: GuildId,
        effect_id: &EffectId,
        params: EffectParams,
    ) -> Result<()> {
        let kind = self
            .guilds
            .with(guild_id, |state| {
                let effect = state.effects.iter_mut().find(|e| &e.id == effect_id)?;
                effect.params.extend(params);
                Some(effect.kind)
            })
            .flatten()
            .ok_or_else(|| not_found(guild_id, effect_id))?;

        self.events.emit(AudioEvent::EffectApplied {
            guild_id,
            effect_id: effect_id.clone(),
            effect_type: kind,
        });
        debug!(guild = %guild_id, effect = %effect_id, "Effect updated");
        Ok(())
    }

    /// Enable or bypass an effect without removing it
    pub fn set_effect_enabled(
        &self,
        guild_id: GuildId,
        effect_id: &EffectId,
        enabled: bool,
    ) -> Result<()> {
        self.guilds
            .with(guild_id, |state| {
                let effect = state.effects.iter_mut().find(|e| &e.id == effect_id)?;
                effect.enabled = enabled;
                Some(())
            })
            .flatten()
            .ok_or_else(|| not_found(guild_id, effect_id))
    }

    /// Effects in chain order
    pub fn list_effects(&self, guild_id: GuildId) -> Vec<Effect> {
        self.guilds
            .with(guild_id, |state| state.effects.clone())
            .unwrap_or_default()
    }

    /// Whether the chain holds an enabled effect of `kind`
    pub fn has_enabled(&self, guild_id: GuildId, kind: EffectKind) -> bool {
        self.guilds
            .with(guild_id, |state| {
                state.effects.iter().any(|e| e.kind == kind && e.enabled)
            })
            .unwrap_or(false)
    }

    /// Drop a guild's chain
    pub fn clear_guild(&self, guild_id: GuildId) {
        if self.guilds.remove(guild_id).is_some() {
            debug!(guild = %guild_id, "Effects chain cleared");
        }
    }

    // ===== Convenience settings =====

    /// Set the three EQ bands
    ///
    /// Updates the chain's single equalizer effect (creating it if needed)
    /// and mirrors the bands into the guild's config with EQ enabled.
    /// Out-of-range gains are rejected without changing anything.
    pub fn set_eq(&self, guild_id: GuildId, bands: EqBands) -> Result<EffectId> {
        self.apply_bands(guild_id, bands, None)
    }

    /// Store `bands` and record which preset, if any, they came from
    fn apply_bands(
        &self,
        guild_id: GuildId,
        bands: EqBands,
        preset: Option<&'static str>,
    ) -> Result<EffectId> {
        bands.validate()?;

        let (id, created) = self
            .guilds
            .with_or_insert(guild_id, GuildEffects::default, |state| {
                if let Some(effect) = state.find_kind_mut(EffectKind::Equalizer) {
                    effect.params.extend(eq_params(bands));
                    (effect.id.clone(), false)
                } else {
                    let effect = Effect::new(EffectKind::Equalizer, eq_params(bands));
                    let id = effect.id.clone();
                    state.effects.push(effect);
                    (id, true)
                }
            });

        self.pipeline.update_config(guild_id, |config| {
            config.eq_enabled = true;
            config.set_eq_bands(bands);
            config.eq_preset = preset.map(str::to_string);
        })?;

        self.events.emit(AudioEvent::EffectApplied {
            guild_id,
            effect_id: id.clone(),
            effect_type: EffectKind::Equalizer,
        });
        info!(
            guild = %guild_id,
            bass = bands.bass,
            mid = bands.mid,
            treble = bands.treble,
            created,
            "EQ set"
        );
        Ok(id)
    }

    /// Apply a named preset (case-insensitive)
    pub fn apply_eq_preset(&self, guild_id: GuildId, name: &str) -> Result<&'static EqPreset> {
        let Some(preset) = presets::find_preset(name) else {
            warn!(guild = %guild_id, preset = name, "Unknown EQ preset");
            return Err(ConfigError::UnknownPreset(name.to_string()).into());
        };

        self.apply_bands(guild_id, preset.bands, Some(preset.name))?;
        info!(guild = %guild_id, preset = preset.name, "EQ preset applied");
        Ok(preset)
    }

    /// Enable constant-attenuation ducking
    ///
    /// Reuses an existing ducking effect rather than stacking another.
    pub fn enable_ducking(&self, guild_id: GuildId, level: f32, sensitivity: f32) -> Result<EffectId> {
        ConfigError::check_range("ducking_level", f64::from(level), 0.0, 1.0)?;
        ConfigError::check_range("ducking_sensitivity", f64::from(sensitivity), 0.0, 1.0)?;

        let params = EffectParams::from([
            ("level".to_string(), level),
            ("sensitivity".to_string(), sensitivity),
            ("attack_time".to_string(), 0.1),
            ("release_time".to_string(), 0.5),
        ]);
        let id = self
            .guilds
            .with_or_insert(guild_id, GuildEffects::default, |state| {
                if let Some(effect) = state.find_kind_mut(EffectKind::Ducking) {
                    effect.params.extend(params);
                    effect.enabled = true;
                    effect.id.clone()
                } else {
                    let effect = Effect::new(EffectKind::Ducking, params);
                    let id = effect.id.clone();
                    state.effects.push(effect);
                    id
                }
            });

        self.pipeline.update_config(guild_id, |config| {
            config.ducking_enabled = true;
            config.ducking_level = level;
            config.ducking_sensitivity = sensitivity;
        })?;

        self.events.emit(AudioEvent::EffectApplied {
            guild_id,
            effect_id: id.clone(),
            effect_type: EffectKind::Ducking,
        });
        info!(guild = %guild_id, level, sensitivity, "Ducking enabled");
        Ok(id)
    }

    /// Enable crossfading, clamping the duration to [0.1, 10] seconds
    ///
    /// Returns the duration actually stored.
    pub fn enable_crossfade(&self, guild_id: GuildId, duration_secs: f32) -> Result<f32> {
        if !duration_secs.is_finite() {
            return Err(ConfigError::InvalidInput(format!(
                "crossfade duration must be finite, got {duration_secs}"
            ))
            .into());
        }
        let duration = duration_secs.clamp(MIN_CROSSFADE_SECS, MAX_CROSSFADE_SECS);

        self.pipeline
            .update_config(guild_id, |config| config.crossfade_duration = duration)?;
        self.guilds
            .with_or_insert(guild_id, GuildEffects::default, |state| {
                state.crossfade_secs = Some(duration);
            });
        info!(guild = %guild_id, duration, "Crossfade enabled");
        Ok(duration)
    }

    /// Names of the built-in EQ presets
    pub fn available_presets(&self) -> Vec<&'static str> {
        presets::preset_names()
    }

    /// Look up a preset by name (case-insensitive)
    pub fn find_preset(&self, name: &str) -> Option<&'static EqPreset> {
        presets::find_preset(name)
    }

    pub fn effects_stats(&self, guild_id: GuildId) -> EffectsStats {
        let (effects, crossfade_enabled) = self
            .guilds
            .with(guild_id, |state| {
                (state.effects.clone(), state.crossfade_secs.is_some())
            })
            .unwrap_or_default();

        let mut effect_counts = BTreeMap::new();
        for effect in &effects {
            *effect_counts.entry(effect.kind).or_insert(0) += 1;
        }

        EffectsStats {
            total_effects: effects.len(),
            enabled_effects: effects.iter().filter(|e| e.enabled).count(),
            effect_counts,
            crossfade_enabled,
            available_presets: presets::EQ_PRESETS.len(),
            effects,
        }
    }

    // ===== Processing =====

    /// Run a chunk through the guild's enabled effects, in order
    ///
    /// Any failure returns the input unchanged; a failing effect is skipped
    /// while the rest of the chain still runs.
    pub fn process(&self, guild_id: GuildId, data: &[u8], config: &AudioConfig) -> Vec<u8> {
        let effects = self
            .guilds
            .with(guild_id, |state| {
                state
                    .effects
                    .iter()
                    .filter(|e| e.enabled)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if effects.is_empty() || data.is_empty() {
            return data.to_vec();
        }

        match Self::try_process(&effects, data, config) {
            Ok(out) => out,
            Err(e) => {
                warn!(guild = %guild_id, error = %e, "Effects pass failed, passing audio through");
                data.to_vec()
            }
        }
    }

    fn try_process(effects: &[Effect], data: &[u8], config: &AudioConfig) -> Result<Vec<u8>> {
        pcm::check_bit_depth(config.bit_depth)?;
        let mut samples = pcm::decode_i16_le(data, config.frame_bytes())?;
        let mut scratch = Vec::with_capacity(samples.len());

        for effect in effects {
            match effect.stage() {
                Some(mut stage) => {
                    apply_fail_open(stage.as_mut(), &mut samples, &mut scratch);
                }
                None => debug!(kind = %effect.kind, "No processor for effect, passing through"),
            }
        }

        clip(&mut samples);
        Ok(pcm::encode_i16_le(&samples))
    }
}

fn not_found(guild_id: GuildId, effect_id: &EffectId) -> AudioError {
    AudioError::EffectNotFound {
        guild_id,
        effect_id: effect_id.clone(),
    }
}
