//! Adaptive quality control
//!
//! A background loop samples each active guild's CPU usage, keeps a short
//! rolling history and steps the guild's quality tier down when the
//! average exceeds its CPU limit, or up when there is ample headroom.
//! Downgrades and upgrades have separate cooldowns.

use crate::error::Result;
use crate::guild::{lock, GuildMap};
use crate::pipeline::AudioPipeline;
use serde::{Deserialize, Serialize};
use soundbridge_core::{
    AudioEvent, ConfigError, EventSink, GuildId, QualityChangeReason, QualityTier, StepDirection,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Source of per-guild CPU usage samples (percent)
pub trait CpuUsageProbe: Send + Sync {
    /// Latest CPU usage for the guild, if known
    fn cpu_usage(&self, guild_id: GuildId) -> Option<f32>;
}

/// CPU usage reported by whoever does the processing
///
/// Processing loops call [`CpuGauge::record_processing`] after each chunk;
/// the controller reads the latest value.
#[derive(Debug, Default)]
pub struct CpuGauge {
    readings: RwLock<HashMap<GuildId, f32>>,
}

impl CpuGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a CPU usage percentage directly
    pub fn record(&self, guild_id: GuildId, percent: f32) {
        if !percent.is_finite() {
            return;
        }
        self.readings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(guild_id, percent.max(0.0));
    }

    /// Record usage as time spent processing relative to the audio's length
    pub fn record_processing(&self, guild_id: GuildId, spent: Duration, audio: Duration) {
        if audio.is_zero() {
            return;
        }
        self.record(
            guild_id,
            (spent.as_secs_f64() / audio.as_secs_f64() * 100.0) as f32,
        );
    }

    pub fn forget(&self, guild_id: GuildId) {
        self.readings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&guild_id);
    }
}

impl CpuUsageProbe for CpuGauge {
    fn cpu_usage(&self, guild_id: GuildId) -> Option<f32> {
        self.readings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&guild_id)
            .copied()
    }
}

/// Controller tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    /// Time between ticks (ms)
    pub tick_interval_ms: u64,
    /// Samples kept per guild
    pub history_len: usize,
    /// Samples needed before any decision
    pub min_samples: usize,
    /// Minimum time between downgrades (s)
    pub downgrade_cooldown_secs: u64,
    /// Minimum time between upgrades (s)
    pub upgrade_cooldown_secs: u64,
    /// Upgrade when the average is below this fraction of the limit
    pub upgrade_headroom: f32,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5000,
            history_len: 10,
            min_samples: 3,
            downgrade_cooldown_secs: 10,
            upgrade_cooldown_secs: 30,
            upgrade_headroom: 0.5,
        }
    }
}

impl QualitySettings {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidInput(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.history_len == 0 || self.min_samples == 0 || self.min_samples > self.history_len
        {
            return Err(ConfigError::InvalidInput(format!(
                "min_samples ({}) must be between 1 and history_len ({})",
                self.min_samples, self.history_len
            )));
        }
        ConfigError::check_range(
            "upgrade_headroom",
            f64::from(self.upgrade_headroom),
            0.0,
            1.0,
        )
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn downgrade_cooldown(&self) -> Duration {
        Duration::from_secs(self.downgrade_cooldown_secs)
    }

    pub fn upgrade_cooldown(&self) -> Duration {
        Duration::from_secs(self.upgrade_cooldown_secs)
    }
}

/// A tier change made during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityTransition {
    pub guild_id: GuildId,
    pub previous: QualityTier,
    pub quality: QualityTier,
    pub reason: QualityChangeReason,
}

#[derive(Default)]
struct GuildQuality {
    history: VecDeque<f32>,
    last_change: Option<Instant>,
}

/// Steps guild quality tiers to fit their CPU budget
pub struct QualityController {
    pipeline: Arc<AudioPipeline>,
    probe: Arc<dyn CpuUsageProbe>,
    events: Arc<dyn EventSink>,
    settings: QualitySettings,
    guilds: GuildMap<GuildQuality>,
}

impl QualityController {
    pub fn new(
        pipeline: Arc<AudioPipeline>,
        probe: Arc<dyn CpuUsageProbe>,
        events: Arc<dyn EventSink>,
        settings: QualitySettings,
    ) -> Self {
        Self {
            pipeline,
            probe,
            events,
            settings,
            guilds: GuildMap::new(),
        }
    }

    pub fn settings(&self) -> &QualitySettings {
        &self.settings
    }

    /// Evaluate every active guild once
    ///
    /// Guilds that are inactive when the tick starts are skipped. A failure
    /// for one guild is logged and does not affect the others.
    pub fn tick(&self, now: Instant) -> Vec<QualityTransition> {
        let mut transitions = Vec::new();
        for guild_id in self.pipeline.active_guilds() {
            match self.evaluate(guild_id, now) {
                Ok(Some(transition)) => transitions.push(transition),
                Ok(None) => {}
                Err(e) => error!(guild = %guild_id, error = %e, "Quality check failed"),
            }
        }
        transitions
    }

    fn evaluate(&self, guild_id: GuildId, now: Instant) -> Result<Option<QualityTransition>> {
        let Some(sample) = self.probe.cpu_usage(guild_id) else {
            debug!(guild = %guild_id, "No CPU sample yet");
            return Ok(None);
        };

        // Held across the whole check-then-write so one guild never double-steps
        let entry = self.guilds.get_or_insert_with(guild_id, GuildQuality::default);
        let mut state = lock(&entry);

        state.history.push_back(sample);
        while state.history.len() > self.settings.history_len {
            state.history.pop_front();
        }
        if state.history.len() < self.settings.min_samples {
            return Ok(None);
        }
        let average = state.history.iter().sum::<f32>() / state.history.len() as f32;

        let last_change = state.last_change;
        let settings = &self.settings;
        // Decided and written under the pipeline's guild lock so a concurrent
        // config edit cannot be overwritten with a stale tier
        let decided = self.pipeline.modify_config(guild_id, |config| {
            let limit = config.cpu_limit_percent;
            let (direction, cooldown, reason) = if average > limit {
                (
                    StepDirection::Down,
                    settings.downgrade_cooldown(),
                    QualityChangeReason::CpuOverload,
                )
            } else if average < settings.upgrade_headroom * limit
                && config.quality != QualityTier::Ultra
            {
                (
                    StepDirection::Up,
                    settings.upgrade_cooldown(),
                    QualityChangeReason::PerformanceImproved,
                )
            } else {
                return None;
            };

            if let Some(last) = last_change {
                if now.saturating_duration_since(last) < cooldown {
                    debug!(guild = %guild_id, ?direction, "Quality change on cooldown");
                    return None;
                }
            }

            let next = config.quality.step(direction)?;
            config.quality = next;
            Some((reason, next))
        })?;
        let Some(((reason, next), change)) = decided else {
            return Ok(None);
        };

        if change.restart_required && self.pipeline.is_active(guild_id) {
            self.pipeline.restart_processing(guild_id);
        }
        state.last_change = Some(now);

        let previous = change.previous.quality;
        self.events.emit(AudioEvent::QualityChanged {
            guild_id,
            previous,
            quality: next,
            reason,
        });
        info!(
            guild = %guild_id,
            from = %previous,
            to = %next,
            average_cpu = average,
            "Quality tier changed"
        );

        Ok(Some(QualityTransition {
            guild_id,
            previous,
            quality: next,
            reason,
        }))
    }

    /// CPU samples currently held for a guild (oldest first)
    pub fn history(&self, guild_id: GuildId) -> Vec<f32> {
        self.guilds
            .with(guild_id, |state| state.history.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop a guild's history and cooldown
    pub fn forget_guild(&self, guild_id: GuildId) {
        self.guilds.remove(guild_id);
    }

    /// Tick on the configured interval until `shutdown` is cancelled
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = self.settings.tick_interval_ms,
            "Quality controller started"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick(tokio::time::Instant::now().into_std());
                }
            }
        }

        info!("Quality controller stopped");
    }

    /// Run the controller on the current tokio runtime
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soundbridge_core::NullEventSink;

    fn setup(settings: QualitySettings) -> (Arc<AudioPipeline>, Arc<CpuGauge>, QualityController) {
        let pipeline = Arc::new(AudioPipeline::new(Arc::new(NullEventSink)));
        let gauge = Arc::new(CpuGauge::new());
        let controller = QualityController::new(
            Arc::clone(&pipeline),
            gauge.clone(),
            Arc::new(NullEventSink),
            settings,
        );
        (pipeline, gauge, controller)
    }

    #[test]
    fn history_is_capped() {
        let (pipeline, gauge, controller) = setup(QualitySettings::default());
        let guild = GuildId::new(1);
        pipeline.start_processing(guild);
        gauge.record(guild, 30.0);

        let start = Instant::now();
        for i in 0..15 {
            controller.tick(start + Duration::from_secs(i));
        }
        assert_eq!(controller.history(guild).len(), 10);
    }

    #[test]
    fn needs_minimum_samples() {
        let (pipeline, gauge, controller) = setup(QualitySettings::default());
        let guild = GuildId::new(1);
        pipeline.start_processing(guild);
        gauge.record(guild, 99.0);

        let start = Instant::now();
        assert!(controller.tick(start).is_empty());
        assert!(controller.tick(start + Duration::from_secs(5)).is_empty());
        assert_eq!(controller.tick(start + Duration::from_secs(10)).len(), 1);
    }

    #[test]
    fn inactive_guilds_are_skipped() {
        let (_pipeline, gauge, controller) = setup(QualitySettings::default());
        let guild = GuildId::new(1);
        gauge.record(guild, 99.0);
        for _ in 0..5 {
            controller.tick(Instant::now());
        }
        assert!(controller.history(guild).is_empty());
    }

    #[test]
    fn blocked_step_leaves_cooldown_untouched() {
        let settings = QualitySettings {
            history_len: 3,
            min_samples: 3,
            ..Default::default()
        };
        let (pipeline, gauge, controller) = setup(settings);
        let guild = GuildId::new(3);
        pipeline
            .update_config(guild, |c| c.quality = QualityTier::Low)
            .unwrap();
        pipeline.start_processing(guild);

        // Overloaded at the lowest tier: nothing to step down to
        gauge.record(guild, 99.0);
        let start = Instant::now();
        for i in 0..3 {
            assert!(controller.tick(start + Duration::from_millis(i)).is_empty());
        }
        assert_eq!(pipeline.get_config(guild).quality, QualityTier::Low);

        // Load drops right away; the upgrade must not wait out a cooldown
        gauge.record(guild, 1.0);
        let later = start + Duration::from_millis(10);
        for i in 0..2 {
            assert!(controller.tick(later + Duration::from_millis(i)).is_empty());
        }
        let transitions = controller.tick(later + Duration::from_millis(2));
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].previous, QualityTier::Low);
        assert_eq!(transitions[0].quality, QualityTier::Medium);
        assert_eq!(pipeline.get_config(guild).quality, QualityTier::Medium);
    }

    #[test]
    fn gauge_converts_processing_time() {
        let gauge = CpuGauge::new();
        let guild = GuildId::new(2);
        gauge.record_processing(guild, Duration::from_millis(5), Duration::from_millis(20));
        assert_eq!(gauge.cpu_usage(guild), Some(25.0));
        gauge.forget(guild);
        assert_eq!(gauge.cpu_usage(guild), None);
    }

    #[test]
    fn settings_validation() {
        assert!(QualitySettings::default().validate().is_ok());
        let bad = QualitySettings {
            min_samples: 20,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
