//! Processing metrics

use super::config::AudioConfig;
use super::ids::GuildId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latency above which the quality score starts to drop (ms)
pub const LATENCY_BUDGET_MS: f64 = 50.0;

/// Snapshot recorded after every processing pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMetrics {
    pub guild_id: GuildId,
    pub processing_latency_ms: f64,
    /// Externally supplied CPU usage, when a sample was available
    pub cpu_usage_percent: Option<f32>,
    /// 0.0 (poor) to 1.0 (perfect)
    pub quality_score: f32,
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_depth: u32,
    pub timestamp: DateTime<Utc>,
}

impl AudioMetrics {
    /// Build metrics for a pass that took `latency_ms`
    pub fn new(
        guild_id: GuildId,
        latency_ms: f64,
        cpu_usage_percent: Option<f32>,
        config: &AudioConfig,
    ) -> Self {
        Self {
            guild_id,
            processing_latency_ms: latency_ms,
            cpu_usage_percent,
            quality_score: quality_score(latency_ms),
            sample_rate: config.sample_rate,
            channels: config.channels,
            bit_depth: config.bit_depth,
            timestamp: Utc::now(),
        }
    }
}

/// Score a pass by its latency
///
/// 1.0 up to the 50 ms budget, then falls linearly to a floor of 0.1 at 140 ms.
pub fn quality_score(latency_ms: f64) -> f32 {
    let mut score = 1.0_f64;
    if latency_ms > LATENCY_BUDGET_MS {
        score *= (1.0 - (latency_ms - LATENCY_BUDGET_MS) / 100.0).max(0.1);
    }
    score.clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_passes_score_perfectly() {
        assert_eq!(quality_score(0.0), 1.0);
        assert_eq!(quality_score(50.0), 1.0);
    }

    #[test]
    fn slow_passes_degrade_to_floor() {
        assert!((quality_score(100.0) - 0.5).abs() < 1e-6);
        assert!((quality_score(1000.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn metrics_echo_format() {
        let config = AudioConfig {
            channels: 1,
            sample_rate: 22050,
            ..Default::default()
        };
        let metrics = AudioMetrics::new(GuildId::new(7), 3.0, None, &config);
        assert_eq!(metrics.channels, 1);
        assert_eq!(metrics.sample_rate, 22050);
        assert_eq!(metrics.guild_id, GuildId::new(7));
    }
}
