//! Master volume and smooth volume transitions
//!
//! Master volume is a flat linear multiply. Changes are smoothed by a
//! [`VolumeRamp`] so a sudden jump does not click.

use crate::error::{DspError, Result};
use crate::stage::Stage;
use std::time::{Duration, Instant};

/// Length of a master-volume transition
pub const DEFAULT_RAMP: Duration = Duration::from_millis(500);

/// Flat gain stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasterVolume {
    gain: f32,
}

impl MasterVolume {
    /// Volume stage with linear `gain` (0.0 to 1.0)
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl Stage for MasterVolume {
    fn name(&self) -> &'static str {
        "master_volume"
    }

    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        if !(0.0..=1.0).contains(&self.gain) {
            return Err(DspError::InvalidParameter {
                stage: "master_volume",
                name: "gain",
                value: self.gain,
            });
        }

        if self.gain == 0.0 {
            buffer.fill(0.0);
        } else if self.gain != 1.0 {
            for sample in buffer.iter_mut() {
                *sample *= self.gain;
            }
        }
        Ok(())
    }
}

/// Smoothstep transition between two volumes
///
/// `p = elapsed / duration`, value = `from + (to - from) * p²(3 - 2p)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeRamp {
    from: f32,
    to: f32,
    started: Instant,
    duration: Duration,
}

impl VolumeRamp {
    /// Start a ramp at `started`
    pub fn new(from: f32, to: f32, started: Instant, duration: Duration) -> Self {
        Self {
            from,
            to,
            started,
            duration,
        }
    }

    /// Start a ramp of the default length now
    pub fn start(from: f32, to: f32) -> Self {
        Self::new(from, to, Instant::now(), DEFAULT_RAMP)
    }

    pub fn target(&self) -> f32 {
        self.to
    }

    /// Normalized progress at `now` (0.0 to 1.0)
    pub fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    /// Interpolated volume at `now`
    pub fn value_at(&self, now: Instant) -> f32 {
        let p = self.progress(now);
        let eased = p * p * (3.0 - 2.0 * p);
        self.from + (self.to - self.from) * eased
    }

    /// True once the ramp has reached its target
    pub fn is_finished(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_volume_halves_samples() {
        let mut buffer = vec![0.5, -0.25];
        MasterVolume::new(0.5).apply(&mut buffer).unwrap();
        assert_eq!(buffer, vec![0.25, -0.125]);
    }

    #[test]
    fn zero_volume_silences() {
        let mut buffer = vec![0.5; 8];
        MasterVolume::new(0.0).apply(&mut buffer).unwrap();
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn ramp_is_smoothstep() {
        let start = Instant::now();
        let ramp = VolumeRamp::new(0.0, 1.0, start, Duration::from_millis(500));

        assert_eq!(ramp.value_at(start), 0.0);
        let mid = ramp.value_at(start + Duration::from_millis(250));
        assert!((mid - 0.5).abs() < 1e-6);
        let quarter = ramp.value_at(start + Duration::from_millis(125));
        assert!((quarter - 0.15625).abs() < 1e-5);
        assert_eq!(ramp.value_at(start + Duration::from_secs(2)), 1.0);
        assert!(ramp.is_finished(start + Duration::from_millis(500)));
    }

    #[test]
    fn downward_ramp() {
        let start = Instant::now();
        let ramp = VolumeRamp::new(0.8, 0.2, start, Duration::from_millis(100));
        let v = ramp.value_at(start + Duration::from_millis(50));
        assert!((v - 0.5).abs() < 1e-5);
        assert!(!ramp.is_finished(start + Duration::from_millis(50)));
    }
}
