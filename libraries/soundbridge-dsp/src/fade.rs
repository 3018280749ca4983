//! Fade curves for crossfades and stream fades
//!
//! - Linear: gain equals progress
//! - SquareRoot: faster rise than linear
//! - S-Curve: slow start and end
//! - Equal Power: constant perceived loudness when two fades overlap

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Fade curve type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// `gain = t`; the mixer's crossfade default
    #[default]
    Linear,
    SquareRoot,
    SCurve,
    EqualPower,
}

impl FadeCurve {
    /// Gain at normalized `position` (0.0 to 1.0)
    ///
    /// With `fade_out` the curve runs backwards, from 1.0 down to 0.0.
    #[inline]
    pub fn gain(&self, position: f32, fade_out: bool) -> f32 {
        let position = position.clamp(0.0, 1.0);
        let t = if fade_out { 1.0 - position } else { position };

        match self {
            FadeCurve::Linear => t,
            FadeCurve::SquareRoot => t.max(0.0).sqrt(),
            FadeCurve::SCurve => (1.0 - (PI * t).cos()) * 0.5,
            FadeCurve::EqualPower => (t * PI * 0.5).sin(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "linear",
            FadeCurve::SquareRoot => "square_root",
            FadeCurve::SCurve => "s_curve",
            FadeCurve::EqualPower => "equal_power",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [FadeCurve; 4] = [
        FadeCurve::Linear,
        FadeCurve::SquareRoot,
        FadeCurve::SCurve,
        FadeCurve::EqualPower,
    ];

    #[test]
    fn curves_span_zero_to_one() {
        for curve in ALL {
            assert!(curve.gain(0.0, false).abs() < 1e-6, "{curve:?}");
            assert!((curve.gain(1.0, false) - 1.0).abs() < 1e-6, "{curve:?}");
            assert!((curve.gain(0.0, true) - 1.0).abs() < 1e-6, "{curve:?}");
            assert!(curve.gain(1.0, true).abs() < 1e-6, "{curve:?}");
        }
    }

    #[test]
    fn linear_is_identity() {
        assert_eq!(FadeCurve::Linear.gain(0.3, false), 0.3);
        assert!((FadeCurve::Linear.gain(0.3, true) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn equal_power_keeps_power_constant() {
        for i in 0..=10 {
            let p = i as f32 / 10.0;
            let a = FadeCurve::EqualPower.gain(p, true);
            let b = FadeCurve::EqualPower.gain(p, false);
            assert!((a * a + b * b - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn out_of_range_position_is_clamped() {
        assert_eq!(FadeCurve::Linear.gain(2.0, false), 1.0);
        assert_eq!(FadeCurve::Linear.gain(-1.0, false), 0.0);
    }
}
