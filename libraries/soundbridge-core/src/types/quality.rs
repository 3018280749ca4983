//! Processing quality tiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a quality transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    /// Towards `Low`
    Down,
    /// Towards `Ultra`
    Up,
}

/// Discrete processing-fidelity level, ordered from cheapest to most expensive
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// 22 kHz, 8-bit, minimal processing
    Low,
    /// 44.1 kHz, 16-bit, standard processing
    Medium,
    /// 48 kHz, 16-bit, full processing
    #[default]
    High,
    /// 48 kHz, 24-bit, maximum quality
    Ultra,
}

impl QualityTier {
    /// All tiers in ascending order
    pub const ALL: [QualityTier; 4] = [Self::Low, Self::Medium, Self::High, Self::Ultra];

    /// Move one tier in `direction`
    ///
    /// Returns `None` when already at the end of the scale in that direction.
    pub fn step(self, direction: StepDirection) -> Option<Self> {
        let index = self.index();
        let next = match direction {
            StepDirection::Down => index.checked_sub(1)?,
            StepDirection::Up => index + 1,
        };
        Self::ALL.get(next).copied()
    }

    /// Lowercase name used in events and configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Ultra => "ultra",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Ultra => 3,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_down_walks_one_tier_at_a_time() {
        assert_eq!(QualityTier::Ultra.step(StepDirection::Down), Some(QualityTier::High));
        assert_eq!(QualityTier::High.step(StepDirection::Down), Some(QualityTier::Medium));
        assert_eq!(QualityTier::Medium.step(StepDirection::Down), Some(QualityTier::Low));
        assert_eq!(QualityTier::Low.step(StepDirection::Down), None);
    }

    #[test]
    fn step_up_clamps_at_ultra() {
        assert_eq!(QualityTier::Low.step(StepDirection::Up), Some(QualityTier::Medium));
        assert_eq!(QualityTier::High.step(StepDirection::Up), Some(QualityTier::Ultra));
        assert_eq!(QualityTier::Ultra.step(StepDirection::Up), None);
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(QualityTier::Low < QualityTier::Medium);
        assert!(QualityTier::High < QualityTier::Ultra);
    }
}
