/// Core error types for SoundBridge
use thiserror::Error;

/// Result type alias using `ConfigError`
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration validation errors
///
/// A rejected update never mutates the stored configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Numeric field outside its permitted range (or not finite)
    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Discrete field with a value outside the supported set
    #[error("{field} = {value} is not supported (allowed: {allowed:?})")]
    Unsupported {
        field: &'static str,
        value: u32,
        allowed: &'static [u32],
    },

    /// EQ preset name not present in the preset table
    #[error("Unknown EQ preset: {0}")]
    UnknownPreset(String),

    /// Invalid input that does not fit the other variants
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ConfigError {
    /// Check that `value` is finite and inside `[min, max]`
    pub fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
        if value.is_finite() && (min..=max).contains(&value) {
            Ok(())
        } else {
            Err(Self::OutOfRange {
                field,
                value,
                min,
                max,
            })
        }
    }

    /// Check that `value` is one of `allowed`
    pub fn check_allowed(field: &'static str, value: u32, allowed: &'static [u32]) -> Result<()> {
        if allowed.contains(&value) {
            Ok(())
        } else {
            Err(Self::Unsupported {
                field,
                value,
                allowed,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_out_of_range() {
        assert!(ConfigError::check_range("x", f64::NAN, 0.0, 1.0).is_err());
    }

    #[test]
    fn bounds_are_inclusive() {
        assert!(ConfigError::check_range("x", 0.0, 0.0, 1.0).is_ok());
        assert!(ConfigError::check_range("x", 1.0, 0.0, 1.0).is_ok());
        assert!(ConfigError::check_range("x", 1.0001, 0.0, 1.0).is_err());
    }
}
