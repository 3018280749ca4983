/// DSP errors
use thiserror::Error;

/// Result type alias using `DspError`
pub type Result<T> = std::result::Result<T, DspError>;

/// Errors raised at stage boundaries
///
/// None of these stop playback: callers run stages through
/// [`apply_fail_open`](crate::apply_fail_open), which keeps the input
/// untouched when a stage fails.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    /// Byte buffer length is not a whole number of frames
    #[error("Malformed PCM buffer: {len} bytes is not a multiple of {frame_bytes}")]
    MalformedBuffer { len: usize, frame_bytes: usize },

    /// Sample width the int16 codec cannot handle
    #[error("Unsupported bit depth: {bits}")]
    UnsupportedBitDepth { bits: u32 },

    /// Stage received or produced NaN/Inf
    #[error("Non-finite sample in {stage}")]
    NonFinite { stage: &'static str },

    /// Stage parameter outside its usable range
    #[error("Invalid {name} for {stage}: {value}")]
    InvalidParameter {
        stage: &'static str,
        name: &'static str,
        value: f32,
    },

    /// Filter design failed
    #[error("Filter design failed: {0}")]
    FilterDesign(String),
}
