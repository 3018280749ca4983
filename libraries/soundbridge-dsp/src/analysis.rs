//! Level analysis
//!
//! Quick loudness proxies computed from normalized samples. The LUFS value
//! is an RMS-based estimate, not a gated K-weighted measurement.

/// RMS below this is treated as silence by every stage
pub const SILENCE_RMS: f32 = 1e-10;

/// Offset between RMS dBFS and the LUFS estimate
pub const LUFS_OFFSET_DB: f32 = 0.691;

/// Root mean square of a buffer (0.0 for an empty buffer)
pub fn rms(buffer: &[f32]) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    let sum: f64 = buffer.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / buffer.len() as f64).sqrt() as f32
}

/// Absolute peak of a buffer
pub fn peak(buffer: &[f32]) -> f32 {
    buffer.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

/// True when the buffer's RMS is below [`SILENCE_RMS`]
pub fn is_silent(buffer: &[f32]) -> bool {
    rms(buffer) < SILENCE_RMS
}

/// Convert a linear amplitude to dBFS, flooring at [`SILENCE_RMS`]
#[inline]
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    20.0 * amplitude.max(SILENCE_RMS).log10()
}

/// Convert dB to a linear gain
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// LUFS estimate from an RMS value
#[inline]
pub fn lufs_estimate(rms: f32) -> f32 {
    amplitude_to_db(rms) - LUFS_OFFSET_DB
}

/// Level summary of one buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelAnalysis {
    pub rms: f32,
    pub rms_db: f32,
    pub peak: f32,
    pub peak_db: f32,
    pub lufs_estimate: f32,
    /// Peak to RMS ratio (linear)
    pub crest_factor: f32,
    pub crest_factor_db: f32,
    pub sample_count: usize,
}

/// Analyze a buffer; `None` when it is empty
pub fn analyze(buffer: &[f32]) -> Option<LevelAnalysis> {
    if buffer.is_empty() {
        return None;
    }

    let rms = rms(buffer);
    let peak = peak(buffer);
    let rms_db = amplitude_to_db(rms);
    let crest_factor = peak / rms.max(SILENCE_RMS);

    Some(LevelAnalysis {
        rms,
        rms_db,
        peak,
        peak_db: amplitude_to_db(peak),
        lufs_estimate: rms_db - LUFS_OFFSET_DB,
        crest_factor,
        crest_factor_db: amplitude_to_db(crest_factor),
        sample_count: buffer.len(),
    })
}
