/// Stage trait and the fail-open combinator
///
/// Every enhancement stage operates in place on normalized f32 samples in
/// [-1.0, 1.0]. Stages report problems through `Result`; callers run them
/// through [`apply_fail_open`] so that a failing stage never alters audio.
use crate::analysis;
use crate::error::{DspError, Result};

/// One step of the enhancement pipeline
///
/// # Contract
/// - `process` may assume the buffer is finite and not silent
/// - `process` must not change the buffer length
/// - Must be Send so guilds can be processed on any worker thread
pub trait Stage: Send {
    /// Stage name (for logging)
    fn name(&self) -> &'static str;

    /// Transform the buffer in place
    fn process(&mut self, buffer: &mut [f32]) -> Result<()>;

    /// Run the stage with the shared guards applied
    ///
    /// Rejects non-finite input and leaves silent buffers untouched, so no
    /// stage ever divides by a near-zero RMS.
    fn apply(&mut self, buffer: &mut [f32]) -> Result<()> {
        if buffer.iter().any(|s| !s.is_finite()) {
            return Err(DspError::NonFinite { stage: self.name() });
        }
        if analysis::is_silent(buffer) {
            return Ok(());
        }
        self.process(buffer)
    }
}

/// Run a stage on a scratch copy and return the result only if it is clean
///
/// The returned buffer has passed the finite-output check; on error the
/// input is untouched.
pub fn try_apply<S: Stage + ?Sized>(stage: &mut S, input: &[f32]) -> Result<Vec<f32>> {
    let mut scratch = input.to_vec();
    run_checked(stage, &mut scratch)?;
    Ok(scratch)
}

fn run_checked<S: Stage + ?Sized>(stage: &mut S, scratch: &mut [f32]) -> Result<()> {
    stage.apply(scratch)?;
    if scratch.iter().any(|s| !s.is_finite()) {
        return Err(DspError::NonFinite { stage: stage.name() });
    }
    Ok(())
}

/// Apply a stage, keeping the original samples if it fails
///
/// Works on `scratch` (reused between calls to avoid reallocating) and
/// copies the result back only on success. Returns whether the stage's
/// output was committed.
pub fn apply_fail_open<S: Stage + ?Sized>(
    stage: &mut S,
    buffer: &mut [f32],
    scratch: &mut Vec<f32>,
) -> bool {
    scratch.clear();
    scratch.extend_from_slice(buffer);

    match run_checked(stage, scratch) {
        Ok(()) => {
            buffer.copy_from_slice(scratch);
            true
        }
        Err(e) => {
            tracing::warn!(stage = stage.name(), error = %e, "Stage failed, passing audio through");
            false
        }
    }
}

/// Clamp every sample to [-1.0, 1.0]
pub fn clip(buffer: &mut [f32]) {
    for sample in buffer.iter_mut() {
        *sample = sample.clamp(-1.0, 1.0);
    }
}

/// Multiply every sample by `gain`
#[inline]
pub(crate) fn scale(buffer: &mut [f32], gain: f32) {
    for sample in buffer.iter_mut() {
        *sample *= gain;
    }
}
