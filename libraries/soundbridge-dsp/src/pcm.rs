//! Signed 16-bit little-endian PCM conversion
//!
//! Decoding divides by 32768 so that every int16 maps into [-1.0, 1.0).
//! Encoding multiplies by 32767, rounds, and clips to the int16 range.

use crate::error::{DspError, Result};

const DECODE_SCALE: f32 = 32768.0;
const ENCODE_SCALE: f32 = 32767.0;

/// The only sample width this codec decodes
pub const BIT_DEPTH: u32 = 16;

/// Reject any sample width other than 16-bit
///
/// 8- and 24-bit chunks are valid configuration but would be misread as
/// int16, so callers check first and pass such chunks through untouched.
pub fn check_bit_depth(bits: u32) -> Result<()> {
    if bits == BIT_DEPTH {
        Ok(())
    } else {
        Err(DspError::UnsupportedBitDepth { bits })
    }
}

/// Decode interleaved int16 LE bytes into normalized floats
///
/// `frame_bytes` is the size of one interleaved frame (2 × channels);
/// a buffer that is not a whole number of frames is rejected.
pub fn decode_i16_le(bytes: &[u8], frame_bytes: usize) -> Result<Vec<f32>> {
    let mut out = Vec::with_capacity(bytes.len() / 2);
    decode_i16_le_into(bytes, frame_bytes, &mut out)?;
    Ok(out)
}

/// Decode into an existing buffer, replacing its contents
pub fn decode_i16_le_into(bytes: &[u8], frame_bytes: usize, out: &mut Vec<f32>) -> Result<()> {
    let frame_bytes = frame_bytes.max(2);
    if bytes.len() % frame_bytes != 0 {
        return Err(DspError::MalformedBuffer {
            len: bytes.len(),
            frame_bytes,
        });
    }

    out.clear();
    out.extend(
        bytes
            .chunks_exact(2)
            .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / DECODE_SCALE),
    );
    Ok(())
}

/// Convert one normalized sample to int16 with clipping
#[inline]
pub fn to_i16(sample: f32) -> i16 {
    (sample * ENCODE_SCALE)
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

/// Encode normalized floats back to int16 LE bytes
pub fn encode_i16_le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        out.extend_from_slice(&to_i16(sample).to_le_bytes());
    }
    out
}

/// Build int16 LE bytes from integer samples
pub fn i16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Read int16 LE bytes back into integer samples (trailing odd byte ignored)
pub fn bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
