//! Binary snapshot frames.
//!
//! Little-endian layout: an `i32` body count `N`, then `N` records of three
//! `f32` (x, y, z). 2D bodies are sent with z = 0. A frame is always
//! `4 + 12 * N` bytes long.

use thiserror::Error;

pub const HEADER_LEN: usize = 4;
pub const RECORD_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("too many bodies for one frame: {0}")]
    TooManyBodies(usize),

    #[error("frame shorter than its header ({0} bytes)")]
    Truncated(usize),

    #[error("negative body count {0}")]
    NegativeCount(i32),

    #[error("frame length {actual} does not match {expected} expected for its body count")]
    LengthMismatch { expected: usize, actual: usize },
}

pub fn frame_len(count: usize) -> usize {
    HEADER_LEN + RECORD_LEN * count
}

/// Encode positions into one frame
pub fn encode_snapshot<I>(positions: I) -> Result<Vec<u8>, CodecError>
where
    I: ExactSizeIterator<Item = [f32; 3]>,
{
    let count = positions.len();
    let header = i32::try_from(count).map_err(|_| CodecError::TooManyBodies(count))?;

    let mut frame = Vec::with_capacity(frame_len(count));
    frame.extend_from_slice(&header.to_le_bytes());
    for [x, y, z] in positions {
        frame.extend_from_slice(&x.to_le_bytes());
        frame.extend_from_slice(&y.to_le_bytes());
        frame.extend_from_slice(&z.to_le_bytes());
    }
    Ok(frame)
}

pub fn decode_snapshot(frame: &[u8]) -> Result<Vec<[f32; 3]>, CodecError> {
    let header: [u8; HEADER_LEN] = frame
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or(CodecError::Truncated(frame.len()))?;

    let count = i32::from_le_bytes(header);
    let count = usize::try_from(count).map_err(|_| CodecError::NegativeCount(count))?;

    let expected = frame_len(count);
    if frame.len() != expected {
        return Err(CodecError::LengthMismatch { expected, actual: frame.len() });
    }

    let records = frame[HEADER_LEN..]
        .chunks_exact(RECORD_LEN)
        .map(|r| {
            let f = |i: usize| f32::from_le_bytes([r[i], r[i + 1], r[i + 2], r[i + 3]]);
            [f(0), f(4), f(8)]
        })
        .collect();
    Ok(records)
}
