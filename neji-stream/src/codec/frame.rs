//! YUV frame encoding with integer subsampling
//!
//! ```text
//! ┌────────────┬────────────┬──────────┬──────────┬──────────┐
//! │ new width  │ new height │ Y samples│ U samples│ V samples│
//! │ u32 BE     │ u32 BE     │          │          │          │
//! └────────────┴────────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! `new width = floor(Y.width / k)` and `new height = floor(Y.height / k)`.
//! For k > 1 a sample survives when its row and column are both multiples of
//! k and the column is inside the logical width, so stride padding never
//! reaches the wire. For k = 1 the planes are copied verbatim, padding
//! included.

use super::Encoder;
use crate::error::{Error, Result};
use crate::types::{Plane, RawFrameItem};

const HEADER_BYTES: usize = 8;

/// Decoded frame header plus the concatenated plane samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<u8>,
}

/// Check that a plane's geometry fits its backing buffer
pub fn validate_plane(name: &str, plane: &Plane) -> Result<()> {
    if plane.width == 0 || plane.height == 0 {
        return Err(Error::FrameLayout(format!(
            "{name} plane is empty ({}x{})",
            plane.width, plane.height
        )));
    }
    if plane.stride < plane.width {
        return Err(Error::FrameLayout(format!(
            "{name} stride {} is smaller than width {}",
            plane.stride, plane.width
        )));
    }
    // The final row does not need trailing padding
    let required = (plane.height as usize - 1) * plane.stride as usize + plane.width as usize;
    if plane.data.len() < required {
        return Err(Error::FrameLayout(format!(
            "{name} buffer holds {} bytes, geometry needs {required}",
            plane.data.len()
        )));
    }
    Ok(())
}

/// Append the retained samples of one plane to `out`.
///
/// Nothing is written if the plane's geometry does not fit its buffer.
pub fn subsample_plane(plane: &Plane, factor: u32, out: &mut Vec<u8>) -> Result<()> {
    validate_plane("plane", plane)?;
    let k = factor.max(1) as usize;
    let width = plane.width as usize;
    let stride = plane.stride as usize;

    for row in (0..plane.height as usize).step_by(k) {
        let start = row * stride;
        let samples = &plane.data[start..start + width];
        out.extend(samples.iter().step_by(k));
    }
    Ok(())
}

/// Encodes raw frames at a fixed subsample factor
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    subsample: u32,
}

impl FrameEncoder {
    pub fn new(subsample: u32) -> Result<Self> {
        if subsample == 0 {
            return Err(Error::InvalidParameter(
                "subsample factor must be at least 1".to_string(),
            ));
        }
        Ok(Self { subsample })
    }

    pub fn subsample(&self) -> u32 {
        self.subsample
    }
}

impl Encoder for FrameEncoder {
    type Item = RawFrameItem;

    fn name(&self) -> &'static str {
        "frame"
    }

    fn encode(&self, frame: RawFrameItem) -> Result<Vec<u8>> {
        let planes = [("Y", &frame.y), ("U", &frame.u), ("V", &frame.v)];
        for (name, plane) in planes {
            validate_plane(name, plane)?;
        }

        let k = self.subsample;
        let new_width = frame.y.width / k;
        let new_height = frame.y.height / k;

        if k == 1 {
            let total: usize = planes.iter().map(|(_, p)| p.data.len()).sum();
            let mut buffer = Vec::with_capacity(HEADER_BYTES + total);
            buffer.extend_from_slice(&new_width.to_be_bytes());
            buffer.extend_from_slice(&new_height.to_be_bytes());
            for (_, plane) in planes {
                buffer.extend_from_slice(&plane.data);
            }
            return Ok(buffer);
        }

        let step = k as usize;
        let estimate: usize = planes
            .iter()
            .map(|(_, p)| (p.width as usize).div_ceil(step) * (p.height as usize).div_ceil(step))
            .sum();
        let mut buffer = Vec::with_capacity(HEADER_BYTES + estimate);
        buffer.extend_from_slice(&new_width.to_be_bytes());
        buffer.extend_from_slice(&new_height.to_be_bytes());
        for (_, plane) in planes {
            subsample_plane(plane, k, &mut buffer)?;
        }
        Ok(buffer)
    }
}

/// Parse a decompressed frame record
pub fn decode_frame(bytes: &[u8]) -> Result<FrameRecord> {
    if bytes.len() < HEADER_BYTES {
        return Err(Error::FrameLayout(format!(
            "frame record is {} bytes, header needs {HEADER_BYTES}",
            bytes.len()
        )));
    }
    let width = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let height = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Ok(FrameRecord {
        width,
        height,
        samples: bytes[HEADER_BYTES..].to_vec(),
    })
}
