use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, HistoryResult};

/// Painted pixel value.
pub const MASK_ON: u8 = 255;
/// Background pixel value.
pub const MASK_OFF: u8 = 0;

/// Largest mask the engine accepts (~256 megapixels).
const MAX_PIXELS: u64 = 256_000_000;

// ============================================================================
// MASK BUFFER – flat row-major binary raster, one byte per pixel
// ============================================================================

/// A binary mask: `width * height` bytes, row-major, each byte 0 or 255.
///
/// The history engine never keeps a `MaskBuffer` that aliases the caller's
/// live buffer; everything it stores or returns is an owned copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl MaskBuffer {
    /// Create an all-zero mask.
    pub fn new(width: u32, height: u32) -> HistoryResult<Self> {
        let len = checked_len(width, height)?;
        Ok(Self {
            width,
            height,
            data: vec![MASK_OFF; len],
        })
    }

    /// Wrap existing pixel data. `data` must be exactly `width * height` bytes.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> HistoryResult<Self> {
        let len = checked_len(width, height)?;
        if data.len() != len {
            return Err(HistoryError::BufferSizeMismatch {
                expected: len,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Copy a borrowed slice into a new mask.
    pub fn from_slice(width: u32, height: u32, data: &[u8]) -> HistoryResult<Self> {
        Self::from_raw(width, height, data.to_vec())
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    // ---- pixel access -------------------------------------------------------

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return MASK_OFF;
        }
        self.data[(y as usize) * (self.width as usize) + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize) * (self.width as usize) + x as usize;
        self.data[idx] = value;
    }

    /// Number of painted (255) pixels.
    pub fn painted_count(&self) -> usize {
        self.data.iter().filter(|&&b| b == MASK_ON).count()
    }

    // ---- binary invariant ---------------------------------------------------

    pub fn is_binary(&self) -> bool {
        is_binary(&self.data)
    }

    /// Force every byte to 0 or 255. Returns how many bytes changed.
    pub fn coerce_binary(&mut self) -> usize {
        coerce_binary(&mut self.data)
    }
}

/// Validate dimensions and return the pixel count.
pub(crate) fn checked_len(width: u32, height: u32) -> HistoryResult<usize> {
    let total = (width as u64) * (height as u64);
    if width == 0 || height == 0 || total > MAX_PIXELS {
        return Err(HistoryError::InvalidDimensions { width, height });
    }
    Ok(total as usize)
}

pub fn is_binary(data: &[u8]) -> bool {
    data.iter().all(|&b| b == MASK_OFF || b == MASK_ON)
}

/// Indices of every byte that is neither 0 nor 255.
pub fn non_binary_positions(data: &[u8]) -> Vec<usize> {
    data.iter()
        .enumerate()
        .filter(|&(_, &b)| b != MASK_OFF && b != MASK_ON)
        .map(|(i, _)| i)
        .collect()
}

/// Threshold at the midpoint: values >= 128 become 255, the rest 0.
/// Bytes that are already binary are untouched.
pub fn coerce_binary(data: &mut [u8]) -> usize {
    let mut changed = 0;
    for b in data.iter_mut() {
        if *b != MASK_OFF && *b != MASK_ON {
            *b = if *b >= 128 { MASK_ON } else { MASK_OFF };
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_and_mismatched_sizes() {
        assert!(matches!(
            MaskBuffer::new(0, 10),
            Err(HistoryError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            MaskBuffer::from_raw(4, 4, vec![0; 15]),
            Err(HistoryError::BufferSizeMismatch {
                expected: 16,
                actual: 15
            })
        ));
    }

    #[test]
    fn out_of_bounds_access_is_ignored() {
        let mut m = MaskBuffer::new(3, 2).unwrap();
        m.set(5, 5, MASK_ON);
        m.set(2, 1, MASK_ON);
        assert_eq!(m.get(5, 5), MASK_OFF);
        assert_eq!(m.get(2, 1), MASK_ON);
        assert_eq!(m.painted_count(), 1);
    }

    #[test]
    fn coerce_thresholds_at_midpoint() {
        let mut data = vec![0, 255, 1, 127, 128, 254];
        assert_eq!(non_binary_positions(&data), vec![2, 3, 4, 5]);
        assert_eq!(coerce_binary(&mut data), 4);
        assert_eq!(data, vec![0, 255, 0, 0, 255, 255]);
        assert!(is_binary(&data));
        assert_eq!(coerce_binary(&mut data), 0);
    }
}
