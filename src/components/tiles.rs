use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, HistoryResult};
use crate::mask::{MaskBuffer, checked_len};

// ============================================================================
// TILE CODEC – sparse square tiles, all-zero tiles omitted
// ============================================================================

pub const DEFAULT_TILE_SIZE: u32 = 256;
/// Largest accepted tile edge.
pub const MAX_TILE_SIZE: u32 = 4096;

/// A region of a mask on a square `size` grid. Edge tiles are clipped to the
/// image, so `data` is `width * height` bytes, row-major.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub tile_x: u32,
    pub tile_y: u32,
    /// Grid pitch; the tile's origin is `(tile_x * size, tile_y * size)`.
    pub size: u32,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Tile {
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// Grid cell count along each axis for an image.
pub fn grid_dims(width: u32, height: u32, tile_size: u32) -> (u32, u32) {
    (width.div_ceil(tile_size), height.div_ceil(tile_size))
}

/// Reject tile sizes outside `1..=MAX_TILE_SIZE`.
pub fn check_tile_size(tile_size: u32) -> HistoryResult<()> {
    if tile_size == 0 || tile_size > MAX_TILE_SIZE {
        return Err(HistoryError::InvalidTileSize(tile_size));
    }
    Ok(())
}

/// Split a mask into tiles, dropping every tile whose bytes are all zero.
/// Tiles come out in row-major grid order. Conversion is parallelised with rayon.
pub fn encode(mask: &[u8], width: u32, height: u32, tile_size: u32) -> HistoryResult<Vec<Tile>> {
    let len = checked_len(width, height)?;
    check_tile_size(tile_size)?;
    if mask.len() != len {
        return Err(HistoryError::BufferSizeMismatch {
            expected: len,
            actual: mask.len(),
        });
    }

    let (tiles_x, tiles_y) = grid_dims(width, height, tile_size);
    let tiles_x = tiles_x as usize;
    let total_tiles = tiles_x * tiles_y as usize;
    let stride = width as usize;

    let tiles: Vec<Tile> = (0..total_tiles)
        .into_par_iter()
        .filter_map(|flat| {
            let tx = (flat % tiles_x) as u32;
            let ty = (flat / tiles_x) as u32;
            let base_x = tx * tile_size;
            let base_y = ty * tile_size;

            let tw = tile_size.min(width - base_x);
            let th = tile_size.min(height - base_y);
            let row = |ly: u32| {
                let start = (base_y + ly) as usize * stride + base_x as usize;
                &mask[start..start + tw as usize]
            };

            if !(0..th).any(|ly| row(ly).iter().any(|&b| b != 0)) {
                return None;
            }

            let mut data = Vec::with_capacity(tw as usize * th as usize);
            for ly in 0..th {
                data.extend_from_slice(row(ly));
            }

            Some(Tile {
                tile_x: tx,
                tile_y: ty,
                size: tile_size,
                width: tw,
                height: th,
                data,
            })
        })
        .collect();

    Ok(tiles)
}

/// Flatten tiles back to a full mask. Pixels no tile covers stay zero;
/// tiles (or tile parts) outside the image are clipped, and tiles whose
/// data does not match their extent are skipped.
pub fn decode(tiles: &[Tile], width: u32, height: u32) -> HistoryResult<MaskBuffer> {
    let mut out = MaskBuffer::new(width, height)?;
    let out_stride = width as usize;
    let out_raw = out.as_bytes_mut();

    for tile in tiles {
        if tile.data.len() != tile.width as usize * tile.height as usize {
            continue;
        }
        let base_x = tile.tile_x.saturating_mul(tile.size);
        let base_y = tile.tile_y.saturating_mul(tile.size);
        if base_x >= width || base_y >= height {
            continue;
        }
        let src_stride = tile.width as usize;
        let tw = tile.width.min(width - base_x) as usize;
        let th = tile.height.min(height - base_y) as usize;
        for ly in 0..th {
            let src_start = ly * src_stride;
            let dst_start = (base_y as usize + ly) * out_stride + base_x as usize;
            out_raw[dst_start..dst_start + tw]
                .copy_from_slice(&tile.data[src_start..src_start + tw]);
        }
    }
    Ok(out)
}
