use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::components::strokes::StrokeIndex;
use crate::components::tiles::{self, Tile};
use crate::error::HistoryResult;
use crate::mask::MaskBuffer;

/// Smallest budget a caller may configure.
pub const MIN_MEMORY_MB: usize = 50;
/// Budget used when nothing is configured.
pub const DEFAULT_MEMORY_MB: usize = 100;
/// Bookkeeping bytes charged per stored tile on top of its pixel data.
pub const TILE_METADATA_BYTES: usize = 32;

const BYTES_PER_MB: usize = 1024 * 1024;

// ============================================================================
// CHECKPOINTS
// ============================================================================

/// Snapshot payload: either a full copy or a sparse tile list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CheckpointData {
    Full(MaskBuffer),
    Tiled {
        image_width: u32,
        image_height: u32,
        tile_size: u32,
        tiles: Vec<Tile>,
    },
}

/// Mask state after strokes `[0..=stroke_index]` have been applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub stroke_index: StrokeIndex,
    /// Creation order within a store; drives eviction.
    pub sequence: u64,
    pub data: CheckpointData,
}

impl Checkpoint {
    pub fn is_full(&self) -> bool {
        matches!(self.data, CheckpointData::Full(_))
    }

    pub fn kind(&self) -> &'static str {
        match self.data {
            CheckpointData::Full(_) => "full",
            CheckpointData::Tiled { .. } => "tiled",
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match &self.data {
            CheckpointData::Full(mask) => (mask.width(), mask.height()),
            CheckpointData::Tiled {
                image_width,
                image_height,
                ..
            } => (*image_width, *image_height),
        }
    }

    pub fn tile_count(&self) -> usize {
        match &self.data {
            CheckpointData::Full(_) => 0,
            CheckpointData::Tiled { tiles, .. } => tiles.len(),
        }
    }

    /// Estimated retained bytes.
    pub fn memory_size(&self) -> usize {
        match &self.data {
            CheckpointData::Full(mask) => mask.len(),
            CheckpointData::Tiled { tiles, .. } => tiles
                .iter()
                .map(|t| t.byte_len() + TILE_METADATA_BYTES)
                .sum(),
        }
    }

    /// Decode into a new buffer. Byte-identical on every call.
    pub fn reconstruct(&self) -> HistoryResult<MaskBuffer> {
        match &self.data {
            CheckpointData::Full(mask) => Ok(mask.clone()),
            CheckpointData::Tiled {
                image_width,
                image_height,
                tiles,
                ..
            } => tiles::decode(tiles, *image_width, *image_height),
        }
    }
}

/// Copy the whole mask.
pub fn create_full(mask: &MaskBuffer, stroke_index: StrokeIndex) -> Checkpoint {
    Checkpoint {
        id: Uuid::new_v4(),
        stroke_index,
        sequence: 0,
        data: CheckpointData::Full(mask.clone()),
    }
}

/// Tile-encode the mask; empty tiles are not stored.
pub fn create_tile_based(
    mask: &[u8],
    width: u32,
    height: u32,
    tile_size: u32,
    stroke_index: StrokeIndex,
) -> HistoryResult<Checkpoint> {
    let tiles = tiles::encode(mask, width, height, tile_size)?;
    Ok(Checkpoint {
        id: Uuid::new_v4(),
        stroke_index,
        sequence: 0,
        data: CheckpointData::Tiled {
            image_width: width,
            image_height: height,
            tile_size,
            tiles,
        },
    })
}

// ============================================================================
// CHECKPOINT STORE – retained snapshots under a memory budget
// ============================================================================

/// Checkpoints sorted by `stroke_index`, evicted oldest-created first.
///
/// The checkpoint with the lowest `stroke_index` and the one added last are
/// never evicted, so a base for replay is always retained.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckpointStore {
    checkpoints: Vec<Checkpoint>,
    max_memory_bytes: usize,
    /// Running total across all retained checkpoints.
    total_memory: usize,
    next_sequence: u64,
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_MB)
    }
}

impl CheckpointStore {
    pub fn new(max_memory_mb: usize) -> Self {
        Self {
            checkpoints: Vec::new(),
            max_memory_bytes: max_memory_mb.max(MIN_MEMORY_MB) * BYTES_PER_MB,
            total_memory: 0,
            next_sequence: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter()
    }

    pub fn get(&self, id: Uuid) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.id == id)
    }

    /// Clamp to [`MIN_MEMORY_MB`] and evict down to the new budget.
    pub fn set_max_memory_mb(&mut self, mb: usize) -> usize {
        let mb = mb.max(MIN_MEMORY_MB);
        self.max_memory_bytes = mb * BYTES_PER_MB;
        self.enforce_budget(None);
        mb
    }

    pub fn max_memory_mb(&self) -> usize {
        self.max_memory_bytes / BYTES_PER_MB
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn memory_usage_mb(&self) -> f64 {
        self.total_memory as f64 / BYTES_PER_MB as f64
    }

    /// Insert and then enforce the budget. A checkpoint at a `stroke_index`
    /// that is already present replaces the old one. Returns the id.
    pub fn add(&mut self, mut checkpoint: Checkpoint) -> Uuid {
        checkpoint.sequence = self.next_sequence;
        self.next_sequence += 1;
        let id = checkpoint.id;

        let pos = self
            .checkpoints
            .partition_point(|c| c.stroke_index < checkpoint.stroke_index);
        if let Some(existing) = self.checkpoints.get(pos)
            && existing.stroke_index == checkpoint.stroke_index
        {
            self.total_memory = self.total_memory.saturating_sub(existing.memory_size());
            self.checkpoints.remove(pos);
        }

        self.total_memory += checkpoint.memory_size();
        tracing::debug!(
            stroke_index = checkpoint.stroke_index,
            kind = checkpoint.kind(),
            bytes = checkpoint.memory_size(),
            "checkpoint stored"
        );
        self.checkpoints.insert(pos, checkpoint);
        self.enforce_budget(Some(id));
        id
    }

    /// The checkpoint with the greatest `stroke_index <= stroke_index`.
    pub fn find_nearest(&self, stroke_index: StrokeIndex) -> Option<&Checkpoint> {
        let pos = self.checkpoints.partition_point(|c| c.stroke_index <= stroke_index);
        pos.checked_sub(1).map(|i| &self.checkpoints[i])
    }

    /// Drop every checkpoint with `stroke_index > stroke_index`.
    /// Returns how many were removed.
    pub fn discard_after(&mut self, stroke_index: StrokeIndex) -> usize {
        let keep = self.checkpoints.partition_point(|c| c.stroke_index <= stroke_index);
        let removed: Vec<Checkpoint> = self.checkpoints.drain(keep..).collect();
        for c in &removed {
            self.total_memory = self.total_memory.saturating_sub(c.memory_size());
        }
        removed.len()
    }

    /// Drop checkpoints whose dimensions differ from `width × height`.
    pub fn retain_dimensions(&mut self, width: u32, height: u32) -> usize {
        let before = self.checkpoints.len();
        self.checkpoints.retain(|c| c.dimensions() == (width, height));
        self.total_memory = self.checkpoints.iter().map(|c| c.memory_size()).sum();
        before - self.checkpoints.len()
    }

    pub fn clear(&mut self) {
        self.checkpoints.clear();
        self.total_memory = 0;
    }

    /// Evict oldest-created checkpoints while over budget. The floor
    /// (lowest `stroke_index`) and `protect` are never candidates.
    fn enforce_budget(&mut self, protect: Option<Uuid>) {
        while self.total_memory > self.max_memory_bytes {
            let victim = self
                .checkpoints
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(_, c)| Some(c.id) != protect)
                .min_by_key(|(_, c)| c.sequence)
                .map(|(i, _)| i);

            let Some(idx) = victim else {
                break;
            };
            let removed = self.checkpoints.remove(idx);
            self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            tracing::debug!(
                stroke_index = removed.stroke_index,
                bytes = removed.memory_size(),
                "checkpoint evicted"
            );
        }
    }

    /// Problems with retained checkpoints relative to a log of `stroke_count`
    /// strokes and the given image dimensions.
    pub fn validate_integrity(&self, stroke_count: usize, width: u32, height: u32) -> Vec<String> {
        let mut errors = Vec::new();
        for c in &self.checkpoints {
            if c.stroke_index < -1 || c.stroke_index >= stroke_count as StrokeIndex {
                errors.push(format!(
                    "checkpoint {} references stroke index {} but only {} strokes exist",
                    c.id, c.stroke_index, stroke_count
                ));
            }
            if c.dimensions() != (width, height) {
                let (w, h) = c.dimensions();
                errors.push(format!(
                    "checkpoint {} is {}×{} but the image is {}×{}",
                    c.id, w, h, width, height
                ));
            }
            match &c.data {
                CheckpointData::Full(mask) => {
                    if mask.len() != (mask.width() as usize) * (mask.height() as usize) {
                        errors.push(format!("checkpoint {} has a truncated buffer", c.id));
                    }
                }
                CheckpointData::Tiled {
                    image_width,
                    image_height,
                    tile_size,
                    tiles,
                } => {
                    let ts = (*tile_size).max(1);
                    let (gx, gy) = tiles::grid_dims(*image_width, *image_height, ts);
                    for t in tiles {
                        if t.tile_x >= gx || t.tile_y >= gy || t.size != *tile_size {
                            errors.push(format!(
                                "checkpoint {} has tile ({}, {}) outside its {}×{} grid",
                                c.id, t.tile_x, t.tile_y, gx, gy
                            ));
                            continue;
                        }
                        let expected_w = ts.min(*image_width - t.tile_x * ts);
                        let expected_h = ts.min(*image_height - t.tile_y * ts);
                        if (t.width, t.height) != (expected_w, expected_h)
                            || t.data.len() != t.width as usize * t.height as usize
                        {
                            errors.push(format!(
                                "checkpoint {} has tile ({}, {}) with a {}×{} extent and {} bytes",
                                c.id,
                                t.tile_x,
                                t.tile_y,
                                t.width,
                                t.height,
                                t.data.len()
                            ));
                        }
                    }
                }
            }
        }
        let recomputed: usize = self.checkpoints.iter().map(|c| c.memory_size()).sum();
        if recomputed != self.total_memory {
            errors.push(format!(
                "checkpoint memory total {} does not match recomputed {}",
                self.total_memory, recomputed
            ));
        }
        errors
    }
}
