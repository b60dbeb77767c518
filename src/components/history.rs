use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::components::checkpoints::{self, Checkpoint, CheckpointStore};
use crate::components::replay::{self, StrokeApplier};
use crate::components::strokes::{NewStroke, Stroke, StrokeIndex, StrokeLog};
use crate::config::HistoryConfig;
use crate::error::{HistoryError, HistoryResult};
use crate::mask::{self, MaskBuffer, checked_len};
use crate::ops::brush::RoundBrush;
use crate::ops::offload::BackgroundTask;

// ============================================================================
// REPORTING TYPES
// ============================================================================

/// What the UI needs to enable or disable its undo/redo controls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryState {
    pub stroke_count: usize,
    pub current_index: StrokeIndex,
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckpointSummary {
    pub id: Uuid,
    pub stroke_index: StrokeIndex,
    pub kind: &'static str,
    pub tile_count: usize,
    pub bytes: usize,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(c: &Checkpoint) -> Self {
        Self {
            id: c.id,
            stroke_index: c.stroke_index,
            kind: c.kind(),
            tile_count: c.tile_count(),
            bytes: c.memory_size(),
        }
    }
}

/// Diagnostic snapshot for developer tooling.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DebugInfo {
    pub state: HistoryState,
    pub image_width: u32,
    pub image_height: u32,
    pub config: HistoryConfig,
    pub strokes_since_checkpoint: usize,
    pub stroke_bytes: usize,
    pub memory_usage_mb: f64,
    pub checkpoints: Vec<CheckpointSummary>,
}

/// A mask ready for the export layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaskExport {
    pub mask: MaskBuffer,
    /// Bytes that were not 0/255 and had to be coerced.
    pub corrected_pixels: usize,
}

// ============================================================================
// HISTORY MANAGER - stroke log + checkpoints + replay
// ============================================================================

/// Stroke-based undo/redo history for a single binary mask.
///
/// Undo and redo only move the cursor; call [`reconstruct_current`] (or
/// [`reconstruct_at`]) afterwards to get the pixels. No method keeps a
/// reference to a caller's buffer, and every returned mask is a fresh copy.
///
/// [`reconstruct_current`]: Self::reconstruct_current
/// [`reconstruct_at`]: Self::reconstruct_at
pub struct HistoryManager {
    log: StrokeLog,
    checkpoints: CheckpointStore,
    config: HistoryConfig,
    width: u32,
    height: u32,
    strokes_since_checkpoint: usize,
    applier: Arc<dyn StrokeApplier>,
}

impl HistoryManager {
    pub fn new(width: u32, height: u32) -> HistoryResult<Self> {
        Self::with_config(width, height, HistoryConfig::default())
    }

    pub fn with_config(width: u32, height: u32, config: HistoryConfig) -> HistoryResult<Self> {
        checked_len(width, height)?;
        let config = config.sanitized()?;
        Ok(Self {
            log: StrokeLog::new(),
            checkpoints: CheckpointStore::new(config.max_memory_mb),
            config,
            width,
            height,
            strokes_since_checkpoint: 0,
            applier: Arc::new(RoundBrush),
        })
    }

    /// Replace the brush used for replay.
    pub fn with_applier(mut self, applier: impl StrokeApplier + 'static) -> Self {
        self.applier = Arc::new(applier);
        self
    }

    /// Reassemble a manager from persisted parts.
    pub(crate) fn from_parts(
        width: u32,
        height: u32,
        config: HistoryConfig,
        log: StrokeLog,
        checkpoints: Vec<Checkpoint>,
    ) -> HistoryResult<Self> {
        let mut manager = Self::with_config(width, height, config)?;
        manager.log = log;
        for checkpoint in checkpoints {
            manager.checkpoints.add(checkpoint);
        }
        Ok(manager)
    }

    // ---- strokes and cursor -------------------------------------------------

    /// Record a finished stroke. When `current_mask` is given and the
    /// checkpoint interval has been reached, a tile-based checkpoint of it is
    /// stored at the new stroke's index.
    pub fn add_stroke(
        &mut self,
        stroke: NewStroke,
        current_mask: Option<&[u8]>,
    ) -> HistoryResult<Stroke> {
        if let Some(mask) = current_mask {
            self.check_len(mask)?;
        }
        let stroke = Stroke::record(stroke)?;

        let discarded = self.log.append(stroke.clone());
        let index = self.log.current_index();
        if discarded > 0 {
            let stale = self.checkpoints.discard_after(index - 1);
            tracing::debug!(discarded, stale_checkpoints = stale, "redo tail truncated");
        }

        self.strokes_since_checkpoint += 1;
        if self.strokes_since_checkpoint >= self.config.checkpoint_interval
            && let Some(mask) = current_mask
        {
            let checkpoint = checkpoints::create_tile_based(
                mask,
                self.width,
                self.height,
                self.config.tile_size,
                index,
            )?;
            self.checkpoints.add(checkpoint);
            self.strokes_since_checkpoint = 0;
        }

        Ok(stroke)
    }

    pub fn undo(&mut self) -> Option<Stroke> {
        self.log.undo().cloned()
    }

    pub fn redo(&mut self) -> Option<Stroke> {
        self.log.redo().cloned()
    }

    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    pub fn state(&self) -> HistoryState {
        HistoryState {
            stroke_count: self.log.len(),
            current_index: self.log.current_index(),
            can_undo: self.log.can_undo(),
            can_redo: self.log.can_redo(),
        }
    }

    pub fn current_index(&self) -> StrokeIndex {
        self.log.current_index()
    }

    pub fn strokes(&self) -> &[Stroke] {
        self.log.strokes()
    }

    pub(crate) fn stroke_log(&self) -> &StrokeLog {
        &self.log
    }

    /// Undo descriptions, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.log
            .strokes_in_range(-1, self.log.current_index())
            .iter()
            .rev()
            .map(|s| s.description())
            .collect()
    }

    // ---- reconstruction -----------------------------------------------------

    /// Mask after stroke `index` (clamped to the stored range).
    pub fn reconstruct_at(&self, index: StrokeIndex) -> HistoryResult<MaskBuffer> {
        replay::reconstruct_at(
            index,
            self.width,
            self.height,
            &self.checkpoints,
            &self.log,
            self.applier.as_ref(),
        )
        .map(binary_output)
    }

    /// Mask at the cursor.
    pub fn reconstruct_current(&self) -> HistoryResult<MaskBuffer> {
        self.reconstruct_at(self.log.current_index())
    }

    pub fn replay_with_callback(
        &self,
        index: StrokeIndex,
        on_stroke: &mut dyn FnMut(&Stroke),
    ) -> HistoryResult<MaskBuffer> {
        replay::replay_with_callback(
            index,
            self.width,
            self.height,
            &self.checkpoints,
            &self.log,
            self.applier.as_ref(),
            on_stroke,
        )
        .map(binary_output)
    }

    pub fn reconstruct_mask_from_checkpoint(
        &self,
        checkpoint: &Checkpoint,
    ) -> HistoryResult<MaskBuffer> {
        checkpoint.reconstruct().map(binary_output)
    }

    pub fn replay_from_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        target: StrokeIndex,
        on_stroke: &mut dyn FnMut(&Stroke),
    ) -> HistoryResult<MaskBuffer> {
        replay::replay_from_checkpoint(
            Some(checkpoint),
            target,
            self.width,
            self.height,
            &self.log,
            self.applier.as_ref(),
            on_stroke,
        )
        .map(binary_output)
    }

    /// Apply one stroke to a copy of `mask` with this manager's brush.
    pub fn apply_brush_stroke(&self, mask: &MaskBuffer, stroke: &Stroke) -> MaskBuffer {
        let mut out = mask.clone();
        self.applier.apply(&mut out, stroke);
        out
    }

    // ---- checkpoints --------------------------------------------------------

    /// Checkpoint at the cursor, tile-based unless a full copy would be
    /// no larger.
    pub fn create_checkpoint(&mut self, mask: &[u8]) -> HistoryResult<&Checkpoint> {
        self.check_len(mask)?;
        let tiled = checkpoints::create_tile_based(
            mask,
            self.width,
            self.height,
            self.config.tile_size,
            self.log.current_index(),
        )?;
        let checkpoint = if tiled.memory_size() < mask.len() {
            tiled
        } else {
            let copy = MaskBuffer::from_slice(self.width, self.height, mask)?;
            checkpoints::create_full(&copy, tiled.stroke_index)
        };
        Ok(self.store_checkpoint(checkpoint))
    }

    pub fn create_full_checkpoint(&mut self, mask: &[u8]) -> HistoryResult<&Checkpoint> {
        let copy = MaskBuffer::from_slice(self.width, self.height, mask)?;
        let checkpoint = checkpoints::create_full(&copy, self.log.current_index());
        Ok(self.store_checkpoint(checkpoint))
    }

    pub fn create_tile_based_checkpoint(&mut self, mask: &[u8]) -> HistoryResult<&Checkpoint> {
        self.check_len(mask)?;
        let checkpoint = checkpoints::create_tile_based(
            mask,
            self.width,
            self.height,
            self.config.tile_size,
            self.log.current_index(),
        )?;
        Ok(self.store_checkpoint(checkpoint))
    }

    fn store_checkpoint(&mut self, checkpoint: Checkpoint) -> &Checkpoint {
        let stroke_index = checkpoint.stroke_index;
        let id = self.checkpoints.add(checkpoint);
        if stroke_index == self.log.current_index() {
            self.strokes_since_checkpoint = 0;
        }
        // The newest checkpoint is never evicted, so the lookup succeeds.
        match self.checkpoints.get(id) {
            Some(c) => c,
            None => unreachable!("checkpoint {id} evicted on insert"),
        }
    }

    pub fn nearest_checkpoint(&self, index: StrokeIndex) -> Option<&Checkpoint> {
        self.checkpoints.find_nearest(index)
    }

    /// Strokes that replay from `checkpoint` to `to_index` would apply.
    pub fn strokes_from_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        to_index: StrokeIndex,
    ) -> &[Stroke] {
        self.log.strokes_in_range(checkpoint.stroke_index, to_index)
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter()
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    // ---- export / validation ------------------------------------------------

    /// Copy of `mask` with every byte forced to 0 or 255.
    pub fn export_mask(&self, mask: &[u8]) -> HistoryResult<MaskExport> {
        let mut copy = MaskBuffer::from_slice(self.width, self.height, mask)?;
        let corrected_pixels = copy.coerce_binary();
        if corrected_pixels > 0 {
            tracing::warn!(corrected_pixels, "non-binary mask values coerced on export");
        }
        Ok(MaskExport {
            mask: copy,
            corrected_pixels,
        })
    }

    /// Positions of non-binary bytes in `mask`.
    pub fn validate_mask(&self, mask: &[u8]) -> HistoryResult<Vec<usize>> {
        self.check_len(mask)?;
        Ok(mask::non_binary_positions(mask))
    }

    // ---- background variants ------------------------------------------------

    pub async fn apply_brush_stroke_async(&self, mask: &MaskBuffer, stroke: &Stroke) -> MaskBuffer {
        let applier = self.applier.clone();
        let mask = mask.clone();
        let stroke = stroke.clone();
        BackgroundTask::run(self.config.background_worker, move || {
            let mut out = mask.clone();
            applier.apply(&mut out, &stroke);
            out
        })
        .await
    }

    pub async fn create_tile_based_checkpoint_async(
        &mut self,
        mask: &[u8],
    ) -> HistoryResult<&Checkpoint> {
        self.check_len(mask)?;
        let data: Arc<Vec<u8>> = Arc::new(mask.to_vec());
        let (width, height, tile_size) = (self.width, self.height, self.config.tile_size);
        let stroke_index = self.log.current_index();
        let checkpoint = BackgroundTask::run(self.config.background_worker, move || {
            checkpoints::create_tile_based(&data, width, height, tile_size, stroke_index)
        })
        .await?;
        Ok(self.store_checkpoint(checkpoint))
    }

    pub async fn export_mask_async(&self, mask: &[u8]) -> HistoryResult<MaskExport> {
        let copy = MaskBuffer::from_slice(self.width, self.height, mask)?;
        let (mask, corrected_pixels) = BackgroundTask::run(self.config.background_worker, move || {
            let mut out = copy.clone();
            let corrected = out.coerce_binary();
            (out, corrected)
        })
        .await;
        if corrected_pixels > 0 {
            tracing::warn!(corrected_pixels, "non-binary mask values coerced on export");
        }
        Ok(MaskExport {
            mask,
            corrected_pixels,
        })
    }

    pub async fn validate_mask_async(&self, mask: &[u8]) -> HistoryResult<Vec<usize>> {
        self.check_len(mask)?;
        let data: Arc<Vec<u8>> = Arc::new(mask.to_vec());
        Ok(BackgroundTask::run(self.config.background_worker, move || {
            mask::non_binary_positions(&data)
        })
        .await)
    }

    /// Snapshots the base checkpoint and the strokes to replay, then replays
    /// them on the worker.
    pub async fn reconstruct_at_async(&self, index: StrokeIndex) -> HistoryResult<MaskBuffer> {
        let target = replay::clamp_target(index, &self.log);
        let base = self
            .checkpoints
            .find_nearest(target)
            .filter(|c| c.dimensions() == (self.width, self.height))
            .cloned();
        let log = StrokeLog::from_parts(self.log.strokes_in_range(-1, target).to_vec(), target);
        let applier = self.applier.clone();
        let (width, height) = (self.width, self.height);

        BackgroundTask::run(self.config.background_worker, move || {
            replay::replay_from_checkpoint(
                base.as_ref(),
                target,
                width,
                height,
                &log,
                applier.as_ref(),
                &mut |_| {},
            )
        })
        .await
        .map(binary_output)
    }

    // ---- configuration ------------------------------------------------------

    pub fn image_dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Change the mask size. Checkpoints of other sizes are dropped; strokes stay.
    pub fn set_image_dimensions(&mut self, width: u32, height: u32) -> HistoryResult<()> {
        checked_len(width, height)?;
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        let dropped = self.checkpoints.retain_dimensions(width, height);
        tracing::info!(width, height, dropped_checkpoints = dropped, "image dimensions changed");
        self.width = width;
        self.height = height;
        self.strokes_since_checkpoint = 0;
        Ok(())
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn checkpoint_interval(&self) -> usize {
        self.config.checkpoint_interval
    }

    pub fn set_checkpoint_interval(&mut self, interval: usize) {
        self.config.checkpoint_interval = interval.max(1);
    }

    pub fn set_background_worker(&mut self, enabled: bool) {
        self.config.background_worker = enabled;
    }

    /// Returns the budget actually applied.
    pub fn set_max_memory_mb(&mut self, mb: usize) -> usize {
        let applied = self.checkpoints.set_max_memory_mb(mb);
        self.config.max_memory_mb = applied;
        applied
    }

    pub fn max_memory_mb(&self) -> usize {
        self.checkpoints.max_memory_mb()
    }

    pub fn memory_usage_mb(&self) -> f64 {
        self.checkpoints.memory_usage_mb()
    }

    // ---- diagnostics --------------------------------------------------------

    pub fn validate_integrity(&self) -> IntegrityReport {
        let mut errors = self.log.validate_integrity();
        errors.extend(
            self.checkpoints
                .validate_integrity(self.log.len(), self.width, self.height),
        );
        IntegrityReport {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn export_debug_info(&self) -> DebugInfo {
        DebugInfo {
            state: self.state(),
            image_width: self.width,
            image_height: self.height,
            config: self.config.clone(),
            strokes_since_checkpoint: self.strokes_since_checkpoint,
            stroke_bytes: self.log.memory_size(),
            memory_usage_mb: self.memory_usage_mb(),
            checkpoints: self.checkpoints.iter().map(CheckpointSummary::from).collect(),
        }
    }

    /// Back to the empty state: no strokes, no checkpoints.
    pub fn clear(&mut self) {
        self.log.clear();
        self.checkpoints.clear();
        self.strokes_since_checkpoint = 0;
        tracing::info!("history cleared");
    }

    fn check_len(&self, mask: &[u8]) -> HistoryResult<()> {
        let expected = checked_len(self.width, self.height)?;
        if mask.len() != expected {
            return Err(HistoryError::BufferSizeMismatch {
                expected,
                actual: mask.len(),
            });
        }
        Ok(())
    }
}

/// Reconstructions leave the engine binary even when a checkpoint stored
/// non-binary input verbatim.
fn binary_output(mut mask: MaskBuffer) -> MaskBuffer {
    let corrected = mask.coerce_binary();
    if corrected > 0 {
        tracing::warn!(corrected, "non-binary checkpoint values coerced on reconstruction");
    }
    mask
}
