use crate::components::checkpoints::{Checkpoint, CheckpointStore};
use crate::components::strokes::{EMPTY_INDEX, Stroke, StrokeIndex, StrokeLog};
use crate::error::HistoryResult;
use crate::mask::MaskBuffer;

// ============================================================================
// STROKE APPLIER TRAIT
// ============================================================================

/// Applies one stroke to a mask in place.
///
/// Implementations must be pure functions of `(mask, stroke)`: the same
/// input always produces the same pixels, and only 0 or 255 is written.
pub trait StrokeApplier: Send + Sync {
    fn apply(&self, mask: &mut MaskBuffer, stroke: &Stroke);
}

impl<F> StrokeApplier for F
where
    F: Fn(&mut MaskBuffer, &Stroke) + Send + Sync,
{
    fn apply(&self, mask: &mut MaskBuffer, stroke: &Stroke) {
        self(mask, stroke)
    }
}

// ============================================================================
// REPLAY ENGINE
// ============================================================================

/// Clamp a requested index into `[-1, last stored stroke]`.
pub fn clamp_target(target: StrokeIndex, log: &StrokeLog) -> StrokeIndex {
    target.clamp(EMPTY_INDEX, log.last_index())
}

/// Reconstruct the mask as it was after stroke `target`.
pub fn reconstruct_at(
    target: StrokeIndex,
    width: u32,
    height: u32,
    store: &CheckpointStore,
    log: &StrokeLog,
    applier: &dyn StrokeApplier,
) -> HistoryResult<MaskBuffer> {
    replay_with_callback(target, width, height, store, log, applier, &mut |_| {})
}

/// Same as [`reconstruct_at`], calling `on_stroke` once per replayed stroke in
/// application order. The callback only observes; it cannot touch the mask.
pub fn replay_with_callback(
    target: StrokeIndex,
    width: u32,
    height: u32,
    store: &CheckpointStore,
    log: &StrokeLog,
    applier: &dyn StrokeApplier,
    on_stroke: &mut dyn FnMut(&Stroke),
) -> HistoryResult<MaskBuffer> {
    let target = clamp_target(target, log);
    let base = store
        .find_nearest(target)
        .filter(|c| c.dimensions() == (width, height));
    replay_from_checkpoint(base, target, width, height, log, applier, on_stroke)
}

/// Replay from a specific checkpoint (or the empty base when `None`) up to
/// `target`. A checkpoint that lies after `target` cannot be rewound, so the
/// empty base is used instead.
pub fn replay_from_checkpoint(
    checkpoint: Option<&Checkpoint>,
    target: StrokeIndex,
    width: u32,
    height: u32,
    log: &StrokeLog,
    applier: &dyn StrokeApplier,
    on_stroke: &mut dyn FnMut(&Stroke),
) -> HistoryResult<MaskBuffer> {
    let target = clamp_target(target, log);

    let checkpoint = match checkpoint {
        Some(c) if c.stroke_index > target => {
            tracing::warn!(
                checkpoint_index = c.stroke_index,
                target,
                "checkpoint is past the replay target, replaying from empty base"
            );
            None
        }
        other => other,
    };

    let (mut mask, base_index) = match checkpoint {
        Some(c) => (c.reconstruct()?, c.stroke_index),
        None => (MaskBuffer::new(width, height)?, EMPTY_INDEX),
    };

    let strokes = log.strokes_in_range(base_index, target);
    tracing::debug!(base_index, target, strokes = strokes.len(), "replaying strokes");
    for stroke in strokes {
        applier.apply(&mut mask, stroke);
        on_stroke(stroke);
    }
    Ok(mask)
}
