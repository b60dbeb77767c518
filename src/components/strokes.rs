use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HistoryError, HistoryResult};

/// Position in the stroke log. `-1` means "before any stroke".
pub type StrokeIndex = isize;

/// Cursor value of an empty log (no strokes applied).
pub const EMPTY_INDEX: StrokeIndex = -1;

static STROKE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Whether a stroke sets pixels to 255 or clears them to 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeMode {
    #[default]
    Paint,
    Erase,
}

impl StrokeMode {
    pub fn label(&self) -> &'static str {
        match self {
            StrokeMode::Paint => "Paint",
            StrokeMode::Erase => "Erase",
        }
    }

    /// The value every pixel under the brush is set to.
    pub fn pixel_value(&self) -> u8 {
        match self {
            StrokeMode::Paint => crate::mask::MASK_ON,
            StrokeMode::Erase => crate::mask::MASK_OFF,
        }
    }
}

/// A completed gesture as handed over by the input layer, before it has an id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewStroke {
    pub points: Vec<(f32, f32)>,
    pub brush_size: f32,
    #[serde(default)]
    pub mode: StrokeMode,
}

impl NewStroke {
    pub fn new(points: Vec<(f32, f32)>, brush_size: f32, mode: StrokeMode) -> Self {
        Self {
            points,
            brush_size,
            mode,
        }
    }

    pub fn validate(&self) -> HistoryResult<()> {
        if !(self.brush_size.is_finite() && self.brush_size > 0.0) {
            return Err(HistoryError::invalid_stroke(format!(
                "brush size must be positive, got {}",
                self.brush_size
            )));
        }
        if self.points.is_empty() {
            return Err(HistoryError::invalid_stroke("stroke has no points"));
        }
        if self.points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(HistoryError::invalid_stroke("stroke has non-finite points"));
        }
        Ok(())
    }
}

/// A recorded stroke. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: String,
    pub points: Vec<(f32, f32)>,
    pub brush_size: f32,
    pub mode: StrokeMode,
    /// Milliseconds since the Unix epoch. Not used by brush application.
    pub timestamp: u64,
}

impl Stroke {
    /// Stamp a descriptor with a fresh id and the current time.
    pub fn record(input: NewStroke) -> HistoryResult<Self> {
        input.validate()?;
        Ok(Self {
            id: next_stroke_id(),
            points: input.points,
            brush_size: input.brush_size,
            mode: input.mode,
            timestamp: now_millis(),
        })
    }

    pub fn description(&self) -> String {
        format!(
            "{} Stroke ({} pts, {:.0}px)",
            self.mode.label(),
            self.points.len(),
            self.brush_size
        )
    }

    pub fn memory_size(&self) -> usize {
        self.points.len() * std::mem::size_of::<(f32, f32)>() + self.id.len()
    }
}

/// Process-unique and ordered by creation: `stroke-<seq>-<uuid prefix>`.
fn next_stroke_id() -> String {
    let seq = STROKE_SEQ.fetch_add(1, Ordering::Relaxed);
    let uuid = Uuid::new_v4().simple().to_string();
    format!("stroke-{:08}-{}", seq, &uuid[..8])
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================================
// STROKE LOG – ordered strokes with an undo/redo cursor
// ============================================================================

/// Append-only (but truncatable) stroke sequence with an undo/redo cursor.
///
/// Undo only moves the cursor; the strokes past it stay stored until the next
/// append throws them away.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StrokeLog {
    strokes: Vec<Stroke>,
    current_index: StrokeIndex,
}

impl Default for StrokeLog {
    fn default() -> Self {
        Self::new()
    }
}

impl StrokeLog {
    pub fn new() -> Self {
        Self {
            strokes: Vec::new(),
            current_index: EMPTY_INDEX,
        }
    }

    /// Rebuild a log from persisted parts. The cursor is stored as given so
    /// that `validate_integrity` can report it if it is out of range.
    pub fn from_parts(strokes: Vec<Stroke>, current_index: StrokeIndex) -> Self {
        Self {
            strokes,
            current_index,
        }
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn current_index(&self) -> StrokeIndex {
        self.current_index
    }

    /// Index of the last stored stroke, or `-1`.
    pub fn last_index(&self) -> StrokeIndex {
        self.strokes.len() as StrokeIndex - 1
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn get(&self, index: StrokeIndex) -> Option<&Stroke> {
        usize::try_from(index).ok().and_then(|i| self.strokes.get(i))
    }

    pub fn can_undo(&self) -> bool {
        self.current_index >= 0
    }

    pub fn can_redo(&self) -> bool {
        self.current_index < self.last_index()
    }

    /// Append a stroke, first destroying any redoable strokes past the cursor.
    /// Returns how many strokes were discarded.
    pub fn append(&mut self, stroke: Stroke) -> usize {
        let keep = (self.current_index + 1).max(0) as usize;
        let discarded = self.strokes.len().saturating_sub(keep);
        self.strokes.truncate(keep);
        self.strokes.push(stroke);
        self.current_index = self.last_index();
        discarded
    }

    pub fn undo(&mut self) -> Option<&Stroke> {
        if self.current_index < 0 {
            return None;
        }
        let idx = self.current_index as usize;
        self.current_index -= 1;
        self.strokes.get(idx)
    }

    pub fn redo(&mut self) -> Option<&Stroke> {
        if self.current_index >= self.last_index() {
            return None;
        }
        self.current_index += 1;
        self.strokes.get(self.current_index as usize)
    }

    /// Strokes in `(from_exclusive, to_inclusive]`, clipped to what is stored.
    /// Empty when the range is empty or inverted.
    pub fn strokes_in_range(
        &self,
        from_exclusive: StrokeIndex,
        to_inclusive: StrokeIndex,
    ) -> &[Stroke] {
        let start = (from_exclusive + 1).max(0) as usize;
        let end = (to_inclusive + 1).clamp(0, self.strokes.len() as StrokeIndex) as usize;
        if start >= end {
            return &[];
        }
        &self.strokes[start..end]
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.current_index = EMPTY_INDEX;
    }

    /// Human-readable list of problems; empty means the log is consistent.
    pub fn validate_integrity(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.current_index < EMPTY_INDEX || self.current_index > self.last_index() {
            errors.push(format!(
                "currentIndex {} out of bounds for {} strokes",
                self.current_index,
                self.strokes.len()
            ));
        }

        let mut seen = HashSet::new();
        for (i, stroke) in self.strokes.iter().enumerate() {
            if stroke.id.is_empty() {
                errors.push(format!("stroke at index {} has an empty id", i));
            } else if !seen.insert(stroke.id.as_str()) {
                errors.push(format!("duplicate stroke id {} at index {}", stroke.id, i));
            }
            if !(stroke.brush_size.is_finite() && stroke.brush_size > 0.0) {
                errors.push(format!(
                    "stroke at index {} has invalid brush size {}",
                    i, stroke.brush_size
                ));
            }
            if stroke.points.is_empty() {
                errors.push(format!("stroke at index {} has no points", i));
            }
        }
        errors
    }

    pub fn memory_size(&self) -> usize {
        self.strokes.iter().map(|s| s.memory_size()).sum()
    }
}
