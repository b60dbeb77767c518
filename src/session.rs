use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::components::history::{HistoryManager, HistoryState, MaskExport};
use crate::components::input::{StrokeTracker, TrackOutcome};
use crate::components::strokes::{Stroke, StrokeMode};
use crate::config::HistoryConfig;
use crate::error::HistoryResult;
use crate::io;
use crate::mask::MaskBuffer;
use crate::ops::brush;

/// One mask being edited: the live buffer, its history and the gesture in
/// progress.
///
/// Pointer input is stamped straight onto the live mask so it can be shown
/// immediately; the finished stroke is then recorded with that mask so
/// periodic checkpoints see the final pixels.
pub struct MaskSession {
    pub id: Uuid,
    mask: MaskBuffer,
    history: HistoryManager,
    tracker: StrokeTracker,
    /// `None` for unsaved sessions.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,
}

impl MaskSession {
    pub fn new(width: u32, height: u32) -> HistoryResult<Self> {
        Self::with_config(width, height, HistoryConfig::default())
    }

    pub fn with_config(width: u32, height: u32, config: HistoryConfig) -> HistoryResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            mask: MaskBuffer::new(width, height)?,
            history: HistoryManager::with_config(width, height, config)?,
            tracker: StrokeTracker::new(),
            path: None,
            is_dirty: false,
        })
    }

    /// Open a saved history; the live mask is rebuilt at its cursor.
    pub fn open(path: &Path) -> HistoryResult<Self> {
        let history = io::load_history(path)?;
        let mask = history.reconstruct_current()?;
        Ok(Self {
            id: Uuid::new_v4(),
            mask,
            history,
            tracker: StrokeTracker::new(),
            path: Some(path.to_path_buf()),
            is_dirty: false,
        })
    }

    pub fn save(&mut self, path: &Path) -> HistoryResult<()> {
        io::save_history(&self.history, path)?;
        self.path = Some(path.to_path_buf());
        self.is_dirty = false;
        Ok(())
    }

    pub fn mask(&self) -> &MaskBuffer {
        &self.mask
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryManager {
        &mut self.history
    }

    pub fn state(&self) -> HistoryState {
        self.history.state()
    }

    pub fn is_stroke_active(&self) -> bool {
        self.tracker.is_active()
    }

    // ---- pointer input ------------------------------------------------------

    pub fn pointer_down(&mut self, point: (f32, f32), brush_size: f32, mode: StrokeMode) {
        if self.tracker.is_active() {
            // The abandoned gesture was already stamped; put the mask back first.
            self.restore_live_mask();
        }
        self.tracker.begin(point, brush_size, mode);
        brush::stamp_circle(&mut self.mask, point, brush_size * 0.5, mode.pixel_value());
    }

    /// Returns whether anything was drawn.
    pub fn pointer_move(&mut self, point: (f32, f32)) -> bool {
        let prev = self.tracker.last_point();
        match self.tracker.extend(point) {
            TrackOutcome::Accepted => {
                if let Some(prev) = prev {
                    let radius = self.tracker.brush_size() * 0.5;
                    let value = self.tracker.mode().pixel_value();
                    brush::stamp_segment(&mut self.mask, prev, point, radius, value);
                }
                true
            }
            TrackOutcome::Duplicate | TrackOutcome::Ignored => false,
        }
    }

    /// Commit the active gesture. `Ok(None)` when no stroke was active.
    /// If the stroke is rejected the live mask is restored from history.
    pub fn pointer_up(&mut self) -> HistoryResult<Option<Stroke>> {
        let Some(new_stroke) = self.tracker.finish() else {
            return Ok(None);
        };
        match self.history.add_stroke(new_stroke, Some(self.mask.as_bytes())) {
            Ok(stroke) => {
                self.is_dirty = true;
                Ok(Some(stroke))
            }
            Err(e) => {
                tracing::warn!(error = %e, "stroke rejected, restoring mask");
                self.restore_live_mask();
                Err(e)
            }
        }
    }

    pub fn cancel_stroke(&mut self) {
        if self.tracker.is_active() {
            self.tracker.cancel();
            self.restore_live_mask();
        }
    }

    // ---- history ------------------------------------------------------------

    pub fn undo(&mut self) -> HistoryResult<Option<Stroke>> {
        self.cancel_stroke();
        let undone = self.history.undo();
        if undone.is_some() {
            self.mask = self.history.reconstruct_current()?;
            self.is_dirty = true;
        }
        Ok(undone)
    }

    pub fn redo(&mut self) -> HistoryResult<Option<Stroke>> {
        self.cancel_stroke();
        let redone = self.history.redo();
        if redone.is_some() {
            self.mask = self.history.reconstruct_current()?;
            self.is_dirty = true;
        }
        Ok(redone)
    }

    /// Binary-validated copy of the live mask for the export layer.
    pub fn export(&self) -> HistoryResult<MaskExport> {
        self.history.export_mask(self.mask.as_bytes())
    }

    pub fn clear(&mut self) -> HistoryResult<()> {
        self.tracker.cancel();
        self.history.clear();
        let (w, h) = self.history.image_dimensions();
        self.mask = MaskBuffer::new(w, h)?;
        self.is_dirty = true;
        Ok(())
    }

    /// Display name (file name or "Untitled"), with a dirty marker.
    pub fn display_title(&self) -> String {
        let name = self
            .path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Untitled".to_string());
        if self.is_dirty {
            format!("{}*", name)
        } else {
            name
        }
    }

    fn restore_live_mask(&mut self) {
        match self.history.reconstruct_current() {
            Ok(mask) => self.mask = mask,
            Err(e) => tracing::error!(error = %e, "could not rebuild live mask"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_mask_matches_replay() {
        let mut s = MaskSession::new(64, 64).unwrap();
        s.pointer_down((5.0, 5.0), 6.0, StrokeMode::Paint);
        for i in 1..20 {
            s.pointer_move((5.0 + i as f32 * 2.5, 5.0 + i as f32 * 1.3));
        }
        s.pointer_up().unwrap();
        s.pointer_down((30.0, 30.0), 9.0, StrokeMode::Erase);
        s.pointer_move((40.0, 20.0));
        s.pointer_up().unwrap();

        assert_eq!(s.mask(), &s.history().reconstruct_current().unwrap());
        assert_eq!(s.display_title(), "Untitled*");
    }

    #[test]
    fn release_without_press_is_harmless() {
        let mut s = MaskSession::new(16, 16).unwrap();
        assert!(!s.pointer_move((3.0, 3.0)));
        assert!(s.pointer_up().unwrap().is_none());
        assert_eq!(s.state().stroke_count, 0);
        s.pointer_down((3.0, 3.0), 2.0, StrokeMode::Paint);
        assert!(s.pointer_up().unwrap().is_some());
        assert_eq!(s.state().stroke_count, 1);
    }

    #[test]
    fn undo_restores_previous_pixels() {
        let mut s = MaskSession::new(32, 32).unwrap();
        s.pointer_down((8.0, 8.0), 4.0, StrokeMode::Paint);
        s.pointer_up().unwrap();
        let after_first = s.mask().clone();
        s.pointer_down((20.0, 20.0), 4.0, StrokeMode::Paint);
        s.pointer_up().unwrap();
        s.undo().unwrap();
        assert_eq!(s.mask(), &after_first);
        s.redo().unwrap();
        assert_eq!(s.mask().get(20, 20), 255);
    }

    #[test]
    fn undo_onto_non_binary_base_keeps_live_mask_binary() {
        let mut s = MaskSession::new(16, 16).unwrap();
        let mut raw = vec![0u8; 256];
        raw[20] = 128;
        raw[21] = 90;
        s.history_mut().create_full_checkpoint(&raw).unwrap();
        s.pointer_down((8.0, 8.0), 4.0, StrokeMode::Paint);
        s.pointer_up().unwrap();
        s.undo().unwrap();
        assert!(s.mask().is_binary());
        assert_eq!(s.mask().as_bytes()[20], 255);
        assert_eq!(s.mask().as_bytes()[21], 0);
    }

    #[test]
    fn rejected_stroke_restores_mask() {
        let mut s = MaskSession::new(16, 16).unwrap();
        s.pointer_down((4.0, 4.0), 0.0, StrokeMode::Paint);
        assert!(s.pointer_up().is_err());
        assert_eq!(s.mask().painted_count(), 0);
    }
}
