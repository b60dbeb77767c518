use crate::components::strokes::{NewStroke, StrokeMode};

/// Points closer than this to the previous one are dropped.
const MIN_POINT_DISTANCE: f32 = 0.01;

/// Result of feeding a pointer event to the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The point was added to the active stroke.
    Accepted,
    /// Same position as the previous point; nothing to draw.
    Duplicate,
    /// No stroke is active; the event was ignored.
    Ignored,
}

/// Tracks one in-progress gesture and turns it into a [`NewStroke`].
///
/// Pointer events can arrive out of order. A move or release with no
/// preceding press is logged and ignored; a later press still starts a
/// stroke normally.
#[derive(Debug, Default)]
pub struct StrokeTracker {
    /// Whether a stroke is currently in progress
    is_active: bool,
    points: Vec<(f32, f32)>,
    brush_size: f32,
    mode: StrokeMode,
    ignored_events: usize,
}

impl StrokeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn mode(&self) -> StrokeMode {
        self.mode
    }

    pub fn brush_size(&self) -> f32 {
        self.brush_size
    }

    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    pub fn last_point(&self) -> Option<(f32, f32)> {
        self.points.last().copied()
    }

    /// Events dropped because no stroke was active.
    pub fn ignored_events(&self) -> usize {
        self.ignored_events
    }

    /// Start a stroke. A press during an active stroke abandons the old one.
    pub fn begin(&mut self, point: (f32, f32), brush_size: f32, mode: StrokeMode) {
        if self.is_active {
            tracing::warn!(
                points = self.points.len(),
                "stroke restarted before release, dropping it"
            );
        }
        self.is_active = true;
        self.points.clear();
        self.points.push(point);
        self.brush_size = brush_size;
        self.mode = mode;
    }

    pub fn extend(&mut self, point: (f32, f32)) -> TrackOutcome {
        if !self.is_active {
            self.ignored_events += 1;
            tracing::warn!(
                x = point.0,
                y = point.1,
                "pointer move without an active stroke, ignoring"
            );
            return TrackOutcome::Ignored;
        }
        if let Some((lx, ly)) = self.last_point() {
            let dx = point.0 - lx;
            let dy = point.1 - ly;
            if dx * dx + dy * dy < MIN_POINT_DISTANCE * MIN_POINT_DISTANCE {
                return TrackOutcome::Duplicate;
            }
        }
        self.points.push(point);
        TrackOutcome::Accepted
    }

    /// End the stroke and hand back its descriptor.
    pub fn finish(&mut self) -> Option<NewStroke> {
        if !self.is_active {
            self.ignored_events += 1;
            tracing::warn!("pointer release without an active stroke, ignoring");
            return None;
        }
        self.is_active = false;
        let points = std::mem::take(&mut self.points);
        Some(NewStroke::new(points, self.brush_size, self.mode))
    }

    pub fn cancel(&mut self) {
        self.is_active = false;
        self.points.clear();
    }
}
