//! Stroke-based undo/redo history for binary masks.
//!
//! Strokes are recorded as small vector descriptions; pixels are rebuilt on
//! demand by replaying strokes on top of the nearest stored checkpoint.
//! Checkpoints are sparse tile sets (or a full copy when that is smaller)
//! kept under a memory budget.

pub mod cli;
pub mod components;
pub mod config;
pub mod error;
pub mod io;
pub mod logger;
pub mod mask;
pub mod ops;
pub mod session;

pub use components::checkpoints::{Checkpoint, CheckpointData, CheckpointStore};
pub use components::history::{
    CheckpointSummary, DebugInfo, HistoryManager, HistoryState, IntegrityReport, MaskExport,
};
pub use components::input::{StrokeTracker, TrackOutcome};
pub use components::replay::StrokeApplier;
pub use components::strokes::{EMPTY_INDEX, NewStroke, Stroke, StrokeIndex, StrokeLog, StrokeMode};
pub use components::tiles::Tile;
pub use config::HistoryConfig;
pub use error::{HistoryError, HistoryResult};
pub use mask::MaskBuffer;
pub use ops::brush::RoundBrush;
pub use ops::offload::BackgroundTask;
pub use session::MaskSession;
