use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::components::checkpoints::{DEFAULT_MEMORY_MB, MIN_MEMORY_MB};
use crate::components::tiles::{self, DEFAULT_TILE_SIZE};
use crate::error::HistoryResult;

pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 20;

/// Tunables for a [`HistoryManager`](crate::HistoryManager).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Strokes between automatic tile-based checkpoints.
    pub checkpoint_interval: usize,
    /// Checkpoint memory budget in MB (never below 50).
    pub max_memory_mb: usize,
    /// Edge length of checkpoint tiles in pixels.
    pub tile_size: u32,
    /// Run `*_async` work on the rayon pool. When false it runs inline.
    pub background_worker: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            max_memory_mb: DEFAULT_MEMORY_MB,
            tile_size: DEFAULT_TILE_SIZE,
            background_worker: true,
        }
    }
}

impl HistoryConfig {
    /// Apply the lower bounds. A tile size of zero or above
    /// [`tiles::MAX_TILE_SIZE`] is rejected rather than clamped.
    pub fn sanitized(mut self) -> HistoryResult<Self> {
        tiles::check_tile_size(self.tile_size)?;
        self.checkpoint_interval = self.checkpoint_interval.max(1);
        self.max_memory_mb = self.max_memory_mb.max(MIN_MEMORY_MB);
        Ok(self)
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> HistoryResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: HistoryConfig = serde_json::from_str(&raw)?;
        config.sanitized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HistoryError;

    #[test]
    fn sanitize_clamps_lower_bounds() {
        let cfg = HistoryConfig {
            checkpoint_interval: 0,
            max_memory_mb: 5,
            ..HistoryConfig::default()
        }
        .sanitized()
        .unwrap();
        assert_eq!(cfg.checkpoint_interval, 1);
        assert_eq!(cfg.max_memory_mb, MIN_MEMORY_MB);
    }

    #[test]
    fn zero_tile_size_is_rejected() {
        let cfg = HistoryConfig {
            tile_size: 0,
            ..HistoryConfig::default()
        };
        assert!(matches!(cfg.sanitized(), Err(HistoryError::InvalidTileSize(0))));
        let huge = HistoryConfig {
            tile_size: tiles::MAX_TILE_SIZE + 1,
            ..HistoryConfig::default()
        };
        assert!(huge.sanitized().is_err());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: HistoryConfig = serde_json::from_str(r#"{"checkpoint_interval": 3}"#).unwrap();
        assert_eq!(cfg.checkpoint_interval, 3);
        assert_eq!(cfg.tile_size, DEFAULT_TILE_SIZE);
        assert!(cfg.background_worker);
    }
}
