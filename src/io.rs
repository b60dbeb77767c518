use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use bincode::Options;
use image::{GrayImage, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::components::checkpoints::Checkpoint;
use crate::components::history::HistoryManager;
use crate::components::strokes::{NewStroke, Stroke, StrokeIndex, StrokeLog};
use crate::config::HistoryConfig;
use crate::error::{HistoryError, HistoryResult};
use crate::mask::{MASK_OFF, MASK_ON, MaskBuffer};

/// Magic string at the start of every saved history.
pub const HISTORY_MAGIC_V1: &str = "MHS1";

// ============================================================================
// HISTORY FILES (bincode)
// ============================================================================

/// Borrowed view written to disk; field order matches [`HistoryFileV1`].
#[derive(Serialize)]
struct HistoryFileRef<'a> {
    magic: &'a str,
    width: u32,
    height: u32,
    config: &'a HistoryConfig,
    strokes: &'a [Stroke],
    current_index: StrokeIndex,
    checkpoints: Vec<&'a Checkpoint>,
}

/// On-disk history, version 1.
#[derive(Deserialize)]
struct HistoryFileV1 {
    magic: String,
    width: u32,
    height: u32,
    config: HistoryConfig,
    strokes: Vec<Stroke>,
    current_index: StrokeIndex,
    checkpoints: Vec<Checkpoint>,
}

/// Save strokes, cursor, config and checkpoints.
pub fn save_history(history: &HistoryManager, path: &Path) -> HistoryResult<()> {
    let (width, height) = history.image_dimensions();
    let file = HistoryFileRef {
        magic: HISTORY_MAGIC_V1,
        width,
        height,
        config: history.config(),
        strokes: history.strokes(),
        current_index: history.current_index(),
        checkpoints: history.checkpoints().collect(),
    };
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, &file)?;
    tracing::info!(path = %path.display(), strokes = history.strokes().len(), "history saved");
    Ok(())
}

/// Load a saved history. Files that fail the integrity check are rejected.
pub fn load_history(path: &Path) -> HistoryResult<HistoryManager> {
    let raw = std::fs::read(path)?;
    if raw.len() < 12 {
        return Err(HistoryError::invalid_format("file too small"));
    }

    // bincode encodes a String as an 8-byte length prefix + UTF-8 data,
    // so bytes 8..12 hold the magic.
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != HISTORY_MAGIC_V1 {
        return Err(HistoryError::invalid_format(format!("unknown magic {:?}", magic)));
    }

    // Same layout `serialize_into` writes; the limit stops forged length
    // prefixes from allocating past the file size.
    let file: HistoryFileV1 = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(raw.len() as u64)
        .deserialize(&raw)?;
    if file.magic != HISTORY_MAGIC_V1 {
        return Err(HistoryError::invalid_format("corrupt header"));
    }
    let log = StrokeLog::from_parts(file.strokes, file.current_index);
    let history =
        HistoryManager::from_parts(file.width, file.height, file.config, log, file.checkpoints)?;

    let report = history.validate_integrity();
    if !report.is_valid {
        return Err(HistoryError::invalid_format(report.errors.join("; ")));
    }
    Ok(history)
}

// ============================================================================
// MASK IMAGES
// ============================================================================

/// Write a mask as an 8-bit grayscale PNG. Non-binary bytes are coerced first.
pub fn write_mask_png(mask: &MaskBuffer, path: &Path) -> HistoryResult<()> {
    let mut copy = mask.clone();
    let corrected = copy.coerce_binary();
    if corrected > 0 {
        tracing::warn!(corrected, "non-binary mask values coerced before PNG export");
    }
    let (w, h) = (copy.width(), copy.height());
    let img = GrayImage::from_raw(w, h, copy.into_raw())
        .ok_or_else(|| HistoryError::Serialize("mask buffer does not fit its dimensions".into()))?;
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Read any supported image as a mask: luma ≥ 128 is painted.
pub fn read_mask_png(path: &Path) -> HistoryResult<MaskBuffer> {
    let luma = image::open(path)?.to_luma8();
    let (w, h) = luma.dimensions();
    let data = luma
        .into_raw()
        .into_iter()
        .map(|v| if v >= 128 { MASK_ON } else { MASK_OFF })
        .collect();
    MaskBuffer::from_raw(w, h, data)
}

// ============================================================================
// STROKE SCRIPTS (JSON)
// ============================================================================

/// Read a JSON array of `{ "points": [[x, y], ...], "brush_size": n, "mode": "paint" | "erase" }`.
pub fn load_stroke_script(path: &Path) -> HistoryResult<Vec<NewStroke>> {
    let raw = std::fs::read_to_string(path)?;
    parse_stroke_script(&raw)
}

pub fn parse_stroke_script(raw: &str) -> HistoryResult<Vec<NewStroke>> {
    let strokes: Vec<NewStroke> = serde_json::from_str(raw)?;
    for (i, s) in strokes.iter().enumerate() {
        s.validate()
            .map_err(|e| HistoryError::invalid_stroke(format!("stroke {}: {}", i, e)))?;
    }
    Ok(strokes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::strokes::StrokeMode;

    #[test]
    fn parses_stroke_script() {
        let raw = r#"[
            {"points": [[1, 2], [3.5, 4]], "brush_size": 6, "mode": "erase"},
            {"points": [[0, 0]], "brush_size": 2}
        ]"#;
        let strokes = parse_stroke_script(raw).unwrap();
        assert_eq!(strokes.len(), 2);
        assert_eq!(strokes[0].mode, StrokeMode::Erase);
        assert_eq!(strokes[0].points[1], (3.5, 4.0));
        assert_eq!(strokes[1].mode, StrokeMode::Paint);
    }

    #[test]
    fn script_with_bad_stroke_is_rejected() {
        let raw = r#"[{"points": [], "brush_size": 6}]"#;
        let err = parse_stroke_script(raw).unwrap_err();
        assert!(err.to_string().contains("stroke 0"));
    }

    #[test]
    fn png_round_trip_is_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let mut mask = MaskBuffer::new(10, 6).unwrap();
        mask.set(3, 2, 255);
        mask.set(9, 5, 200);
        write_mask_png(&mask, &path).unwrap();
        let back = read_mask_png(&path).unwrap();
        assert_eq!(back.get(3, 2), 255);
        assert_eq!(back.get(9, 5), 255);
        assert_eq!(back.painted_count(), 2);
    }

    #[test]
    fn forged_length_prefix_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forged.mhs");
        let mut raw = Vec::new();
        raw.extend_from_slice(&4u64.to_le_bytes());
        raw.extend_from_slice(HISTORY_MAGIC_V1.as_bytes());
        raw.extend_from_slice(&8u32.to_le_bytes());
        raw.extend_from_slice(&8u32.to_le_bytes());
        raw.extend_from_slice(&20u64.to_le_bytes());
        raw.extend_from_slice(&100u64.to_le_bytes());
        raw.extend_from_slice(&256u32.to_le_bytes());
        raw.push(1);
        // Stroke count far beyond what the file could hold.
        raw.extend_from_slice(&(u64::MAX / 2).to_le_bytes());
        std::fs::write(&path, &raw).unwrap();
        assert!(matches!(load_history(&path), Err(HistoryError::Serialize(_))));
    }

    #[test]
    fn saved_file_loads_with_limits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.mhs");
        let mut h = HistoryManager::new(8, 8).unwrap();
        h.add_stroke(NewStroke::new(vec![(2.0, 2.0)], 2.0, StrokeMode::Paint), None)
            .unwrap();
        h.create_tile_based_checkpoint(&[0u8; 64]).unwrap();
        save_history(&h, &path).unwrap();
        let back = load_history(&path).unwrap();
        assert_eq!(back.state(), h.state());
        assert_eq!(back.checkpoint_count(), 1);
    }

    #[test]
    fn rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        std::fs::write(&path, b"definitely not a history file").unwrap();
        assert!(matches!(load_history(&path), Err(HistoryError::InvalidFormat(_))));
    }
}
