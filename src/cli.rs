// ============================================================================
// mask-history CLI: headless stroke replay via command-line arguments
// ============================================================================
//
// Usage examples:
//   mask-history --input strokes.json --width 512 --height 512 --output mask.png
//   mask-history -i session.json --base photo_mask.png --undo 3 -o undone.png
//   mask-history -i "scripts/*.json" --width 1024 --height 768 --output-dir out/
//   mask-history -i a.json --width 64 --height 64 --debug-info --save-history
//
// Each stroke script is replayed into a fresh history, optionally undone,
// reconstructed from checkpoints + strokes, validated and written as a PNG.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::components::history::HistoryManager;
use crate::config::HistoryConfig;
use crate::error::{HistoryError, HistoryResult};
use crate::io::{load_stroke_script, read_mask_png, save_history, write_mask_png};
use crate::mask::MaskBuffer;
use crate::ops::brush;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Headless mask history replayer.
///
/// Replays JSON stroke scripts through the undo/redo history engine and
/// writes the reconstructed masks as grayscale PNGs.
#[derive(Parser, Debug)]
#[command(
    name = "mask-history",
    about = "Replay mask stroke scripts through the undo/redo history engine",
    long_about = "Replay JSON stroke scripts ([{\"points\": [[x, y], ...], \"brush_size\": n,\n\
                  \"mode\": \"paint\"|\"erase\"}, ...]) into a fresh history, optionally undo\n\
                  some strokes, and write the reconstructed mask as a PNG.\n\n\
                  Example:\n  \
                  mask-history --input strokes.json --width 512 --height 512 --output mask.png"
)]
pub struct CliArgs {
    /// Stroke script(s). Glob patterns accepted (e.g. "*.json").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output PNG path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing (`<stem>.png` per input).
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Mask width in pixels (required unless --base is given).
    #[arg(long)]
    pub width: Option<u32>,

    /// Mask height in pixels (required unless --base is given).
    #[arg(long)]
    pub height: Option<u32>,

    /// Starting mask image; its size overrides --width/--height.
    #[arg(long, value_name = "IMAGE")]
    pub base: Option<PathBuf>,

    /// Number of strokes to undo before exporting.
    #[arg(long, default_value_t = 0)]
    pub undo: usize,

    /// JSON config file (checkpoint_interval, max_memory_mb, tile_size, background_worker).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Strokes between automatic checkpoints.
    #[arg(long)]
    pub checkpoint_interval: Option<usize>,

    /// Checkpoint tile edge length in pixels.
    #[arg(long)]
    pub tile_size: Option<u32>,

    /// Checkpoint memory budget in MB (minimum 50).
    #[arg(long)]
    pub max_memory_mb: Option<usize>,

    /// Run everything on the calling thread.
    #[arg(long)]
    pub no_worker: bool,

    /// Print the history's debug info as JSON after each input.
    #[arg(long)]
    pub debug_info: bool,

    /// Also write the history next to the PNG as `<stem>.mhs`.
    #[arg(long)]
    pub save_history: bool,

    /// Print per-file timing and enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// File config (if any) with command-line overrides applied.
    fn history_config(&self) -> HistoryResult<HistoryConfig> {
        let mut config = match &self.config {
            Some(path) => HistoryConfig::load(path)?,
            None => HistoryConfig::default(),
        };
        if let Some(n) = self.checkpoint_interval {
            config.checkpoint_interval = n;
        }
        if let Some(n) = self.tile_size {
            config.tile_size = n;
        }
        if let Some(n) = self.max_memory_mb {
            config.max_memory_mb = n;
        }
        if self.no_worker {
            config.background_worker = false;
        }
        config.sanitized()
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all inputs and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let config = match args.history_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(ref dir) = args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: cannot create output directory {:?}: {}", dir, e);
        return ExitCode::FAILURE;
    }

    let mut failures = 0usize;
    for input in &inputs {
        let started = Instant::now();
        let output = output_path(input, &args);
        match process_one(input, &output, &args, &config) {
            Ok(()) => {
                if args.verbose {
                    println!(
                        "{} -> {} ({:.1} ms)",
                        input.display(),
                        output.display(),
                        started.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                failures += 1;
                tracing::error!(input = %input.display(), error = %e, "replay failed");
                eprintln!("error: {}: {}", input.display(), e);
            }
        }
    }

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn process_one(
    input: &Path,
    output: &Path,
    args: &CliArgs,
    config: &HistoryConfig,
) -> HistoryResult<()> {
    let strokes = load_stroke_script(input)?;

    let base = args.base.as_deref().map(read_mask_png).transpose()?;
    let (width, height) = match (&base, args.width, args.height) {
        (Some(b), _, _) => (b.width(), b.height()),
        (None, Some(w), Some(h)) => (w, h),
        _ => {
            return Err(HistoryError::invalid_format(
                "mask size unknown: pass --width and --height, or --base",
            ));
        }
    };

    let mut history = HistoryManager::with_config(width, height, config.clone())?;
    let mut live = match base {
        Some(b) => {
            history.create_checkpoint(b.as_bytes())?;
            b
        }
        None => MaskBuffer::new(width, height)?,
    };

    for stroke in strokes {
        brush::apply_stroke(&mut live, &stroke.points, stroke.brush_size, stroke.mode);
        history.add_stroke(stroke, Some(live.as_bytes()))?;
    }
    for _ in 0..args.undo {
        if history.undo().is_none() {
            break;
        }
    }

    let mask = history.reconstruct_current()?;
    let export = pollster::block_on(history.export_mask_async(mask.as_bytes()))?;
    write_mask_png(&export.mask, output)?;

    if args.debug_info {
        println!("{}", serde_json::to_string_pretty(&history.export_debug_info())?);
    }
    if args.save_history {
        save_history(&history, &output.with_extension("mhs"))?;
    }
    Ok(())
}

/// Expand glob patterns; literal paths that exist are kept as-is.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for pattern in patterns {
        let literal = PathBuf::from(pattern);
        if literal.is_file() {
            out.push(literal);
            continue;
        }
        match glob::glob(pattern) {
            Ok(paths) => {
                for entry in paths.flatten() {
                    if entry.is_file() {
                        out.push(entry);
                    }
                }
            }
            Err(e) => eprintln!("warning: invalid glob pattern {:?}: {}", pattern, e),
        }
    }
    out.sort();
    out.dedup();
    out
}

fn output_path(input: &Path, args: &CliArgs) -> PathBuf {
    if let Some(ref out) = args.output
        && args.output_dir.is_none()
    {
        return out.clone();
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "mask".to_string());
    match args.output_dir {
        Some(ref dir) => dir.join(format!("{}.png", stem)),
        None => input.with_extension("png"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["mask-history", "-i", "strokes.json"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn flags_override_defaults() {
        let a = args(&["--checkpoint-interval", "3", "--max-memory-mb", "10", "--no-worker"]);
        let cfg = a.history_config().unwrap();
        assert_eq!(cfg.checkpoint_interval, 3);
        assert_eq!(cfg.max_memory_mb, 50);
        assert!(!cfg.background_worker);
    }

    #[test]
    fn output_paths() {
        let a = args(&["--output-dir", "out"]);
        assert_eq!(output_path(Path::new("dir/a.json"), &a), PathBuf::from("out/a.png"));
        let b = args(&["-o", "x.png"]);
        assert_eq!(output_path(Path::new("dir/a.json"), &b), PathBuf::from("x.png"));
        let c = args(&[]);
        assert_eq!(output_path(Path::new("dir/a.json"), &c), PathBuf::from("dir/a.png"));
    }

    #[test]
    fn replays_a_script_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("s.json");
        std::fs::write(
            &script,
            r#"[{"points": [[4, 4], [20, 4]], "brush_size": 3},
                {"points": [[10, 10]], "brush_size": 5, "mode": "paint"}]"#,
        )
        .unwrap();
        let out = dir.path().join("s.png");
        let a = CliArgs::parse_from([
            "mask-history",
            "-i",
            script.to_str().unwrap(),
            "--width",
            "32",
            "--height",
            "32",
            "--undo",
            "1",
            "--save-history",
        ]);
        let cfg = a.history_config().unwrap();
        process_one(&script, &out, &a, &cfg).unwrap();

        let mask = read_mask_png(&out).unwrap();
        assert_eq!(mask.get(12, 4), 255);
        assert_eq!(mask.get(10, 10), 0);
        let saved = crate::io::load_history(&out.with_extension("mhs")).unwrap();
        assert_eq!(saved.state().current_index, 0);
        assert_eq!(saved.state().stroke_count, 2);
    }
}
