pub mod checkpoints;
pub mod history;
pub mod input;
pub mod replay;
pub mod strokes;
pub mod tiles;
