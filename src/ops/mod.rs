pub mod brush;
pub mod offload;
