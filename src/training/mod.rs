//! Training module
//!
//! This module provides:
//! - The supervised training loop with Burn's optimizer API
//! - Per-epoch history with JSON persistence and an SVG plot
//! - The training driver that reads `data/processed/train` and saves the model

pub mod history;
pub mod supervised;

// Re-export main types for convenience
pub use history::TrainingHistory;
pub use supervised::{run_training, train, TrainingOverrides};
