//! Inference module: classify a raw audio recording
//!
//! This module provides:
//! - The spectrogram engine interface and its external-process implementation
//! - A scoped session owning the engine and the scratch directory
//! - Majority voting over per-spectrogram predictions
//! - The end-to-end prediction driver

pub mod engine;
pub mod predictor;

// Re-export main types for convenience
pub use engine::{list_spectrograms, EngineSession, MatlabEngine, SpectrogramEngine};
pub use predictor::{majority_vote, predict_bird_species, PredictionOutcome};
