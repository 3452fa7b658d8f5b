//! Model module for the birdsong CNN using the Burn framework
//!
//! This module provides:
//! - The CNN architecture and its configuration
//! - Saving and loading a trained model as an artifact pair:
//!   `<base>.mpk` (full-precision weights)  and `<base>.json` (config)
//!
//! The JSON config carries the ordered category list. Loading a model whose
//! list differs from the active one is refused, since its outputs would be
//! mapped to the wrong species.

pub mod cnn;

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
use tracing::info;

use crate::dataset::CategoryList;
use crate::utils::error::{BirdsongError, Result};

// Re-export main types for convenience
pub use cnn::{BirdSongClassifier, BirdSongClassifierConfig};

/// Smallest input that survives both conv/pool blocks
pub const MIN_IMAGE_SIZE: usize = 10;

/// Weights file of a model artifact
pub fn weights_path(base: &Path) -> PathBuf {
    base.with_extension("mpk")
}

/// Config file of a model artifact
pub fn config_path(base: &Path) -> PathBuf {
    base.with_extension("json")
}

/// Weights are stored at full precision so reloaded outputs match training exactly
fn weights_recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Persist weights and config under `base` (no extension)
pub fn save_model<B: Backend>(
    model: &BirdSongClassifier<B>,
    config: &BirdSongClassifierConfig,
    base: &Path,
) -> Result<()> {
    if let Some(parent) = base.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(config_path(base), json)?;

    let recorder = weights_recorder();
    model
        .clone()
        .save_file(base, &recorder)
        .map_err(|e| BirdsongError::Model(format!("Failed to save model: {:?}", e)))?;

    info!("Model saved to {:?}", weights_path(base));
    Ok(())
}

/// Read the config half of a model artifact
pub fn load_model_config(base: &Path) -> Result<BirdSongClassifierConfig> {
    let path = config_path(base);
    if !path.is_file() {
        return Err(BirdsongError::PathNotFound(path));
    }
    let json = std::fs::read_to_string(&path)?;
    let config: BirdSongClassifierConfig = serde_json::from_str(&json)?;
    config.validate()?;
    Ok(config)
}

/// Load a model artifact, refusing one trained on a different category list
pub fn load_model<B: Backend>(
    base: &Path,
    expected: &CategoryList,
    device: &B::Device,
) -> Result<(BirdSongClassifier<B>, BirdSongClassifierConfig)> {
    let weights = weights_path(base);
    if !weights.is_file() {
        return Err(BirdsongError::PathNotFound(weights));
    }

    let config = load_model_config(base)?;
    config
        .category_list()
        .ensure_matches(expected)
        .map_err(|e| BirdsongError::Model(format!("model at {:?} does not fit: {}", base, e)))?;

    let recorder = weights_recorder();
    let model = config
        .init::<B>(device)
        .load_file(base, &recorder, device)
        .map_err(|e| BirdsongError::Model(format!("Failed to load model: {:?}", e)))?;

    info!("Model loaded from {:?}", weights);
    Ok((model, config))
}
