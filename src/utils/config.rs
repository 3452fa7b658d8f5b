//! TOML configuration
//!
//! All drivers share one `AppConfig`. The file is optional: a missing
//! `birdsong.toml` means defaults, a malformed one is an error.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{CategoryList, CATEGORIES};
use crate::utils::error::{BirdsongError, Result};

/// Top-level configuration shared by every driver
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub training: TrainingParams,
    pub engine: EngineConfig,
    pub download: DownloadConfig,
}

/// Dataset ingestion and split settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// Side length images are resized to
    pub image_size: usize,
    /// Fraction of samples held out for testing
    pub test_fraction: f64,
    /// Seed for the stratified split
    pub seed: u64,
    /// Ordered species list; position defines the label index
    pub categories: Vec<String>,
    /// The single file extension the loader accepts
    pub image_extension: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            image_size: 150,
            test_fraction: 0.1,
            seed: 42,
            categories: CATEGORIES.iter().map(|c| c.to_string()).collect(),
            image_extension: "jpg".to_string(),
        }
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingParams {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Trailing fraction of the training arrays held out for validation
    pub validation_split: f64,
    /// Adam's coupled weight decay; unlike a kernel-only L2 penalty it also
    /// shrinks biases and batch-norm parameters
    pub weight_decay: f64,
    pub dropout: f64,
    /// Seed for epoch shuffling; weight init uses the backend's own RNG
    pub seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 64,
            learning_rate: 1e-4,
            validation_split: 0.1,
            weight_decay: 2e-3,
            dropout: 0.5,
            seed: 42,
        }
    }
}

/// External spectrogram engine invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Executable to launch
    pub program: String,
    /// Directory (relative to the project root) added to the engine's search path
    pub script_dir: String,
    /// Function called with `(audio_path, output_dir)`
    pub function: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "matlab".to_string(),
            script_dir: "matlab".to_string(),
            function: "process_single_audio".to_string(),
        }
    }
}

/// Recordings API settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloadConfig {
    pub api_url: String,
    pub quality: String,
    pub num_files: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            api_url: "https://xeno-canto.org/api/2/recordings".to_string(),
            quality: "A".to_string(),
            num_files: 300,
        }
    }
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let config = Self::load(path)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BirdsongError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            BirdsongError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Ordered category list of this configuration
    pub fn categories(&self) -> CategoryList {
        CategoryList::new(self.data.categories.clone())
    }

    /// Check ranges and that the category list matches the canonical order
    pub fn validate(&self) -> Result<()> {
        if self.data.image_size < crate::model::MIN_IMAGE_SIZE {
            return Err(BirdsongError::Config(format!(
                "data.image_size must be at least {}, got {}",
                crate::model::MIN_IMAGE_SIZE,
                self.data.image_size
            )));
        }

        if !(self.data.test_fraction > 0.0 && self.data.test_fraction < 1.0) {
            return Err(BirdsongError::Config(format!(
                "data.test_fraction must be in (0, 1), got {}",
                self.data.test_fraction
            )));
        }

        if !(0.0..1.0).contains(&self.training.validation_split) {
            return Err(BirdsongError::Config(format!(
                "training.validation_split must be in [0, 1), got {}",
                self.training.validation_split
            )));
        }

        if self.training.batch_size == 0 || self.training.epochs == 0 {
            return Err(BirdsongError::Config(
                "training.batch_size and training.epochs must be positive".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.training.dropout) {
            return Err(BirdsongError::Config(format!(
                "training.dropout must be in [0, 1), got {}",
                self.training.dropout
            )));
        }

        self.categories().ensure_matches(&CategoryList::canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.data.image_size, 150);
        assert_eq!(config.training.epochs, 50);
        assert_eq!(config.training.batch_size, 64);
        assert_eq!(config.data.categories.len(), 3);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("birdsong.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_file_overrides_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("birdsong.toml");
        fs::write(&path, "[training]\nepochs = 5\n\n[data]\nimage_size = 64\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.training.batch_size, 64);
        assert_eq!(config.data.image_size, 64);
    }

    #[test]
    fn test_reordered_categories_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("birdsong.toml");
        fs::write(
            &path,
            "[data]\ncategories = [\"house_sparrow\", \"common_chaffinch\", \"eurasian_blue_tit\"]\n",
        )
        .unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, BirdsongError::Config(_)));
    }

    #[test]
    fn test_bad_fraction_rejected() {
        let mut config = AppConfig::default();
        config.data.test_fraction = 1.5;
        assert!(config.validate().is_err());
    }
}
