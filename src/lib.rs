//! # Birdsong Classifier
//!
//! Bird species classification from syllable spectrograms using the Burn framework.
//!
//! ## Pipeline
//!
//! 1. `download`: fetch recordings from xeno-canto into `data/raw/<species>`
//! 2. Spectrogram synthesis (external engine) fills `data/spectrograms/<species>`
//! 3. `pipeline`: load, split, standardize and persist the train/test arrays
//! 4. `training`: fit the CNN and save it under `models/`
//! 5. `evaluation`: per-class metrics, confusion matrix, report and plots
//! 6. `inference`: classify a raw recording by majority vote over its syllables
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use birdsong_classifier::{prepare_data, run_training, AppConfig, ProjectPaths, TrainingOverrides};
//!
//! let paths = ProjectPaths::discover()?;
//! let config = AppConfig::load_or_default(&paths.config_path())?;
//! prepare_data(&paths, &config, true)?;
//! run_training(&paths, &config, &TrainingOverrides::default())?;
//! ```

pub mod backend;
pub mod dataset;
pub mod download;
pub mod evaluation;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{CategoryList, NormalizationStats, SpectrogramLoader, CATEGORIES, NUM_CLASSES};
pub use download::{DownloadOptions, DownloadSummary, Downloader};
pub use evaluation::{run_evaluation, ClassificationReport, ConfusionMatrix, EvaluationReport};
pub use inference::{predict_bird_species, MatlabEngine, PredictionOutcome, SpectrogramEngine};
pub use model::{BirdSongClassifier, BirdSongClassifierConfig};
pub use pipeline::{prepare_data, PreparedData};
pub use training::{run_training, TrainingHistory, TrainingOverrides};
pub use utils::error::{BirdsongError, Result};
pub use utils::{AppConfig, ProjectPaths};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
