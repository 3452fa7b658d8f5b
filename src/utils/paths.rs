//! Project directory layout
//!
//! Every driver resolves its inputs and outputs from the project root, so the
//! CLI behaves the same regardless of the working directory it is started from.

use std::env;
use std::path::{Path, PathBuf};

use crate::utils::error::{BirdsongError, Result};

/// Environment variable overriding project root discovery
pub const ROOT_ENV_VAR: &str = "BIRDSONG_ROOT";

/// Files whose presence marks a directory as the project root
const ROOT_MARKERS: [&str; 2] = ["birdsong.toml", "Cargo.toml"];

/// Base name of the persisted classifier (weights get `.mpk`, config gets `.json`)
pub const MODEL_NAME: &str = "birdsong_classifier";

/// Resolved locations of every artifact the pipeline reads or writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    /// Use an explicit root directory
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Discover the project root
    ///
    /// Order: `BIRDSONG_ROOT`, then the nearest ancestor of the working
    /// directory holding a root marker, then the working directory itself.
    pub fn discover() -> Result<Self> {
        if let Some(root) = env::var_os(ROOT_ENV_VAR) {
            let root = PathBuf::from(root);
            if !root.is_dir() {
                return Err(BirdsongError::PathNotFound(root));
            }
            return Ok(Self::new(root));
        }

        let cwd = env::current_dir()?;
        Ok(Self::new(find_root_from(&cwd).unwrap_or(cwd)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// Downloaded recordings for one species folder name
    pub fn raw_dir(&self, species_dir: &str) -> PathBuf {
        self.data_dir().join("raw").join(species_dir)
    }

    /// Loader input: `data/spectrograms/<category>/*.jpg`
    pub fn spectrograms_dir(&self) -> PathBuf {
        self.data_dir().join("spectrograms")
    }

    pub fn processed_train_dir(&self) -> PathBuf {
        self.data_dir().join("processed").join("train")
    }

    pub fn processed_test_dir(&self) -> PathBuf {
        self.data_dir().join("processed").join("test")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn train_stats_path(&self) -> PathBuf {
        self.models_dir().join("train_stats.npz")
    }

    /// Model path without extension, as the Burn recorders expect
    pub fn model_path(&self) -> PathBuf {
        self.models_dir().join(MODEL_NAME)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    /// Scratch directory for spectrograms synthesized at prediction time
    pub fn predict_scratch_dir(&self) -> PathBuf {
        self.root.join("temp_predict")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("birdsong.toml")
    }

    /// Fail with a diagnostic listing the resolved paths if `path` is missing
    pub fn require(&self, path: &Path, what: &str) -> Result<()> {
        if path.exists() {
            return Ok(());
        }

        let cwd = env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());

        Err(BirdsongError::MissingArtifact(format!(
            "{} not found: {}\n  Current working directory: {}\n  Project root: {}",
            what,
            path.display(),
            cwd,
            self.root.display()
        )))
    }
}

fn find_root_from(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| ROOT_MARKERS.iter().any(|marker| dir.join(marker).is_file()))
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_under_root() {
        let paths = ProjectPaths::new("/project");

        assert_eq!(paths.spectrograms_dir(), PathBuf::from("/project/data/spectrograms"));
        assert_eq!(paths.processed_train_dir(), PathBuf::from("/project/data/processed/train"));
        assert_eq!(paths.processed_test_dir(), PathBuf::from("/project/data/processed/test"));
        assert_eq!(paths.train_stats_path(), PathBuf::from("/project/models/train_stats.npz"));
        assert_eq!(paths.model_path(), PathBuf::from("/project/models/birdsong_classifier"));
        assert_eq!(paths.raw_dir("house_sparrow"), PathBuf::from("/project/data/raw/house_sparrow"));
        assert_eq!(paths.results_dir(), PathBuf::from("/project/results"));
    }

    #[test]
    fn test_find_root_walks_up_to_marker() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("birdsong.toml"), "").unwrap();
        let nested = dir.path().join("data").join("spectrograms");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_root_from(&nested), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_require_reports_resolved_paths() {
        let dir = TempDir::new().unwrap();
        let paths = ProjectPaths::new(dir.path());

        let err = paths
            .require(&paths.spectrograms_dir(), "Spectrogram directory")
            .unwrap_err()
            .to_string();
        assert!(err.contains("spectrograms"));
        assert!(err.contains("Project root"));

        std::fs::create_dir_all(paths.spectrograms_dir()).unwrap();
        assert!(paths.require(&paths.spectrograms_dir(), "Spectrogram directory").is_ok());
    }
}
