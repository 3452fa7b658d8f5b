//! Error Handling Module
//!
//! Defines the error type shared by every stage of the birdsong pipeline.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for birdsong classifier operations
#[derive(Error, Debug)]
pub enum BirdsongError {
    /// Error decoding or resizing a spectrogram image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations (splitting, shapes, artifacts)
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model construction, saving or loading
    #[error("Model error: {0}")]
    Model(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Error with inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// The external spectrogram engine failed
    #[error("Spectrogram engine error: {0}")]
    Engine(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Recording download error
    #[error("Download error: {0}")]
    Download(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// A required directory or artifact is missing; carries the resolved paths
    #[error("{0}")]
    MissingArtifact(String),

    /// Training statistics cannot standardize data (zero or non-finite std)
    #[error("Degenerate normalization statistics: mean={mean}, std={std}")]
    DegenerateStatistics { mean: f64, std: f64 },
}

/// Convenience Result type for birdsong classifier operations
pub type Result<T> = std::result::Result<T, BirdsongError>;

impl From<serde_json::Error> for BirdsongError {
    fn from(err: serde_json::Error) -> Self {
        BirdsongError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BirdsongError {
    fn from(err: toml::de::Error) -> Self {
        BirdsongError::Config(err.to_string())
    }
}

impl From<ndarray_npy::ReadNpyError> for BirdsongError {
    fn from(err: ndarray_npy::ReadNpyError) -> Self {
        BirdsongError::Serialization(format!("failed to read .npy: {}", err))
    }
}

impl From<ndarray_npy::WriteNpyError> for BirdsongError {
    fn from(err: ndarray_npy::WriteNpyError) -> Self {
        BirdsongError::Serialization(format!("failed to write .npy: {}", err))
    }
}

impl From<ndarray_npy::ReadNpzError> for BirdsongError {
    fn from(err: ndarray_npy::ReadNpzError) -> Self {
        BirdsongError::Serialization(format!("failed to read .npz: {}", err))
    }
}

impl From<ndarray_npy::WriteNpzError> for BirdsongError {
    fn from(err: ndarray_npy::WriteNpzError) -> Self {
        BirdsongError::Serialization(format!("failed to write .npz: {}", err))
    }
}

impl From<reqwest::Error> for BirdsongError {
    fn from(err: reqwest::Error) -> Self {
        BirdsongError::Download(err.to_string())
    }
}

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| BirdsongError::InvalidInput(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| BirdsongError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| BirdsongError::InvalidInput(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| BirdsongError::InvalidInput(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BirdsongError::Dataset("test error".to_string());
        assert_eq!(format!("{}", err), "Dataset error: test error");
    }

    #[test]
    fn test_image_load_error() {
        let path = PathBuf::from("/path/to/spectrogram.jpg");
        let err = BirdsongError::ImageLoad(path, "corrupt header".to_string());
        assert!(format!("{}", err).contains("spectrogram.jpg"));
    }

    #[test]
    fn test_degenerate_statistics_display() {
        let err = BirdsongError::DegenerateStatistics { mean: 3.0, std: 0.0 };
        let msg = format!("{}", err);
        assert!(msg.contains("std=0"));
        assert!(msg.contains("mean=3"));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let with_context = result.context("Failed to read file");
        match with_context {
            Err(BirdsongError::InvalidInput(msg)) => assert!(msg.starts_with("Failed to read file")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_option_context() {
        let opt: Option<i32> = None;
        let with_context = opt.context("Value was None");
        assert!(with_context.is_err());
    }
}
