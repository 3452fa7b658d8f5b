//! Normalization statistics
//!
//! A single global mean and standard deviation over every pixel of the
//! training partition. The same pair must be applied to the test partition
//! and to every image seen at inference, so it is persisted next to the
//! model as `train_stats.npz` with two scalar entries, `mean` and `std`.

use std::fs::File;
use std::path::Path;

use ndarray::{arr0, Array0, Array4, ArrayBase, Data, Dimension};
use ndarray_npy::{NpzReader, NpzWriter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::error::{BirdsongError, Result};

/// Global pixel mean and standard deviation of the training partition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub mean: f64,
    pub std: f64,
}

impl NormalizationStats {
    /// Build from explicit values, rejecting a zero or non-finite spread
    pub fn new(mean: f64, std: f64) -> Result<Self> {
        if !mean.is_finite() || !std.is_finite() || std <= 0.0 {
            return Err(BirdsongError::DegenerateStatistics { mean, std });
        }
        Ok(Self { mean, std })
    }

    /// Population mean and standard deviation over all elements
    pub fn from_training<A, S, D>(images: &ArrayBase<S, D>) -> Result<Self>
    where
        A: Copy + Into<f64>,
        S: Data<Elem = A>,
        D: Dimension,
    {
        let n = images.len();
        if n == 0 {
            return Err(BirdsongError::Dataset(
                "cannot compute statistics of an empty training set".to_string(),
            ));
        }

        let mean = images.iter().map(|&v| v.into()).sum::<f64>() / n as f64;
        let var = images
            .iter()
            .map(|&v| {
                let d = v.into() - mean;
                d * d
            })
            .sum::<f64>()
            / n as f64;

        let stats = Self::new(mean, var.sqrt())?;
        debug!("Training statistics: mean={:.4}, std={:.4}", stats.mean, stats.std);
        Ok(stats)
    }

    /// `(x - mean) / std`, computed in f64 and stored as f32
    pub fn apply<A, S, D>(&self, images: &ArrayBase<S, D>) -> ndarray::Array<f32, D>
    where
        A: Copy + Into<f64>,
        S: Data<Elem = A>,
        D: Dimension,
    {
        images.mapv(|v| ((v.into() - self.mean) / self.std) as f32)
    }

    /// Normalize a batch of `(N, H, W, C)` byte images
    pub fn apply_images(&self, images: &Array4<u8>) -> Array4<f32> {
        self.apply(images)
    }

    /// `x * std + mean`
    pub fn invert<S, D>(&self, normalized: &ArrayBase<S, D>) -> ndarray::Array<f64, D>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        normalized.mapv(|v| v as f64 * self.std + self.mean)
    }

    /// Write `mean` and `std` as scalar arrays into an `.npz` archive
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut npz = NpzWriter::new(File::create(path)?);
        npz.add_array("mean", &arr0(self.mean))?;
        npz.add_array("std", &arr0(self.std))?;
        npz.finish()?;
        debug!("Saved normalization statistics to {:?}", path);
        Ok(())
    }

    /// Read statistics written by [`save`](Self::save)
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(BirdsongError::PathNotFound(path.to_path_buf()));
        }

        let mut npz = NpzReader::new(File::open(path)?)?;
        let names = npz.names()?;
        let mean = read_scalar(&mut npz, &names, "mean")?;
        let std = read_scalar(&mut npz, &names, "std")?;
        Self::new(mean, std)
    }
}

fn read_scalar(npz: &mut NpzReader<File>, names: &[String], key: &str) -> Result<f64> {
    let entry = names
        .iter()
        .find(|n| n.as_str() == key || n.trim_end_matches(".npy") == key)
        .ok_or_else(|| {
            BirdsongError::Serialization(format!("statistics archive has no '{}' entry", key))
        })?;
    let value: Array0<f64> = npz.by_name(entry)?;
    Ok(value[()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};
    use tempfile::TempDir;

    #[test]
    fn test_population_statistics() {
        let values = array![2u8, 4, 4, 4, 5, 5, 7, 9];
        let stats = NormalizationStats::from_training(&values).unwrap();
        assert_relative_eq!(stats.mean, 5.0);
        assert_relative_eq!(stats.std, 2.0);
    }

    #[test]
    fn test_normalized_training_set_is_standard() {
        let images = Array4::from_shape_fn((6, 4, 4, 3), |(n, h, w, c)| {
            ((n * 37 + h * 11 + w * 5 + c * 3) % 256) as u8
        });
        let stats = NormalizationStats::from_training(&images).unwrap();
        let normalized = stats.apply_images(&images);

        let n = normalized.len() as f64;
        let mean = normalized.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = normalized.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
        assert_relative_eq!(mean, 0.0, epsilon = 1e-5);
        assert_relative_eq!(var.sqrt(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_invert_recovers_pixels() {
        let images = array![0u8, 17, 128, 255];
        let stats = NormalizationStats::from_training(&images).unwrap();
        let restored = stats.invert(&stats.apply(&images));
        for (&orig, &back) in images.iter().zip(restored.iter()) {
            assert_relative_eq!(orig as f64, back, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_save_load_gives_identical_normalization() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models").join("train_stats.npz");

        let train = Array1::from_shape_fn(1000, |i| ((i * 7919) % 256) as u8);
        let stats = NormalizationStats::from_training(&train).unwrap();
        stats.save(&path).unwrap();
        let reloaded = NormalizationStats::load(&path).unwrap();

        assert_eq!(reloaded, stats);
        let probe = array![3u8, 99, 254];
        assert_eq!(stats.apply(&probe), reloaded.apply(&probe));
    }

    #[test]
    fn test_constant_images_are_degenerate() {
        let images = Array4::<u8>::from_elem((2, 3, 3, 3), 128);
        let err = NormalizationStats::from_training(&images).unwrap_err();
        assert!(matches!(err, BirdsongError::DegenerateStatistics { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = NormalizationStats::load(&dir.path().join("train_stats.npz")).unwrap_err();
        assert!(matches!(err, BirdsongError::PathNotFound(_)));
    }
}
