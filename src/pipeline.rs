//! Data preparation
//!
//! Loads `data/spectrograms`, splits it, fits normalization statistics on the
//! training partition only, and writes the standardized partitions plus the
//! statistics for training, evaluation and inference to pick up.

use tracing::{info, warn};

use crate::dataset::{
    save_arrays, stratified_split, LoadMode, LoadReport, NormalizationStats, SpectrogramLoader, SplitConfig,
    SplitSummary,
};
use crate::utils::error::Result;
use crate::utils::{AppConfig, ProjectPaths};

/// What a prepare-data run produced
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub load_report: LoadReport,
    pub split: SplitSummary,
    pub stats: NormalizationStats,
}

/// Run loader, split and standardization, then persist everything
///
/// Statistics are computed and validated before any artifact is written, so a
/// degenerate training set leaves the previous artifacts untouched.
pub fn prepare_data(paths: &ProjectPaths, config: &AppConfig, show_progress: bool) -> Result<PreparedData> {
    let source = paths.spectrograms_dir();
    paths.require(&source, "Spectrogram directory")?;

    let loaded = SpectrogramLoader::new(&source, config.categories())
        .with_image_size(config.data.image_size)
        .with_extension(&config.data.image_extension)
        .with_progress(show_progress)
        .load_data(LoadMode::Categories)?;

    if !loaded.report.skipped.is_empty() {
        warn!("{} file(s) could not be decoded and were skipped", loaded.report.skipped.len());
    }
    info!("Loaded {} images", loaded.len());

    let split_config = SplitConfig::new(config.data.test_fraction, config.data.seed)?;
    let split = stratified_split(&loaded.images, &loaded.labels, &split_config)?;

    let stats = NormalizationStats::from_training(&split.x_train)?;
    info!("Training statistics: mean {:.4}, std {:.4}", stats.mean, stats.std);

    let x_train = stats.apply(&split.x_train);
    let x_test = stats.apply(&split.x_test);

    stats.save(&paths.train_stats_path())?;
    save_arrays(&x_train, &split.y_train, &paths.processed_train_dir())?;
    save_arrays(&x_test, &split.y_test, &paths.processed_test_dir())?;
    info!(
        "Wrote {} training and {} test samples under {:?}",
        split.y_train.len(),
        split.y_test.len(),
        paths.data_dir().join("processed")
    );

    Ok(PreparedData {
        load_report: loaded.report,
        split: split.summary(),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::tests::write_dataset;
    use crate::dataset::load_arrays;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array4};
    use tempfile::TempDir;

    fn small_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.data.image_size = 16;
        config
    }

    #[test]
    fn test_prepare_data_writes_artifacts() {
        let dir = TempDir::new().unwrap();
        let paths = ProjectPaths::new(dir.path());
        write_dataset(&paths.spectrograms_dir(), 10, 20);

        let prepared = prepare_data(&paths, &small_config(), false).unwrap();

        assert_eq!(prepared.load_report.loaded(), 30);
        assert_eq!(prepared.split.train_size, 27);
        assert_eq!(prepared.split.test_size, 3);
        assert!(prepared.split.per_class.iter().all(|&(_, _, test)| test == 1));

        let (x_train, y_train): (Array4<f32>, Array1<i64>) =
            load_arrays(&paths.processed_train_dir()).unwrap();
        let (x_test, y_test): (Array4<f32>, Array1<i64>) = load_arrays(&paths.processed_test_dir()).unwrap();
        assert_eq!(x_train.shape(), &[27, 16, 16, 3]);
        assert_eq!(y_train.len(), 27);
        assert_eq!(x_test.shape(), &[3, 16, 16, 3]);
        assert_eq!(y_test.len(), 3);

        // Standardized with training statistics: zero mean, unit variance
        let mean = x_train.iter().map(|&v| v as f64).sum::<f64>() / x_train.len() as f64;
        let var = x_train.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / x_train.len() as f64;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(var, 1.0, epsilon = 1e-3);

        let stored = NormalizationStats::load(&paths.train_stats_path()).unwrap();
        assert_abs_diff_eq!(stored.mean, prepared.stats.mean, epsilon = 1e-12);
        assert_abs_diff_eq!(stored.std, prepared.stats.std, epsilon = 1e-12);
    }

    #[test]
    fn test_prepare_data_is_reproducible() {
        let dir = TempDir::new().unwrap();
        let paths = ProjectPaths::new(dir.path());
        write_dataset(&paths.spectrograms_dir(), 10, 20);

        prepare_data(&paths, &small_config(), false).unwrap();
        let (_, first): (Array4<f32>, Array1<i64>) = load_arrays(&paths.processed_test_dir()).unwrap();
        prepare_data(&paths, &small_config(), false).unwrap();
        let (_, second): (Array4<f32>, Array1<i64>) = load_arrays(&paths.processed_test_dir()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_spectrograms_is_reported() {
        let dir = TempDir::new().unwrap();
        let paths = ProjectPaths::new(dir.path());

        let err = prepare_data(&paths, &small_config(), false).unwrap_err();
        assert!(err.to_string().contains("Spectrogram directory not found"));
        assert!(!paths.train_stats_path().exists());
    }
}
