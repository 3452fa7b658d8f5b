//! Prediction driver
//!
//! One recording becomes many syllable spectrograms; each is classified and
//! the recording's species is the majority vote over those predictions.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::{default_device, DefaultBackend};
use crate::dataset::{CategoryList, NormalizationStats, SpectrogramLoader};
use crate::evaluation::{predict, predicted_classes};
use crate::inference::engine::{EngineSession, SpectrogramEngine};
use crate::model::{load_model, weights_path};
use crate::utils::error::{BirdsongError, Result};
use crate::utils::{AppConfig, ProjectPaths};

/// Batch size used when classifying one recording's spectrograms
const PREDICT_BATCH_SIZE: usize = 64;

/// Species decision for one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub predicted_species: String,
    /// Fraction of spectrograms voting for each species
    pub confidence_scores: BTreeMap<String, f64>,
    /// Per-spectrogram species, in file order
    pub individual_predictions: Vec<String>,
}

impl PredictionOutcome {
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Majority vote over per-spectrogram class indices
///
/// Ties resolve to the lowest class index.
pub fn majority_vote(pred_classes: &[usize], categories: &CategoryList) -> Result<PredictionOutcome> {
    if pred_classes.is_empty() {
        return Err(BirdsongError::Inference(
            "no spectrograms to classify; the engine found no syllables".to_string(),
        ));
    }

    let mut votes = vec![0usize; categories.len()];
    for &class in pred_classes {
        let slot = votes.get_mut(class).ok_or_else(|| {
            BirdsongError::Inference(format!(
                "class index {} outside {} categories",
                class,
                categories.len()
            ))
        })?;
        *slot += 1;
    }

    // max_by_key keeps the last maximum, so scan in reverse for the lowest index
    let winner = votes
        .iter()
        .enumerate()
        .rev()
        .max_by_key(|(_, &count)| count)
        .map(|(i, _)| i)
        .unwrap_or(0);

    let total = pred_classes.len() as f64;
    let confidence_scores = categories
        .names()
        .iter()
        .zip(&votes)
        .map(|(name, &count)| (name.clone(), count as f64 / total))
        .collect();

    let individual_predictions = pred_classes
        .iter()
        .map(|&c| categories.name(c).unwrap_or_default().to_string())
        .collect();

    Ok(PredictionOutcome {
        predicted_species: categories.name(winner).unwrap_or_default().to_string(),
        confidence_scores,
        individual_predictions,
    })
}

/// Classify one audio recording
///
/// The engine writes spectrograms into the project's scratch directory; the
/// directory and the engine are released before this returns, on success or
/// failure. Normalization uses the persisted training statistics.
pub fn predict_bird_species<E: SpectrogramEngine>(
    audio_path: &Path,
    engine: E,
    paths: &ProjectPaths,
    config: &AppConfig,
) -> Result<PredictionOutcome> {
    if !audio_path.is_file() {
        return Err(BirdsongError::PathNotFound(audio_path.to_path_buf()));
    }
    paths.require(&paths.train_stats_path(), "Training statistics")?;
    paths.require(&weights_path(&paths.model_path()), "Trained model")?;

    info!("Processing audio file: {:?}", audio_path);
    let categories = config.categories();
    let stats = NormalizationStats::load(&paths.train_stats_path())?;
    let device = default_device();
    let (model, model_config) = load_model::<DefaultBackend>(&paths.model_path(), &categories, &device)?;

    let mut session = EngineSession::open(engine, &paths.predict_scratch_dir())?;
    let spectrograms = session.synthesize(audio_path)?;

    let loaded = SpectrogramLoader::new(session.scratch_dir(), categories.clone())
        .with_image_size(model_config.image_size)
        .load_files(&spectrograms)?;
    drop(session);

    if loaded.is_empty() {
        return Err(BirdsongError::Inference(format!(
            "no spectrograms could be produced from {:?}",
            audio_path
        )));
    }
    info!("Classifying {} spectrogram(s)", loaded.len());

    let images = stats.apply_images(&loaded.images);
    let probabilities = predict(&model, &images, PREDICT_BATCH_SIZE, &device)?;
    let outcome = majority_vote(&predicted_classes(&probabilities), &categories)?;

    info!("Predicted species: {}", outcome.predicted_species);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::engine::tests::FakeEngine;
    use crate::model::{save_model, BirdSongClassifierConfig};
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn categories() -> CategoryList {
        CategoryList::canonical()
    }

    #[test]
    fn test_majority_vote_confidence() {
        let preds = vec![2, 2, 2, 2, 2, 2, 2, 0, 0, 1];
        let outcome = majority_vote(&preds, &categories()).unwrap();

        assert_eq!(outcome.predicted_species, "house_sparrow");
        assert_abs_diff_eq!(outcome.confidence_scores["house_sparrow"], 0.7, epsilon = 1e-12);
        assert_abs_diff_eq!(outcome.confidence_scores["common_chaffinch"], 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(outcome.confidence_scores["eurasian_blue_tit"], 0.1, epsilon = 1e-12);
        assert_eq!(outcome.individual_predictions.len(), 10);
        assert_eq!(outcome.individual_predictions[7], "common_chaffinch");

        let total: f64 = outcome.confidence_scores.values().sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_majority_vote_tie_goes_to_lowest_index() {
        let outcome = majority_vote(&[1, 2, 2, 1], &categories()).unwrap();
        assert_eq!(outcome.predicted_species, "eurasian_blue_tit");

        let outcome = majority_vote(&[2, 0], &categories()).unwrap();
        assert_eq!(outcome.predicted_species, "common_chaffinch");
    }

    #[test]
    fn test_majority_vote_rejects_empty_and_out_of_range() {
        assert!(matches!(
            majority_vote(&[], &categories()),
            Err(BirdsongError::Inference(_))
        ));
        assert!(majority_vote(&[0, 3], &categories()).is_err());
    }

    /// Project root with a freshly initialized model and fixed statistics
    fn project(image_size: usize) -> (TempDir, ProjectPaths, AppConfig) {
        let dir = TempDir::new().unwrap();
        let paths = ProjectPaths::new(dir.path());

        let model_config =
            BirdSongClassifierConfig::new(categories().names().to_vec()).with_image_size(image_size);
        let model = model_config.init::<DefaultBackend>(&default_device());
        save_model(&model, &model_config, &paths.model_path()).unwrap();
        NormalizationStats::new(110.0, 60.0)
            .unwrap()
            .save(&paths.train_stats_path())
            .unwrap();

        let audio = dir.path().join("recording.mp3");
        std::fs::write(&audio, b"not really audio").unwrap();
        (dir, paths, AppConfig::default())
    }

    #[test]
    fn test_predict_with_fake_engine() {
        let (dir, paths, config) = project(16);
        let engine = FakeEngine::new(5);
        let shutdowns = engine.shutdowns.clone();

        let outcome =
            predict_bird_species(&dir.path().join("recording.mp3"), engine, &paths, &config).unwrap();

        assert_eq!(outcome.individual_predictions.len(), 5);
        assert!(categories().index_of(&outcome.predicted_species).is_some());
        assert_abs_diff_eq!(outcome.confidence_scores.values().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(!paths.predict_scratch_dir().exists());
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_predict_classifies_only_reported_spectrograms() {
        let (dir, paths, config) = project(16);
        let mut engine = FakeEngine::new(3);
        engine.unreported = 4;

        let outcome =
            predict_bird_species(&dir.path().join("recording.mp3"), engine, &paths, &config).unwrap();
        assert_eq!(outcome.individual_predictions.len(), 3);
    }

    #[test]
    fn test_predict_without_spectrograms_cleans_up() {
        let (dir, paths, config) = project(16);
        let engine = FakeEngine::new(0);
        let shutdowns = engine.shutdowns.clone();

        let err = predict_bird_species(&dir.path().join("recording.mp3"), engine, &paths, &config)
            .unwrap_err();

        assert!(matches!(err, BirdsongError::Inference(_)));
        assert!(!paths.predict_scratch_dir().exists());
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_predict_engine_failure_cleans_up() {
        let (dir, paths, config) = project(16);
        let mut engine = FakeEngine::new(3);
        engine.fail_synthesis = true;
        let shutdowns = engine.shutdowns.clone();

        let err = predict_bird_species(&dir.path().join("recording.mp3"), engine, &paths, &config)
            .unwrap_err();

        assert!(matches!(err, BirdsongError::Engine(_)));
        assert!(!paths.predict_scratch_dir().exists());
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_predict_requires_artifacts() {
        let dir = TempDir::new().unwrap();
        let paths = ProjectPaths::new(dir.path());
        let audio = dir.path().join("a.mp3");
        std::fs::write(&audio, b"x").unwrap();

        let err = predict_bird_species(&audio, FakeEngine::new(1), &paths, &AppConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("Training statistics not found"));
    }

    #[test]
    fn test_outcome_json() {
        let dir = TempDir::new().unwrap();
        let outcome = majority_vote(&[0, 0, 1], &categories()).unwrap();
        let path = dir.path().join("out").join("prediction.json");
        outcome.save_json(&path).unwrap();

        let parsed: PredictionOutcome =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed, outcome);
    }
}
