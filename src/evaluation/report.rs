//! Evaluation driver
//!
//! Loads the held-out test arrays and the trained model, then produces the
//! overall metrics, per-species metrics, confusion matrix, classification
//! report, `evaluation_report.json` and the evaluation plots.

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use chrono::Local;
use ndarray::{Array1, Array4, Axis};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::{default_device, DefaultBackend};
use crate::dataset::{load_arrays, CategoryList};
use crate::evaluation::evaluator::{evaluate, predict, predicted_classes, EvalMetrics};
use crate::evaluation::metrics::{ClassificationReport, ConfusionMatrix};
use crate::model::{load_model, BirdSongClassifier};
use crate::utils::charts::{generate_bar_chart, generate_heatmap, BarData, PALETTE};
use crate::utils::error::{BirdsongError, Result};
use crate::utils::{AppConfig, ProjectPaths};

/// File name of the JSON report under `results/`
pub const REPORT_FILE: &str = "evaluation_report.json";

/// Evaluation of one species' test samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesEvaluation {
    pub species: String,
    pub samples: usize,
    /// `None` when the test partition holds no sample of this species
    pub loss: Option<f64>,
    pub accuracy: Option<f64>,
}

impl SpeciesEvaluation {
    pub fn is_absent(&self) -> bool {
        self.samples == 0
    }
}

/// Everything the evaluation driver computes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub generated_at: String,
    pub categories: Vec<String>,
    pub overall: EvalMetrics,
    pub species: Vec<SpeciesEvaluation>,
    pub confusion_matrix: ConfusionMatrix,
    pub classification_report: ClassificationReport,
}

impl EvaluationReport {
    /// Evaluate a model against normalized test arrays
    pub fn build<B: Backend>(
        model: &BirdSongClassifier<B>,
        images: &Array4<f32>,
        labels: &Array1<i64>,
        categories: &CategoryList,
        batch_size: usize,
        device: &B::Device,
    ) -> Result<Self> {
        let overall = evaluate(model, images, labels, batch_size, device)?;
        info!(
            "Test loss: {:.4}, test accuracy: {:.2}%",
            overall.loss,
            overall.accuracy * 100.0
        );

        let species = evaluate_per_species(model, images, labels, categories, batch_size, device)?;

        let probabilities = predict(model, images, batch_size, device)?;
        let predictions = predicted_classes(&probabilities);
        let truth: Vec<usize> = labels.iter().map(|&l| l as usize).collect();
        let confusion_matrix = ConfusionMatrix::from_predictions(&predictions, &truth, categories.len());
        let classification_report =
            ClassificationReport::from_confusion_matrix(&confusion_matrix, categories.names());

        Ok(Self {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            categories: categories.names().to_vec(),
            overall,
            species,
            confusion_matrix,
            classification_report,
        })
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Write the confusion heatmap and species accuracy chart into `dir`
    pub fn render_plots(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let heatmap = dir.join("confusion_matrix.svg");
        generate_heatmap(
            "Normalized Confusion Matrix",
            "True species",
            "Predicted species",
            &self.categories,
            &self.confusion_matrix.normalize_rows(),
            &heatmap,
        )?;

        let bars: Vec<BarData> = self
            .species
            .iter()
            .enumerate()
            .map(|(i, s)| BarData {
                label: s.species.clone(),
                value: s.accuracy.unwrap_or(0.0) * 100.0,
                color: PALETTE[i % PALETTE.len()].to_string(),
            })
            .collect();
        let accuracy_chart = dir.join("species_accuracy.svg");
        generate_bar_chart("Accuracy per Species", "Accuracy (%)", &bars, &accuracy_chart)?;

        Ok(vec![heatmap, accuracy_chart])
    }
}

/// Loss and accuracy restricted to each species' samples
pub fn evaluate_per_species<B: Backend>(
    model: &BirdSongClassifier<B>,
    images: &Array4<f32>,
    labels: &Array1<i64>,
    categories: &CategoryList,
    batch_size: usize,
    device: &B::Device,
) -> Result<Vec<SpeciesEvaluation>> {
    let mut results = Vec::with_capacity(categories.len());

    for (label, species) in categories.names().iter().enumerate() {
        let indices: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == label as i64)
            .map(|(i, _)| i)
            .collect();

        if indices.is_empty() {
            warn!("No test samples for {}", species);
            results.push(SpeciesEvaluation {
                species: species.clone(),
                samples: 0,
                loss: None,
                accuracy: None,
            });
            continue;
        }

        let subset_images = images.select(Axis(0), &indices);
        let subset_labels = labels.select(Axis(0), &indices);
        let metrics = evaluate(model, &subset_images, &subset_labels, batch_size, device)?;
        info!(
            "{}: accuracy {:.2}% on {} samples",
            species,
            metrics.accuracy * 100.0,
            indices.len()
        );

        results.push(SpeciesEvaluation {
            species: species.clone(),
            samples: indices.len(),
            loss: Some(metrics.loss),
            accuracy: Some(metrics.accuracy),
        });
    }

    Ok(results)
}

/// Evaluate the saved model on `data/processed/test` and write reports and plots
pub fn run_evaluation(paths: &ProjectPaths, config: &AppConfig) -> Result<EvaluationReport> {
    let test_dir = paths.processed_test_dir();
    paths.require(&test_dir, "Test data directory")?;
    paths.require(&crate::model::weights_path(&paths.model_path()), "Trained model")?;

    let (images, labels): (Array4<f32>, Array1<i64>) = load_arrays(&test_dir)?;
    if labels.is_empty() {
        return Err(BirdsongError::Dataset(format!("{:?} holds no samples", test_dir)));
    }
    info!("Loaded {} test samples", labels.len());

    let categories = config.categories();
    let device = default_device();
    let (model, model_config) =
        load_model::<DefaultBackend>(&paths.model_path(), &categories, &device)?;
    if images.shape()[1] != model_config.image_size {
        return Err(BirdsongError::Dataset(format!(
            "test images are {}px but the model expects {}px",
            images.shape()[1],
            model_config.image_size
        )));
    }

    let report = EvaluationReport::build(
        &model,
        &images,
        &labels,
        &categories,
        config.training.batch_size,
        &device,
    )?;

    let results_dir = paths.results_dir();
    report.save_json(&results_dir.join(REPORT_FILE))?;
    report.render_plots(&results_dir)?;
    info!("Evaluation results written to {:?}", results_dir);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BirdSongClassifierConfig;
    use burn::backend::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn fixture() -> (BirdSongClassifier<TestBackend>, Array4<f32>, Array1<i64>) {
        let model = BirdSongClassifierConfig::new(CategoryList::canonical().names().to_vec())
            .with_image_size(16)
            .init(&Default::default());
        let images = Array4::from_shape_fn((6, 16, 16, 3), |(n, h, w, c)| {
            ((n * 31 + h * 7 + w * 3 + c) % 11) as f32 / 5.0 - 1.0
        });
        // no house_sparrow samples
        let labels = Array1::from_vec(vec![0, 1, 0, 1, 0, 1]);
        (model, images, labels)
    }

    #[test]
    fn test_absent_species_reported_not_failed() {
        let (model, images, labels) = fixture();
        let species = evaluate_per_species(
            &model,
            &images,
            &labels,
            &CategoryList::canonical(),
            4,
            &Default::default(),
        )
        .unwrap();

        assert_eq!(species.len(), 3);
        assert_eq!(species[0].samples, 3);
        assert!(species[0].accuracy.is_some());
        assert!(species[2].is_absent());
        assert!(species[2].accuracy.is_none());
    }

    #[test]
    fn test_report_json_and_plots() {
        let (model, images, labels) = fixture();
        let report = EvaluationReport::build(
            &model,
            &images,
            &labels,
            &CategoryList::canonical(),
            4,
            &Default::default(),
        )
        .unwrap();

        assert_eq!(report.confusion_matrix.total(), 6);
        assert_eq!(report.confusion_matrix.row_sums(), vec![3, 3, 0]);
        assert!((report.classification_report.accuracy - report.overall.accuracy).abs() < 1e-9);

        let dir = TempDir::new().unwrap();
        report.save_json(&dir.path().join(REPORT_FILE)).unwrap();
        let plots = report.render_plots(dir.path()).unwrap();
        assert_eq!(plots.len(), 2);
        assert!(plots.iter().all(|p| p.is_file()));

        let json = std::fs::read_to_string(dir.path().join(REPORT_FILE)).unwrap();
        let parsed: EvaluationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.categories, report.categories);
    }

    #[test]
    fn test_run_evaluation_requires_test_data() {
        let dir = TempDir::new().unwrap();
        let paths = ProjectPaths::new(dir.path());
        let err = run_evaluation(&paths, &AppConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Test data directory not found"));
    }
}
