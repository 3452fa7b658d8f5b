//! Supervised Training Implementation
//!
//! A custom training loop over Burn's optimizer API: seeded epoch shuffling,
//! lazy batching, cross-entropy loss, Adam with weight decay, and a trailing
//! validation hold-out evaluated on the inner (non-autodiff) backend.

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use ndarray::{s, Array1, Array4};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{default_device, TrainingBackend};
use crate::dataset::{load_arrays, SpectrogramBatcher, SpectrogramDataset};
use crate::evaluation::evaluate;
use crate::evaluation::metrics::{AccuracyTracker, RunningAverage};
use crate::model::{save_model, BirdSongClassifier, BirdSongClassifierConfig};
use crate::training::history::TrainingHistory;
use crate::utils::config::TrainingParams;
use crate::utils::error::{BirdsongError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::{AppConfig, ProjectPaths};

/// File names of the training outputs under `results/`
pub const HISTORY_JSON: &str = "training_history.json";
pub const HISTORY_PLOT: &str = "training_history.svg";

/// Number of leading samples used for fitting; the rest is validation
pub fn validation_boundary(n: usize, validation_split: f64) -> usize {
    (n as f64 * (1.0 - validation_split)).floor() as usize
}

/// Train `model` on normalized images, returning the fitted model and its history
///
/// The last `validation_split` fraction of the arrays (in their given order)
/// is held out before any shuffling, and evaluated after every epoch.
pub fn train<B: AutodiffBackend>(
    mut model: BirdSongClassifier<B>,
    images: &Array4<f32>,
    labels: &Array1<i64>,
    params: &TrainingParams,
    device: &B::Device,
) -> Result<(BirdSongClassifier<B>, TrainingHistory)> {
    let n = labels.len();
    if images.shape()[0] != n {
        return Err(BirdsongError::Training(format!("{} images but {} labels", images.shape()[0], n)));
    }
    if params.batch_size == 0 || params.epochs == 0 {
        return Err(BirdsongError::Training(
            "batch size and epochs must be positive".to_string(),
        ));
    }

    let split_at = validation_boundary(n, params.validation_split);
    if split_at == 0 {
        return Err(BirdsongError::Training(format!(
            "no training samples left out of {} after a {} validation split",
            n, params.validation_split
        )));
    }

    let image_size = images.shape()[1];
    let train_dataset = SpectrogramDataset::new(
        images.slice(s![..split_at, .., .., ..]).to_owned(),
        &labels.slice(s![..split_at]).to_owned(),
    )?;
    let validation = (split_at < n).then(|| {
        (
            images.slice(s![split_at.., .., .., ..]).to_owned(),
            labels.slice(s![split_at..]).to_owned(),
        )
    });
    info!(
        "Training on {} samples, validating on {}",
        split_at,
        n - split_at
    );

    let batcher = SpectrogramBatcher::new(image_size);
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut optimizer = AdamConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(params.weight_decay as f32)))
        .init();

    let mut epoch_rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut history = TrainingHistory::new();
    let mut logger = TrainingLogger::new(params.epochs);

    for epoch in 0..params.epochs {
        logger.start_epoch(epoch);

        let mut epoch_loss = RunningAverage::new();
        let mut epoch_accuracy = AccuracyTracker::new();

        let mut indices: Vec<usize> = (0..train_dataset.len()).collect();
        indices.shuffle(&mut epoch_rng);

        for batch_indices in indices.chunks(params.batch_size) {
            let items: Vec<_> = batch_indices
                .iter()
                .filter_map(|&i| train_dataset.get(i))
                .collect();
            if items.is_empty() {
                continue;
            }
            let batch_len = items.len();
            let batch = batcher.batch(items, device);

            let output = model.forward(batch.images);
            let loss = loss_fn.forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            epoch_loss.add(loss_value, batch_len);

            let predictions = output.argmax(1).reshape([batch_len]);
            let correct: i64 = predictions.equal(batch.targets).int().sum().into_scalar().elem();
            epoch_accuracy.add_counts(correct as usize, batch_len);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(params.learning_rate, model, grads);
        }

        let validation_metrics = match &validation {
            Some((val_images, val_labels)) => {
                let metrics = evaluate(&model.valid(), val_images, val_labels, params.batch_size, device)?;
                Some((metrics.loss, metrics.accuracy))
            }
            None => None,
        };

        logger.end_epoch(
            epoch_loss.average(),
            epoch_accuracy.accuracy(),
            validation_metrics.map(|(l, _)| l),
            validation_metrics.map(|(_, a)| a),
        );
        history.push_epoch(epoch_loss.average(), epoch_accuracy.accuracy(), validation_metrics);
    }

    logger.log_complete();
    if let Some((epoch, acc)) = history.best_val_accuracy() {
        debug!("Best validation accuracy {:.2}% at epoch {}", acc * 100.0, epoch + 1);
    }

    Ok((model, history))
}

/// Overrides the CLI can apply on top of the configured hyperparameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingOverrides {
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
}

impl TrainingOverrides {
    pub fn apply(&self, params: &TrainingParams) -> TrainingParams {
        TrainingParams {
            epochs: self.epochs.unwrap_or(params.epochs),
            batch_size: self.batch_size.unwrap_or(params.batch_size),
            ..params.clone()
        }
    }
}

/// Train on `data/processed/train`, then save the model, history JSON and plot
pub fn run_training(
    paths: &ProjectPaths,
    config: &AppConfig,
    overrides: &TrainingOverrides,
) -> Result<TrainingHistory> {
    let train_dir = paths.processed_train_dir();
    paths.require(&train_dir, "Training data directory")?;

    let (images, labels): (Array4<f32>, Array1<i64>) = load_arrays(&train_dir)?;
    info!("Loaded {} training samples of shape {:?}", labels.len(), &images.shape()[1..]);

    let params = overrides.apply(&config.training);
    let model_config = BirdSongClassifierConfig::new(config.categories().names().to_vec())
        .with_image_size(images.shape()[1])
        .with_dropout_rate(params.dropout);
    model_config.validate()?;

    let device = default_device();
    let model = model_config.init::<TrainingBackend>(&device);
    let (model, history) = train(model, &images, &labels, &params, &device)?;

    save_model(&model, &model_config, &paths.model_path())?;

    let results_dir = paths.results_dir();
    history.save_json(&results_dir.join(HISTORY_JSON))?;
    history.plot(&results_dir.join(HISTORY_PLOT))?;
    info!("Training history written to {:?}", results_dir);

    Ok(history)
}
