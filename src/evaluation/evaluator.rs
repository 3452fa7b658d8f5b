//! Batched model evaluation and prediction over normalized arrays

use burn::{
    nn::loss::CrossEntropyLossConfig,
    tensor::{backend::Backend, ElementConversion},
};
use ndarray::{Array1, Array2, Array4};
use serde::{Deserialize, Serialize};

use crate::dataset::{images_to_tensor, labels_to_tensor};
use crate::evaluation::metrics::{AccuracyTracker, RunningAverage};
use crate::model::BirdSongClassifier;
use crate::utils::error::{BirdsongError, Result};

/// Mean cross-entropy and accuracy over a labeled set
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub loss: f64,
    pub accuracy: f64,
    pub samples: usize,
}

/// Evaluate the model on normalized `(N, H, W, 3)` images
pub fn evaluate<B: Backend>(
    model: &BirdSongClassifier<B>,
    images: &Array4<f32>,
    labels: &Array1<i64>,
    batch_size: usize,
    device: &B::Device,
) -> Result<EvalMetrics> {
    let n = labels.len();
    if images.shape()[0] != n {
        return Err(BirdsongError::Dataset(format!("{} images but {} labels", images.shape()[0], n)));
    }
    if n == 0 {
        return Err(BirdsongError::Dataset("cannot evaluate on an empty set".to_string()));
    }

    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut loss = RunningAverage::new();
    let mut accuracy = AccuracyTracker::new();

    for start in (0..n).step_by(batch_size.max(1)) {
        let end = (start + batch_size.max(1)).min(n);
        let inputs = images_to_tensor::<B>(images.view(), start, end, device);
        let targets = labels_to_tensor::<B>(labels, start, end, device);

        let output = model.forward(inputs);
        let batch_loss: f64 = loss_fn.forward(output.clone(), targets.clone()).into_scalar().elem();
        loss.add(batch_loss, end - start);

        let predictions = output.argmax(1).reshape([end - start]);
        let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
        accuracy.add_counts(correct as usize, end - start);
    }

    Ok(EvalMetrics {
        loss: loss.average(),
        accuracy: accuracy.accuracy(),
        samples: n,
    })
}

/// Softmax probabilities, one row per image
pub fn predict<B: Backend>(
    model: &BirdSongClassifier<B>,
    images: &Array4<f32>,
    batch_size: usize,
    device: &B::Device,
) -> Result<Array2<f32>> {
    let n = images.shape()[0];
    let num_classes = model.num_classes();
    let mut probabilities: Vec<f32> = Vec::with_capacity(n * num_classes);

    for start in (0..n).step_by(batch_size.max(1)) {
        let end = (start + batch_size.max(1)).min(n);
        let inputs = images_to_tensor::<B>(images.view(), start, end, device);
        let batch = model
            .forward_softmax(inputs)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| BirdsongError::Inference(format!("cannot read probabilities: {:?}", e)))?;
        probabilities.extend(batch);
    }

    Array2::from_shape_vec((n, num_classes), probabilities)
        .map_err(|e| BirdsongError::Inference(format!("probability matrix: {}", e)))
}

/// Row-wise argmax; ties go to the lowest class index
pub fn predicted_classes(probabilities: &Array2<f32>) -> Vec<usize> {
    probabilities
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |(best, best_p), (i, &p)| {
                    if p > best_p {
                        (i, p)
                    } else {
                        (best, best_p)
                    }
                })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::CategoryList;
    use crate::model::BirdSongClassifierConfig;
    use burn::backend::NdArray;
    use ndarray::array;

    type TestBackend = NdArray;

    fn model() -> BirdSongClassifier<TestBackend> {
        BirdSongClassifierConfig::new(CategoryList::canonical().names().to_vec())
            .with_image_size(16)
            .init(&Default::default())
    }

    #[test]
    fn test_predict_shape_and_rows_sum_to_one() {
        let images = Array4::from_shape_fn((5, 16, 16, 3), |(n, h, w, _)| ((n + h + w) % 7) as f32 - 3.0);
        let probs = predict(&model(), &images, 2, &Default::default()).unwrap();

        assert_eq!(probs.dim(), (5, 3));
        for row in probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_evaluate_counts_every_sample() {
        let images = Array4::<f32>::zeros((7, 16, 16, 3));
        let labels = Array1::from_vec(vec![0, 1, 2, 0, 1, 2, 0]);
        let metrics = evaluate(&model(), &images, &labels, 3, &Default::default()).unwrap();

        assert_eq!(metrics.samples, 7);
        assert!(metrics.loss.is_finite() && metrics.loss > 0.0);
        // identical inputs give one prediction for every sample
        let expected = [3.0 / 7.0, 2.0 / 7.0, 2.0 / 7.0];
        assert!(expected.iter().any(|e| (metrics.accuracy - e).abs() < 1e-9));
    }

    #[test]
    fn test_evaluate_empty_set_is_error() {
        let images = Array4::<f32>::zeros((0, 16, 16, 3));
        let labels = Array1::<i64>::zeros(0);
        assert!(evaluate(&model(), &images, &labels, 4, &Default::default()).is_err());
    }

    #[test]
    fn test_predicted_classes_ties_to_lowest() {
        let probs = array![[0.2f32, 0.5, 0.3], [0.4, 0.2, 0.4], [0.0, 0.0, 1.0]];
        assert_eq!(predicted_classes(&probs), vec![1, 0, 2]);
    }
}
