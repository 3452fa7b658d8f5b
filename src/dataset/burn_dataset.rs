//! Burn Dataset and Batcher for normalized spectrogram arrays
//!
//! Arrays arrive channels-last `(N, H, W, 3)` from the loader; items and
//! batches are channels-first to match Burn's `Conv2d` layout.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use ndarray::{s, Array1, Array4, ArrayView4, Axis};

use crate::utils::error::{BirdsongError, Result};

/// A single normalized spectrogram ready for Burn
#[derive(Clone, Debug)]
pub struct SpectrogramItem {
    /// Image data as flattened CHW float array [3 * H * W]
    pub image: Vec<f32>,
    /// Species label
    pub label: usize,
}

/// In-memory dataset over normalized `(N, H, W, 3)` images
#[derive(Debug, Clone)]
pub struct SpectrogramDataset {
    images: Array4<f32>,
    labels: Vec<usize>,
}

impl SpectrogramDataset {
    pub fn new(images: Array4<f32>, labels: &Array1<i64>) -> Result<Self> {
        if images.shape()[0] != labels.len() {
            return Err(BirdsongError::Dataset(format!(
                "{} images but {} labels",
                images.shape()[0],
                labels.len()
            )));
        }
        if images.shape()[1] != images.shape()[2] || images.shape()[3] != super::CHANNELS {
            return Err(BirdsongError::Dataset(format!(
                "expected square RGB images, got shape {:?}",
                images.shape()
            )));
        }

        let labels = labels
            .iter()
            .map(|&l| {
                usize::try_from(l)
                    .map_err(|_| BirdsongError::Dataset(format!("negative label {}", l)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { images, labels })
    }

    pub fn image_size(&self) -> usize {
        self.images.shape()[1]
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Items in `[start, end)`, clamped to the dataset length
    pub fn items(&self, start: usize, end: usize) -> Vec<SpectrogramItem> {
        (start..end.min(self.labels.len()))
            .filter_map(|i| self.get(i))
            .collect()
    }

    /// Samples per class count
    pub fn class_distribution(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for &label in &self.labels {
            if label < num_classes {
                counts[label] += 1;
            }
        }
        counts
    }
}

impl Dataset<SpectrogramItem> for SpectrogramDataset {
    fn get(&self, index: usize) -> Option<SpectrogramItem> {
        let label = *self.labels.get(index)?;
        let image = self
            .images
            .index_axis(Axis(0), index)
            .permuted_axes([2, 0, 1])
            .iter()
            .copied()
            .collect();
        Some(SpectrogramItem { image, label })
    }

    fn len(&self) -> usize {
        self.labels.len()
    }
}

/// A batch of spectrograms
#[derive(Clone, Debug)]
pub struct SpectrogramBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for spectrogram items of a fixed size
#[derive(Clone, Debug)]
pub struct SpectrogramBatcher {
    image_size: usize,
}

impl SpectrogramBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, SpectrogramItem, SpectrogramBatch<B>> for SpectrogramBatcher {
    fn batch(&self, items: Vec<SpectrogramItem>, device: &B::Device) -> SpectrogramBatch<B> {
        let batch_size = items.len();
        let channels = super::CHANNELS;
        let size = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, size, size]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        SpectrogramBatch { images, targets }
    }
}

/// Rows `[start, end)` of a channels-last array as a channels-first tensor
pub fn images_to_tensor<B: Backend>(
    images: ArrayView4<f32>,
    start: usize,
    end: usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    let chunk = images.slice(s![start..end, .., .., ..]);
    let [n, h, w, c] = [chunk.shape()[0], chunk.shape()[1], chunk.shape()[2], chunk.shape()[3]];
    let data: Vec<f32> = chunk.iter().copied().collect();
    Tensor::<B, 4>::from_floats(TensorData::new(data, [n, h, w, c]), device).permute([0, 3, 1, 2])
}

/// Labels `[start, end)` as an Int tensor
pub fn labels_to_tensor<B: Backend>(
    labels: &Array1<i64>,
    start: usize,
    end: usize,
    device: &B::Device,
) -> Tensor<B, 1, Int> {
    let data: Vec<i64> = labels.slice(s![start..end]).to_vec();
    let n = data.len();
    Tensor::<B, 1, Int>::from_data(TensorData::new(data, [n]), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_item_is_channels_first() {
        // value encodes (h, w, c)
        let images = Array4::from_shape_fn((1, 2, 2, 3), |(_, h, w, c)| (h * 100 + w * 10 + c) as f32);
        let dataset = SpectrogramDataset::new(images, &Array1::from_vec(vec![2])).unwrap();

        let item = dataset.get(0).unwrap();
        assert_eq!(item.label, 2);
        assert_eq!(item.image, vec![0.0, 10.0, 100.0, 110.0, 1.0, 11.0, 101.0, 111.0, 2.0, 12.0, 102.0, 112.0]);
        assert!(dataset.get(1).is_none());
    }

    #[test]
    fn test_batch_shapes() {
        let images = Array4::<f32>::zeros((5, 8, 8, 3));
        let labels = Array1::from_vec(vec![0, 1, 2, 1, 0]);
        let dataset = SpectrogramDataset::new(images, &labels).unwrap();
        assert_eq!(dataset.class_distribution(3), vec![2, 2, 1]);

        let device = Default::default();
        let batch: SpectrogramBatch<TestBackend> =
            SpectrogramBatcher::new(8).batch(dataset.items(0, 4), &device);
        assert_eq!(batch.images.dims(), [4, 3, 8, 8]);
        assert_eq!(batch.targets.dims(), [4]);
    }

    #[test]
    fn test_rejects_mismatch_and_negative_labels() {
        let images = Array4::<f32>::zeros((2, 4, 4, 3));
        assert!(SpectrogramDataset::new(images.clone(), &Array1::from_vec(vec![0])).is_err());
        assert!(SpectrogramDataset::new(images, &Array1::from_vec(vec![0, -1])).is_err());
    }

    #[test]
    fn test_images_to_tensor_matches_items() {
        let images = Array4::from_shape_fn((3, 4, 4, 3), |(n, h, w, c)| (n * 1000 + h * 100 + w * 10 + c) as f32);
        let labels = Array1::from_vec(vec![0, 1, 2]);
        let dataset = SpectrogramDataset::new(images.clone(), &labels).unwrap();
        let device = Default::default();

        let direct = images_to_tensor::<TestBackend>(images.view(), 1, 3, &device);
        let batched: SpectrogramBatch<TestBackend> =
            SpectrogramBatcher::new(4).batch(dataset.items(1, 3), &device);

        assert_eq!(direct.dims(), [2, 3, 4, 4]);
        assert_eq!(
            direct.into_data().to_vec::<f32>().unwrap(),
            batched.images.into_data().to_vec::<f32>().unwrap()
        );
        let targets = labels_to_tensor::<TestBackend>(&labels, 1, 3, &device);
        assert_eq!(targets.into_data().to_vec::<i64>().unwrap(), vec![1, 2]);
    }
}
