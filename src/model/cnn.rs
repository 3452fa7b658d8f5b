//! CNN Model Architecture for Birdsong Spectrogram Classification
//!
//! Two small convolutional blocks followed by a narrow dense head. The layer
//! sizes are fixed; only the input size, dropout and class count vary.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::dataset::{CategoryList, CHANNELS};
use crate::utils::error::BirdsongError;

/// Filters in both convolutional blocks
pub const CONV_FILTERS: usize = 32;

/// Width of the hidden dense layer
pub const HIDDEN_UNITS: usize = 16;

/// Configuration for the BirdSongClassifier CNN
#[derive(Config, Debug)]
pub struct BirdSongClassifierConfig {
    /// Ordered species list; output `i` scores `categories[i]`
    pub categories: Vec<String>,

    /// Input image size (assumes square images)
    #[config(default = "150")]
    pub image_size: usize,

    /// Dropout rate between the dense layers
    #[config(default = "0.5")]
    pub dropout_rate: f64,
}

impl BirdSongClassifierConfig {
    pub fn num_classes(&self) -> usize {
        self.categories.len()
    }

    pub fn category_list(&self) -> CategoryList {
        CategoryList::new(self.categories.clone())
    }

    /// Side length of the feature map after both blocks
    pub fn feature_size(&self) -> usize {
        feature_size(self.image_size)
    }

    /// Input width of the first dense layer
    pub fn flatten_size(&self) -> usize {
        CONV_FILTERS * self.feature_size() * self.feature_size()
    }

    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.categories.is_empty() {
            return Err(BirdsongError::Model("model needs at least one category".to_string()));
        }
        if self.feature_size() == 0 {
            return Err(BirdsongError::Model(format!(
                "image size {} is too small, need at least {}",
                self.image_size,
                super::MIN_IMAGE_SIZE
            )));
        }
        Ok(())
    }

    /// Initialize a model with fresh weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> BirdSongClassifier<B> {
        BirdSongClassifier::new(self, device)
    }
}

/// Feature map side after two (valid 3x3 conv, 2x2 pool) stages
pub fn feature_size(image_size: usize) -> usize {
    let after_block = |s: usize| s.saturating_sub(2) / 2;
    after_block(after_block(image_size))
}

/// Conv2d (valid) -> BatchNorm -> ReLU -> MaxPool 2x2
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Valid)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Birdsong species classifier
///
/// Architecture:
/// - 2 convolutional blocks with 32 filters each
/// - Flatten
/// - Dense(16), no activation
/// - Dropout
/// - Dense(num_classes)
#[derive(Module, Debug)]
pub struct BirdSongClassifier<B: Backend> {
    pub block1: ConvBlock<B>,
    pub block2: ConvBlock<B>,

    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,

    num_classes: usize,
}

impl<B: Backend> BirdSongClassifier<B> {
    pub fn new(config: &BirdSongClassifierConfig, device: &B::Device) -> Self {
        let block1 = ConvBlock::new(CHANNELS, CONV_FILTERS, device); // 150 -> 74
        let block2 = ConvBlock::new(CONV_FILTERS, CONV_FILTERS, device); // 74 -> 36

        let fc1 = LinearConfig::new(config.flatten_size(), HIDDEN_UNITS).init(device);
        let dropout = DropoutConfig::new(config.dropout_rate).init();
        let fc2 = LinearConfig::new(HIDDEN_UNITS, config.num_classes()).init(device);

        Self {
            block1,
            block2,
            fc1,
            dropout,
            fc2,
            num_classes: config.num_classes(),
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.block1.forward(x);
        let x = self.block2.forward(x);

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.fc1.forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
