//! Dataset module for birdsong spectrograms
//!
//! This module provides:
//! - The ordered species list that defines label indices
//! - Loading spectrogram images into `(N, H, W, 3)` arrays
//! - Stratified train/test splitting with a fixed seed
//! - Normalization statistics computed from the training partition
//! - Burn `Dataset`/`Batcher` adapters over the split arrays
//!
//! ## Label space
//!
//! A label is the position of its species in [`CATEGORIES`]. Reordering the
//! list silently changes what every persisted label and model output means,
//! so every driver goes through [`CategoryList`] and checks it against the
//! list stored with the model.

pub mod burn_dataset;
pub mod loader;
pub mod split;
pub mod stats;

use serde::{Deserialize, Serialize};

use crate::utils::error::{BirdsongError, Result};

// Re-export main types for convenience
pub use burn_dataset::{
    images_to_tensor, labels_to_tensor, SpectrogramBatch, SpectrogramBatcher, SpectrogramDataset,
    SpectrogramItem,
};
pub use loader::{load_arrays, save_arrays, LoadMode, LoadReport, LoadedImages, SpectrogramLoader};
pub use split::{stratified_split, SplitConfig, SplitSummary, TrainTestSplit};
pub use stats::NormalizationStats;

/// Species the classifier distinguishes, in label order
pub const CATEGORIES: [&str; 3] = ["common_chaffinch", "eurasian_blue_tit", "house_sparrow"];

/// Number of species
pub const NUM_CLASSES: usize = CATEGORIES.len();

/// Default spectrogram side length after resizing
pub const DEFAULT_IMAGE_SIZE: usize = 150;

/// Image channels (RGB)
pub const CHANNELS: usize = 3;

/// Get the species name for a label index
pub fn class_name(label: usize) -> Option<&'static str> {
    CATEGORIES.get(label).copied()
}

/// Get the label index for a species name
pub fn class_index(name: &str) -> Option<usize> {
    CATEGORIES.iter().position(|&n| n == name)
}

/// An ordered list of category names; index in the list is the label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryList(Vec<String>);

impl CategoryList {
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    /// The built-in species list
    pub fn canonical() -> Self {
        Self(CATEGORIES.iter().map(|c| c.to_string()).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn name(&self, label: usize) -> Option<&str> {
        self.0.get(label).map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|n| n == name)
    }

    /// Fail unless both lists hold the same names in the same order
    pub fn ensure_matches(&self, expected: &CategoryList) -> Result<()> {
        if self.0.is_empty() {
            return Err(BirdsongError::Config("category list is empty".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.0.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(BirdsongError::Config(format!(
                "category '{}' listed more than once",
                dup
            )));
        }

        if self != expected {
            return Err(BirdsongError::Config(format!(
                "category order mismatch: got [{}], expected [{}]",
                self.0.join(", "),
                expected.0.join(", ")
            )));
        }

        Ok(())
    }
}

impl Default for CategoryList {
    fn default() -> Self {
        Self::canonical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_name() {
        assert_eq!(class_name(0), Some("common_chaffinch"));
        assert_eq!(class_name(2), Some("house_sparrow"));
        assert_eq!(class_name(3), None);
    }

    #[test]
    fn test_class_index() {
        assert_eq!(class_index("eurasian_blue_tit"), Some(1));
        assert_eq!(class_index("great_tit"), None);
    }

    #[test]
    fn test_category_list_matches_itself() {
        let list = CategoryList::canonical();
        assert_eq!(list.len(), NUM_CLASSES);
        assert_eq!(list.index_of("house_sparrow"), Some(2));
        assert!(list.ensure_matches(&CategoryList::canonical()).is_ok());
    }

    #[test]
    fn test_category_order_is_load_bearing() {
        let swapped = CategoryList::new(vec![
            "eurasian_blue_tit".to_string(),
            "common_chaffinch".to_string(),
            "house_sparrow".to_string(),
        ]);
        let err = swapped.ensure_matches(&CategoryList::canonical()).unwrap_err();
        assert!(err.to_string().contains("order mismatch"));
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let dup = CategoryList::new(vec!["house_sparrow".to_string(), "house_sparrow".to_string()]);
        assert!(dup.ensure_matches(&dup.clone()).is_err());
    }
}
