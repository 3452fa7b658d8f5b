//! Spectrogram Image Loader
//!
//! Reads spectrogram images from disk into `(N, H, W, 3)` byte arrays with a
//! parallel label vector, and persists arrays as `X.npy` / `y.npy`.
//!
//! Two layouts are supported:
//!
//! ```text
//! Categories mode                 Prediction mode
//! root/                           root/
//! ├── common_chaffinch/           ├── syllable_001.jpg
//! │   ├── 1_001.jpg               ├── syllable_002.jpg
//! │   └── ...                     └── ...
//! ├── eurasian_blue_tit/
//! └── house_sparrow/
//! ```
//!
//! Unreadable files are logged and skipped; they never abort a load.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::ImageReader;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Array4};
use ndarray_npy::{read_npy, write_npy, ReadableElement, WritableElement};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{CategoryList, CHANNELS, DEFAULT_IMAGE_SIZE};
use crate::utils::error::{BirdsongError, Result};

/// File name of the persisted image array
pub const IMAGES_FILE: &str = "X.npy";

/// File name of the persisted label array
pub const LABELS_FILE: &str = "y.npy";

/// Label assigned to every image in prediction mode
pub const PLACEHOLDER_LABEL: i64 = 0;

/// Directory layout to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// One subdirectory per category, label = category position
    Categories,
    /// Flat directory of images, placeholder labels
    Prediction,
}

/// What a load produced and what it skipped
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadReport {
    /// (category, loaded count) in label order; a single "unlabeled" entry in prediction mode
    pub per_category: Vec<(String, usize)>,
    /// Files that failed to decode, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

impl LoadReport {
    pub fn loaded(&self) -> usize {
        self.per_category.iter().map(|(_, n)| n).sum()
    }
}

/// Images and labels in matching order
#[derive(Debug, Clone)]
pub struct LoadedImages {
    /// Shape `(N, size, size, 3)`, RGB, row-major
    pub images: Array4<u8>,
    /// Shape `(N,)`
    pub labels: Array1<i64>,
    /// Source file of each sample
    pub paths: Vec<PathBuf>,
    pub report: LoadReport,
}

impl LoadedImages {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Loader for spectrogram directories
#[derive(Debug, Clone)]
pub struct SpectrogramLoader {
    root_dir: PathBuf,
    categories: CategoryList,
    image_size: usize,
    extension: String,
    show_progress: bool,
}

impl SpectrogramLoader {
    pub fn new<P: AsRef<Path>>(root_dir: P, categories: CategoryList) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
            categories,
            image_size: DEFAULT_IMAGE_SIZE,
            extension: "jpg".to_string(),
            show_progress: false,
        }
    }

    pub fn with_image_size(mut self, image_size: usize) -> Self {
        self.image_size = image_size;
        self
    }

    /// Only files with this extension (case-insensitive) are read
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_lowercase();
        self
    }

    /// Draw a progress bar per directory
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Load every qualifying image under the root
    pub fn load_data(&self, mode: LoadMode) -> Result<LoadedImages> {
        if !self.root_dir.is_dir() {
            return Err(BirdsongError::PathNotFound(self.root_dir.clone()));
        }

        info!("Loading spectrograms from {:?} ({:?} mode)", self.root_dir, mode);

        let mut pixels: Vec<u8> = Vec::new();
        let mut labels: Vec<i64> = Vec::new();
        let mut paths: Vec<PathBuf> = Vec::new();
        let mut report = LoadReport::default();

        match mode {
            LoadMode::Categories => {
                for (label, category) in self.categories.names().iter().enumerate() {
                    let dir = self.root_dir.join(category);
                    if !dir.is_dir() {
                        return Err(BirdsongError::PathNotFound(dir));
                    }

                    let loaded = self.load_paths(
                        self.list_images(&dir),
                        label as i64,
                        category,
                        &mut pixels,
                        &mut labels,
                        &mut paths,
                        &mut report,
                    )?;
                    debug!("Category '{}' (label {}): {} images", category, label, loaded);
                    report.per_category.push((category.clone(), loaded));
                }
            }
            LoadMode::Prediction => {
                let loaded = self.load_paths(
                    self.list_images(&self.root_dir),
                    PLACEHOLDER_LABEL,
                    "unlabeled",
                    &mut pixels,
                    &mut labels,
                    &mut paths,
                    &mut report,
                )?;
                report.per_category.push(("unlabeled".to_string(), loaded));
            }
        }

        self.assemble(pixels, labels, paths, report)
    }

    /// Load an explicit list of files in the given order, with placeholder labels
    ///
    /// Same skip policy as [`Self::load_data`]; the root directory is not read.
    pub fn load_files(&self, files: &[PathBuf]) -> Result<LoadedImages> {
        debug!("Loading {} listed spectrogram(s)", files.len());

        let mut pixels: Vec<u8> = Vec::new();
        let mut labels: Vec<i64> = Vec::new();
        let mut paths: Vec<PathBuf> = Vec::new();
        let mut report = LoadReport::default();

        let loaded = self.load_paths(
            files.to_vec(),
            PLACEHOLDER_LABEL,
            "unlabeled",
            &mut pixels,
            &mut labels,
            &mut paths,
            &mut report,
        )?;
        report.per_category.push(("unlabeled".to_string(), loaded));

        self.assemble(pixels, labels, paths, report)
    }

    fn assemble(
        &self,
        pixels: Vec<u8>,
        labels: Vec<i64>,
        paths: Vec<PathBuf>,
        report: LoadReport,
    ) -> Result<LoadedImages> {
        let n = labels.len();
        let images = Array4::from_shape_vec(
            (n, self.image_size, self.image_size, CHANNELS),
            pixels,
        )
        .map_err(|e| BirdsongError::Dataset(format!("image buffer has wrong size: {}", e)))?;

        if !report.skipped.is_empty() {
            warn!("Skipped {} unreadable file(s)", report.skipped.len());
        }
        info!("Loaded {} images", n);

        Ok(LoadedImages {
            images,
            labels: Array1::from_vec(labels),
            paths,
            report,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn load_paths(
        &self,
        files: Vec<PathBuf>,
        label: i64,
        name: &str,
        pixels: &mut Vec<u8>,
        labels: &mut Vec<i64>,
        paths: &mut Vec<PathBuf>,
        report: &mut LoadReport,
    ) -> Result<usize> {
        let pb = self.progress_bar(files.len(), name);
        let mut loaded = 0;

        for path in files {
            match self.load_image(&path) {
                Ok(data) => {
                    pixels.extend_from_slice(&data);
                    labels.push(label);
                    paths.push(path);
                    loaded += 1;
                }
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    report.skipped.push((path, e.to_string()));
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        Ok(loaded)
    }

    /// Qualifying files directly inside `dir`, sorted by file name
    pub fn list_images(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext.to_string_lossy().to_lowercase() == self.extension)
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        files
    }

    /// Decode one image, convert to RGB and resize to `image_size²`
    ///
    /// Returns `size * size * 3` bytes in row-major HWC order.
    pub fn load_image(&self, path: &Path) -> Result<Vec<u8>> {
        let size = self.image_size as u32;
        let img = ImageReader::open(path)
            .map_err(|e| BirdsongError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .decode()
            .map_err(|e| BirdsongError::ImageLoad(path.to_path_buf(), e.to_string()))?;

        Ok(img
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8()
            .into_raw())
    }

    fn progress_bar(&self, len: usize, name: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::with_template(
            "  {spinner:.green} {msg:24} [{bar:40.cyan/blue}] {pos}/{len}",
        )
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_message(name.to_string());
        pb
    }
}

/// Persist an image/label pair as `X.npy` and `y.npy` under `dir`
pub fn save_arrays<A: WritableElement>(
    images: &Array4<A>,
    labels: &Array1<i64>,
    dir: &Path,
) -> Result<()> {
    if images.shape()[0] != labels.len() {
        return Err(BirdsongError::Dataset(format!(
            "cannot save {} images with {} labels",
            images.shape()[0],
            labels.len()
        )));
    }

    std::fs::create_dir_all(dir)?;
    write_npy(dir.join(IMAGES_FILE), images)?;
    write_npy(dir.join(LABELS_FILE), labels)?;
    debug!("Saved {} samples to {:?}", labels.len(), dir);
    Ok(())
}

/// Read an image/label pair written by [`save_arrays`]
pub fn load_arrays<A: ReadableElement>(dir: &Path) -> Result<(Array4<A>, Array1<i64>)> {
    for file in [IMAGES_FILE, LABELS_FILE] {
        let path = dir.join(file);
        if !path.is_file() {
            return Err(BirdsongError::PathNotFound(path));
        }
    }

    let images: Array4<A> = read_npy(dir.join(IMAGES_FILE))?;
    let labels: Array1<i64> = read_npy(dir.join(LABELS_FILE))?;

    if images.shape()[0] != labels.len() {
        return Err(BirdsongError::Dataset(format!(
            "{:?} holds {} images but {} labels",
            dir,
            images.shape()[0],
            labels.len()
        )));
    }

    Ok((images, labels))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    /// Write `count` synthetic spectrogram-like images into `dir`
    pub(crate) fn write_images(dir: &Path, count: usize, size: u32, seed: u8) {
        std::fs::create_dir_all(dir).unwrap();
        for i in 0..count {
            let img = ImageBuffer::from_fn(size, size, |x, y| {
                Rgb([
                    (x as u8).wrapping_mul(3).wrapping_add(seed),
                    (y as u8).wrapping_add(i as u8),
                    seed.wrapping_mul(40),
                ])
            });
            img.save(dir.join(format!("{}_{:03}.jpg", seed, i))).unwrap();
        }
    }

    /// Create a categories-mode tree with `per_class` images per species
    pub(crate) fn write_dataset(root: &Path, per_class: usize, size: u32) {
        for (i, category) in CategoryList::canonical().names().iter().enumerate() {
            write_images(&root.join(category), per_class, size, i as u8 + 1);
        }
    }

    #[test]
    fn test_load_categories_shapes_and_labels() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path(), 10, 150);

        let loader = SpectrogramLoader::new(dir.path(), CategoryList::canonical());
        let data = loader.load_data(LoadMode::Categories).unwrap();

        assert_eq!(data.images.shape(), &[30, 150, 150, 3]);
        assert_eq!(data.labels.shape(), &[30]);
        for (label, path) in data.labels.iter().zip(&data.paths) {
            assert!((0..3).contains(label));
            let parent = path.parent().unwrap().file_name().unwrap().to_str().unwrap();
            assert_eq!(CategoryList::canonical().index_of(parent), Some(*label as usize));
        }
    }

    #[test]
    fn test_resizes_to_configured_size() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path(), 2, 40);

        let loader = SpectrogramLoader::new(dir.path(), CategoryList::canonical()).with_image_size(32);
        let data = loader.load_data(LoadMode::Categories).unwrap();
        assert_eq!(data.images.shape(), &[6, 32, 32, 3]);
    }

    #[test]
    fn test_corrupt_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path(), 10, 64);
        let corrupt = dir.path().join("house_sparrow").join("broken.jpg");
        std::fs::write(&corrupt, b"definitely not a jpeg").unwrap();

        let loader = SpectrogramLoader::new(dir.path(), CategoryList::canonical()).with_image_size(64);
        let data = loader.load_data(LoadMode::Categories).unwrap();

        assert_eq!(data.report.per_category[2], ("house_sparrow".to_string(), 10));
        assert_eq!(data.len(), 30);
        assert_eq!(data.report.skipped.len(), 1);
        assert_eq!(data.report.skipped[0].0, corrupt);
    }

    #[test]
    fn test_extension_filter_and_non_recursive() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path(), 3, 32);
        let chaffinch = dir.path().join("common_chaffinch");
        std::fs::write(chaffinch.join("notes.txt"), "ignored").unwrap();
        write_images(&chaffinch.join("nested"), 2, 32, 9);

        let loader = SpectrogramLoader::new(dir.path(), CategoryList::canonical()).with_image_size(32);
        let data = loader.load_data(LoadMode::Categories).unwrap();
        assert_eq!(data.report.per_category[0].1, 3);
        assert!(data.report.skipped.is_empty());
    }

    #[test]
    fn test_prediction_mode_uses_placeholder_labels() {
        let dir = TempDir::new().unwrap();
        write_images(dir.path(), 4, 48, 7);

        let loader = SpectrogramLoader::new(dir.path(), CategoryList::canonical()).with_image_size(48);
        let data = loader.load_data(LoadMode::Prediction).unwrap();

        assert_eq!(data.images.shape(), &[4, 48, 48, 3]);
        assert!(data.labels.iter().all(|&l| l == PLACEHOLDER_LABEL));
    }

    #[test]
    fn test_load_files_keeps_listed_order() {
        let dir = TempDir::new().unwrap();
        write_images(dir.path(), 4, 32, 5);
        let broken = dir.path().join("broken.jpg");
        std::fs::write(&broken, b"not an image").unwrap();

        let loader = SpectrogramLoader::new("/nonexistent", CategoryList::canonical()).with_image_size(32);
        let files = vec![
            dir.path().join("5_002.jpg"),
            broken.clone(),
            dir.path().join("5_000.jpg"),
        ];
        let data = loader.load_files(&files).unwrap();

        assert_eq!(data.images.shape(), &[2, 32, 32, 3]);
        assert_eq!(data.paths, vec![files[0].clone(), files[2].clone()]);
        assert!(data.labels.iter().all(|&l| l == PLACEHOLDER_LABEL));
        assert_eq!(data.report.skipped.len(), 1);
        assert_eq!(data.report.skipped[0].0, broken);
        assert_eq!(data.report.loaded(), 2);
    }

    #[test]
    fn test_missing_category_directory_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_images(&dir.path().join("common_chaffinch"), 2, 32, 1);

        let loader = SpectrogramLoader::new(dir.path(), CategoryList::canonical());
        let err = loader.load_data(LoadMode::Categories).unwrap_err();
        assert!(matches!(err, BirdsongError::PathNotFound(p) if p.ends_with("eurasian_blue_tit")));
    }

    #[test]
    fn test_save_and_load_arrays() {
        let dir = TempDir::new().unwrap();
        let images = Array4::<f32>::from_shape_fn((4, 5, 5, 3), |(n, h, w, c)| {
            (n * 100 + h * 10 + w) as f32 - c as f32 * 0.5
        });
        let labels = Array1::from_vec(vec![0i64, 1, 2, 1]);

        save_arrays(&images, &labels, dir.path()).unwrap();
        let (loaded_images, loaded_labels): (Array4<f32>, Array1<i64>) =
            load_arrays(dir.path()).unwrap();

        assert_eq!(loaded_images, images);
        assert_eq!(loaded_labels, labels);
    }

    #[test]
    fn test_load_arrays_missing_file() {
        let dir = TempDir::new().unwrap();
        let result: Result<(Array4<u8>, Array1<i64>)> = load_arrays(dir.path());
        assert!(matches!(result, Err(BirdsongError::PathNotFound(_))));
    }
}
