//! Stratified train/test split
//!
//! The split keeps every species' share of the data the same in both
//! partitions. It is deterministic for a given seed:
//!
//! 1. `n_test = ceil(test_fraction * N)`
//! 2. Each class gets `n_test * n_class / N` test slots, rounded by largest
//!    remainder (ties go to the lower label)
//! 3. Each class is shuffled with the seeded RNG and its first slots go to test
//! 4. Both partitions are shuffled once more so classes are interleaved

use std::collections::BTreeMap;

use ndarray::{Array1, Array4, Axis};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{BirdsongError, Result};

/// Configuration for the train/test split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of samples held out for testing
    pub test_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.1,
            seed: 42,
        }
    }
}

impl SplitConfig {
    pub fn new(test_fraction: f64, seed: u64) -> Result<Self> {
        let config = Self { test_fraction, seed };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(BirdsongError::Config(format!(
                "Test fraction must be between 0.0 and 1.0 (exclusive), got {}",
                self.test_fraction
            )));
        }
        Ok(())
    }
}

/// The two partitions and the original indices they came from
#[derive(Debug, Clone)]
pub struct TrainTestSplit<A> {
    pub x_train: Array4<A>,
    pub y_train: Array1<i64>,
    pub x_test: Array4<A>,
    pub y_test: Array1<i64>,
    /// Row of the input each training sample came from
    pub train_indices: Vec<usize>,
    /// Row of the input each test sample came from
    pub test_indices: Vec<usize>,
}

impl<A> TrainTestSplit<A> {
    pub fn summary(&self) -> SplitSummary {
        let mut per_class: BTreeMap<i64, (usize, usize)> = BTreeMap::new();
        for &label in self.y_train.iter() {
            per_class.entry(label).or_default().0 += 1;
        }
        for &label in self.y_test.iter() {
            per_class.entry(label).or_default().1 += 1;
        }

        SplitSummary {
            train_size: self.y_train.len(),
            test_size: self.y_test.len(),
            per_class: per_class
                .into_iter()
                .map(|(label, (train, test))| (label, train, test))
                .collect(),
        }
    }
}

/// Partition sizes, overall and per class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitSummary {
    pub train_size: usize,
    pub test_size: usize,
    /// (label, train count, test count)
    pub per_class: Vec<(i64, usize, usize)>,
}

impl std::fmt::Display for SplitSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = (self.train_size + self.test_size).max(1) as f64;
        writeln!(f, "Dataset Split Statistics:")?;
        writeln!(f, "  Total images: {}", self.train_size + self.test_size)?;
        writeln!(
            f,
            "  Train set: {} ({:.1}%)",
            self.train_size,
            100.0 * self.train_size as f64 / total
        )?;
        writeln!(
            f,
            "  Test set: {} ({:.1}%)",
            self.test_size,
            100.0 * self.test_size as f64 / total
        )?;
        for (label, train, test) in &self.per_class {
            let name = super::class_name(*label as usize).unwrap_or("?");
            writeln!(f, "    [{}] {:<20} train {:>5}  test {:>5}", label, name, train, test)?;
        }
        Ok(())
    }
}

/// Split images and labels into stratified train and test partitions
pub fn stratified_split<A: Clone>(
    images: &Array4<A>,
    labels: &Array1<i64>,
    config: &SplitConfig,
) -> Result<TrainTestSplit<A>> {
    config.validate()?;

    let n = labels.len();
    if images.shape()[0] != n {
        return Err(BirdsongError::Dataset(format!(
            "{} images but {} labels",
            images.shape()[0],
            n
        )));
    }

    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }

    if let Some((label, members)) = by_class.iter().find(|(_, m)| m.len() < 2) {
        return Err(BirdsongError::Dataset(format!(
            "class {} has {} sample(s); stratification needs at least 2 per class",
            label,
            members.len()
        )));
    }

    let n_test = (config.test_fraction * n as f64).ceil() as usize;
    let n_classes = by_class.len();
    if n_test < n_classes {
        return Err(BirdsongError::Dataset(format!(
            "test partition of {} cannot hold all {} classes",
            n_test, n_classes
        )));
    }
    if n - n_test < n_classes {
        return Err(BirdsongError::Dataset(format!(
            "train partition of {} cannot hold all {} classes",
            n - n_test,
            n_classes
        )));
    }

    let counts: Vec<usize> = by_class.values().map(Vec::len).collect();
    let allocation = allocate_test_slots(&counts, n_test, n);

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut train_indices = Vec::with_capacity(n - n_test);
    let mut test_indices = Vec::with_capacity(n_test);

    for (members, &take) in by_class.values().zip(&allocation) {
        let mut members = members.clone();
        members.shuffle(&mut rng);
        test_indices.extend_from_slice(&members[..take]);
        train_indices.extend_from_slice(&members[take..]);
    }

    train_indices.shuffle(&mut rng);
    test_indices.shuffle(&mut rng);

    Ok(TrainTestSplit {
        x_train: images.select(Axis(0), &train_indices),
        y_train: labels.select(Axis(0), &train_indices),
        x_test: images.select(Axis(0), &test_indices),
        y_test: labels.select(Axis(0), &test_indices),
        train_indices,
        test_indices,
    })
}

/// Distribute `n_test` slots across classes proportionally to their size
fn allocate_test_slots(counts: &[usize], n_test: usize, total: usize) -> Vec<usize> {
    let exact: Vec<f64> = counts
        .iter()
        .map(|&c| n_test as f64 * c as f64 / total as f64)
        .collect();
    let mut allocation: Vec<usize> = exact
        .iter()
        .zip(counts)
        .map(|(&e, &c)| (e.floor() as usize).clamp(1, c - 1))
        .collect();

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal).then(a.cmp(&b))
    });

    let mut assigned: usize = allocation.iter().sum();
    let mut cursor = 0;
    let mut stalled = 0;
    while assigned < n_test && stalled < order.len() {
        let class = order[cursor % order.len()];
        if allocation[class] < counts[class] - 1 {
            allocation[class] += 1;
            assigned += 1;
            stalled = 0;
        } else {
            stalled += 1;
        }
        cursor += 1;
    }

    // Clamping to one slot per class can overshoot on tiny classes
    cursor = order.len();
    stalled = 0;
    while assigned > n_test && stalled < order.len() {
        cursor -= 1;
        let class = order[cursor];
        if allocation[class] > 1 {
            allocation[class] -= 1;
            assigned -= 1;
            stalled = 0;
        } else {
            stalled += 1;
        }
        if cursor == 0 {
            cursor = order.len();
        }
    }

    allocation
}
