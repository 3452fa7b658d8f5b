//! Per-epoch training history
//!
//! Persisted as `results/training_history.json` and drawn as
//! `results/training_history.svg` (loss and accuracy, train vs validation).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::charts::{generate_line_chart, DataSeries, LinePanel, COLOR_PRIMARY, COLOR_TERTIARY};
use crate::utils::error::Result;

/// Metric values per epoch; validation vectors stay empty without a hold-out
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub loss: Vec<f64>,
    pub accuracy: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_epoch(&mut self, loss: f64, accuracy: f64, validation: Option<(f64, f64)>) {
        self.loss.push(loss);
        self.accuracy.push(accuracy);
        if let Some((val_loss, val_accuracy)) = validation {
            self.val_loss.push(val_loss);
            self.val_accuracy.push(val_accuracy);
        }
    }

    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    pub fn has_validation(&self) -> bool {
        !self.val_loss.is_empty()
    }

    /// Best validation accuracy and its zero-based epoch
    pub fn best_val_accuracy(&self) -> Option<(usize, f64)> {
        self.val_accuracy
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, acc)| match best {
                Some((_, b)) if b >= acc => best,
                _ => Some((i, acc)),
            })
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Loss and accuracy curves side by side
    pub fn plot(&self, path: &Path) -> Result<()> {
        let percent = |v: &[f64]| v.iter().map(|a| a * 100.0).collect::<Vec<_>>();

        let mut loss = vec![DataSeries::from_epochs("Train", &self.loss, COLOR_PRIMARY)];
        let mut accuracy = vec![DataSeries::from_epochs("Train", &percent(&self.accuracy), COLOR_PRIMARY)];
        if self.has_validation() {
            loss.push(DataSeries::from_epochs("Validation", &self.val_loss, COLOR_TERTIARY));
            accuracy.push(DataSeries::from_epochs(
                "Validation",
                &percent(&self.val_accuracy),
                COLOR_TERTIARY,
            ));
        }

        let panels = [
            LinePanel {
                title: "Model Loss".to_string(),
                x_label: "Epoch".to_string(),
                y_label: "Loss".to_string(),
                series: loss,
            },
            LinePanel {
                title: "Model Accuracy".to_string(),
                x_label: "Epoch".to_string(),
                y_label: "Accuracy (%)".to_string(),
                series: accuracy,
            },
        ];

        generate_line_chart(&panels, path)?;
        Ok(())
    }
}
