//! Metrics Module for Model Evaluation
//!
//! - Confusion matrix (rows = true species, columns = predicted species)
//! - Per-class precision, recall, F1 and support
//! - A classification report laid out like scikit-learn's
//! - Running loss/accuracy accumulators for the training loop

use serde::{Deserialize, Serialize};

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Matrix data (row = actual, column = predicted)
    /// Stored as a flat vector in row-major order
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize], num_classes: usize) -> Self {
        let mut cm = Self::new(num_classes);
        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }
        cm
    }

    /// Add a single prediction to the matrix
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Actual class counts
    pub fn row_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|row| (0..self.num_classes).map(|col| self.get(row, col)).sum())
            .collect()
    }

    /// Predicted class counts
    pub fn col_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|col| (0..self.num_classes).map(|row| self.get(row, col)).sum())
            .collect()
    }

    /// Rows as plain vectors, for serialization
    pub fn rows(&self) -> Vec<Vec<usize>> {
        (0..self.num_classes)
            .map(|row| (0..self.num_classes).map(|col| self.get(row, col)).collect())
            .collect()
    }

    /// Normalize the matrix so each non-empty row sums to 1
    pub fn normalize_rows(&self) -> Vec<Vec<f64>> {
        let row_sums = self.row_sums();
        (0..self.num_classes)
            .map(|row| {
                let sum = row_sums[row] as f64;
                (0..self.num_classes)
                    .map(|col| if sum > 0.0 { self.get(row, col) as f64 / sum } else { 0.0 })
                    .collect()
            })
            .collect()
    }

    /// Text rendering with species names on both axes
    pub fn display(&self, class_names: &[String]) -> String {
        let label = |i: usize| -> String {
            class_names
                .get(i)
                .map(|n| n.chars().take(12).collect())
                .unwrap_or_else(|| i.to_string())
        };

        let mut output = String::from("Confusion Matrix (rows=true, cols=predicted):\n\n");
        output.push_str(&format!("{:>14}", ""));
        for col in 0..self.num_classes {
            output.push_str(&format!("{:>14}", label(col)));
        }
        output.push('\n');

        for row in 0..self.num_classes {
            output.push_str(&format!("{:>14}", label(row)));
            for col in 0..self.num_classes {
                let count = self.get(row, col);
                if row == col {
                    output.push_str(&format!("{:>14}", format!("[{}]", count)));
                } else {
                    output.push_str(&format!("{:>14}", count));
                }
            }
            output.push('\n');
        }

        output
    }
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = (0..self.num_classes).map(|i| i.to_string()).collect();
        write!(f, "{}", self.display(&names))
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_idx: usize,
    pub class_name: String,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,

    /// Precision = TP / (TP + FP)
    pub precision: f64,

    /// Recall = TP / (TP + FN)
    pub recall: f64,

    /// F1 = 2 * (precision * recall) / (precision + recall)
    pub f1: f64,

    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize, class_name: &str) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // Predicted as this class but actually another
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // Actually this class but predicted as another
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            class_name: class_name.to_string(),
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support: true_positives + false_negatives,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Averaged precision/recall/F1 row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class metrics plus accuracy, macro and weighted averages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub per_class: Vec<ClassMetrics>,
    pub accuracy: f64,
    /// Unweighted mean over every listed class, including empty ones
    pub macro_avg: AverageMetrics,
    /// Mean weighted by support
    pub weighted_avg: AverageMetrics,
}

impl ClassificationReport {
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_names: &[String]) -> Self {
        let per_class: Vec<ClassMetrics> = (0..cm.num_classes)
            .map(|i| {
                let name = class_names.get(i).cloned().unwrap_or_else(|| i.to_string());
                ClassMetrics::from_confusion_matrix(cm, i, &name)
            })
            .collect();

        let total = cm.total();
        let n = per_class.len().max(1) as f64;
        let macro_avg = AverageMetrics {
            precision: per_class.iter().map(|m| m.precision).sum::<f64>() / n,
            recall: per_class.iter().map(|m| m.recall).sum::<f64>() / n,
            f1: per_class.iter().map(|m| m.f1).sum::<f64>() / n,
            support: total,
        };

        let weighted = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if total == 0 {
                return 0.0;
            }
            per_class.iter().map(|m| f(m) * m.support as f64).sum::<f64>() / total as f64
        };
        let weighted_avg = AverageMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1: weighted(|m| m.f1),
            support: total,
        };

        Self {
            accuracy: cm.accuracy(),
            per_class,
            macro_avg,
            weighted_avg,
        }
    }

    /// Text table with `digits` decimals
    pub fn render(&self, digits: usize) -> String {
        let width = self
            .per_class
            .iter()
            .map(|m| m.class_name.len())
            .chain(["weighted avg".len(), digits])
            .max()
            .unwrap_or(0);

        let mut out = format!(
            "{:>width$} {:>9} {:>9} {:>9} {:>9}\n\n",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        );

        for m in &self.per_class {
            out.push_str(&format!(
                "{:>width$} {:>9.digits$} {:>9.digits$} {:>9.digits$} {:>9}\n",
                m.class_name,
                m.precision,
                m.recall,
                m.f1,
                m.support,
                width = width,
                digits = digits
            ));
        }
        out.push('\n');

        out.push_str(&format!(
            "{:>width$} {:>9} {:>9} {:>9.digits$} {:>9}\n",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.weighted_avg.support,
            width = width,
            digits = digits
        ));
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            out.push_str(&format!(
                "{:>width$} {:>9.digits$} {:>9.digits$} {:>9.digits$} {:>9}\n",
                name,
                avg.precision,
                avg.recall,
                avg.f1,
                avg.support,
                width = width,
                digits = digits
            ));
        }

        out
    }
}

impl std::fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render(4))
    }
}

/// Sample-weighted running mean of batch losses
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch mean computed over `weight` samples
    pub fn add(&mut self, value: f64, weight: usize) {
        self.sum += value * weight as f64;
        self.count += weight;
    }

    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Accuracy tracker for batched predictions
#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    correct: usize,
    total: usize,
}

impl AccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch's correct count
    pub fn add_counts(&mut self, correct: usize, total: usize) {
        self.correct += correct;
        self.total += total;
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.total)
    }

    pub fn count(&self) -> usize {
        self.total
    }
}
