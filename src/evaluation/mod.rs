//! Evaluation module
//!
//! - `evaluator`: batched `evaluate` (loss, accuracy) and `predict` (probabilities)
//! - `metrics`: confusion matrix, per-class metrics, classification report
//! - `report`: the evaluation driver and its JSON/SVG outputs

pub mod evaluator;
pub mod metrics;
pub mod report;

pub use evaluator::{evaluate, predict, predicted_classes, EvalMetrics};
pub use metrics::{ClassMetrics, ClassificationReport, ConfusionMatrix};
pub use report::{run_evaluation, EvaluationReport, SpeciesEvaluation};
