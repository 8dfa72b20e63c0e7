//! Model evaluation module
//!
//! Accuracy, precision, recall, F1, confusion matrix, AUC-ROC and the ROC and
//! precision/recall curves for a binary artifact.

pub mod metrics;
mod report;

pub use metrics::{pr_curve, roc_auc, roc_curve, ConfusionMatrix, PrPoint, RocPoint};
pub use report::{EvaluationReport, Evaluator};
