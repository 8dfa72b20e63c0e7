//! Model training module
//!
//! Provides:
//! - Stratified train/test splitting
//! - Weighted Gini decision trees
//! - Random Forest classification with balanced class weights
//! - The end-to-end training pipeline

mod engine;
mod models;
pub mod decision_tree;
pub mod random_forest;
pub mod split;

pub use decision_tree::{DecisionTree, TreeNode};
pub use engine::{TrainingOutcome, TrainingPipeline};
pub use models::{BinaryClassifier, TrainingMetrics, DECISION_THRESHOLD};
pub use random_forest::{ClassWeight, MaxFeatures, RandomForest};
pub use split::{take_rows, Split, StratifiedSplitter};

use crate::error::{Result, SeroError};
use crate::preprocessing::numeric_values;
use ndarray::Array1;
use polars::prelude::DataFrame;

/// Read `target` as 0/1 labels. Missing or non-binary values are rejected.
pub fn binary_labels(df: &DataFrame, target: &str) -> Result<Array1<u8>> {
    let values = numeric_values(df, target)?;
    values
        .into_iter()
        .enumerate()
        .map(|(row, v)| match v {
            Some(x) if x == 0.0 => Ok(0u8),
            Some(x) if x == 1.0 => Ok(1u8),
            Some(x) => Err(SeroError::ValidationError(format!(
                "'{}' row {}: expected 0 or 1, found {}",
                target, row, x
            ))),
            None => Err(SeroError::ValidationError(format!(
                "'{}' row {}: missing label",
                target, row
            ))),
        })
        .collect()
}
