//! Classifier trait and training-time metrics

use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Probability at or above which a row is labelled positive
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Summary recorded alongside a fitted model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Accuracy on the transformed training split
    pub train_accuracy: f64,
    pub n_train: usize,
    pub n_test: usize,
    /// Positive rows in the training split
    pub n_train_positive: usize,
    pub training_time_secs: f64,
}

impl TrainingMetrics {
    /// Fraction of matching labels; 0 for empty input
    pub fn accuracy(y_true: &Array1<u8>, y_pred: &Array1<u8>) -> f64 {
        if y_true.is_empty() {
            return 0.0;
        }
        let correct = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| t == p)
            .count();
        correct as f64 / y_true.len() as f64
    }
}

/// Binary classifier over a dense feature matrix
pub trait BinaryClassifier: Send + Sync {
    /// Fit the model to 0/1 labels
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<()>;

    /// Probability of the positive class for each row
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Hard labels at [`DECISION_THRESHOLD`]
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<u8>> {
        Ok(self
            .predict_proba(x)?
            .mapv(|p| u8::from(p >= DECISION_THRESHOLD)))
    }

    /// Get feature importances (if available)
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}
