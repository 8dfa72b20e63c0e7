//! Evaluation report and evaluator

use super::metrics::{pr_curve, roc_auc, roc_curve, ConfusionMatrix, PrPoint, RocPoint};
use crate::error::{Result, SeroError};
use crate::export::ModelArtifact;
use crate::training::{binary_labels, DECISION_THRESHOLD};
use ndarray::Array1;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Quality of an artifact on labelled rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// `None` when the labels hold a single class
    pub auc_roc: Option<f64>,
    pub confusion: ConfusionMatrix,
    pub roc: Vec<RocPoint>,
    pub pr: Vec<PrPoint>,
    pub n_samples: usize,
    pub n_positive: usize,
}

impl EvaluationReport {
    /// Build a report from labels, hard predictions and scores
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8], scores: &[f64]) -> Result<Self> {
        if y_true.len() != y_pred.len() || y_true.len() != scores.len() {
            return Err(SeroError::ShapeError {
                expected: format!("{} predictions and scores", y_true.len()),
                actual: format!("{} predictions, {} scores", y_pred.len(), scores.len()),
            });
        }

        let confusion = ConfusionMatrix::from_labels(y_true, y_pred);
        Ok(Self {
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.f1(),
            auc_roc: roc_auc(y_true, scores),
            confusion,
            roc: roc_curve(y_true, scores),
            pr: pr_curve(y_true, scores),
            n_samples: y_true.len(),
            n_positive: y_true.iter().filter(|&&y| y == 1).count(),
        })
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cm = &self.confusion;
        writeln!(f, "Samples:   {} ({} positive)", self.n_samples, self.n_positive)?;
        writeln!(f, "Accuracy:  {:.4}", self.accuracy)?;
        writeln!(f, "Precision: {:.4}", self.precision)?;
        writeln!(f, "Recall:    {:.4}", self.recall)?;
        writeln!(f, "F1:        {:.4}", self.f1)?;
        match self.auc_roc {
            Some(auc) => writeln!(f, "AUC-ROC:   {:.4}", auc)?,
            None => writeln!(f, "AUC-ROC:   undefined (single class)")?,
        }
        writeln!(f)?;
        writeln!(f, "Confusion matrix (rows = actual):")?;
        writeln!(f, "            pred 0   pred 1")?;
        writeln!(f, "  actual 0  {:>6}   {:>6}", cm.tn, cm.fp)?;
        write!(f, "  actual 1  {:>6}   {:>6}", cm.fn_, cm.tp)
    }
}

/// Scores an artifact against labelled rows. Never modifies the artifact.
#[derive(Debug, Clone, Default)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate on `rows` against `labels` (same length, 0/1)
    pub fn run(
        &self,
        artifact: &ModelArtifact,
        rows: &DataFrame,
        labels: &Array1<u8>,
    ) -> Result<EvaluationReport> {
        if labels.len() != rows.height() {
            return Err(SeroError::ShapeError {
                expected: format!("{} labels", rows.height()),
                actual: format!("{} labels", labels.len()),
            });
        }

        let x = artifact.features(rows)?;
        let scores = artifact.classifier().predict_proba(&x)?;
        let predictions = scores.mapv(|p| u8::from(p >= DECISION_THRESHOLD));

        let y_true = labels.to_vec();
        let report = EvaluationReport::from_predictions(&y_true, &predictions.to_vec(), &scores.to_vec())?;

        if report.auc_roc.is_none() {
            warn!(n_samples = report.n_samples, "Only one class present; AUC undefined");
        }
        info!(
            n_samples = report.n_samples,
            accuracy = report.accuracy,
            precision = report.precision,
            recall = report.recall,
            f1 = report.f1,
            auc_roc = ?report.auc_roc,
            "Evaluation complete"
        );
        Ok(report)
    }

    /// Evaluate on a table whose target column holds the labels
    pub fn run_on_table(&self, artifact: &ModelArtifact, table: &DataFrame) -> Result<EvaluationReport> {
        let labels = binary_labels(table, &artifact.transform().spec().target)?;
        self.run(artifact, table, &labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_from_predictions() {
        let report = EvaluationReport::from_predictions(
            &[1, 0, 1, 0],
            &[1, 0, 0, 0],
            &[0.9, 0.2, 0.4, 0.1],
        )
        .unwrap();
        assert_eq!(report.confusion.total(), 4);
        assert_eq!(report.accuracy, 0.75);
        assert_eq!(report.precision, 1.0);
        assert_eq!(report.recall, 0.5);
        assert_eq!(report.auc_roc, Some(1.0));
    }

    #[test]
    fn test_no_positives_f1_zero() {
        let report = EvaluationReport::from_predictions(&[0, 0, 0], &[0, 0, 1], &[0.1, 0.3, 0.6]).unwrap();
        assert_eq!(report.f1, 0.0);
        assert_eq!(report.precision, 0.0);
        assert_eq!(report.recall, 0.0);
        assert_eq!(report.auc_roc, None);
    }

    #[test]
    fn test_json_report_reads_back() {
        let report = EvaluationReport::from_predictions(
            &[1, 0, 1, 0],
            &[1, 0, 0, 0],
            &[0.9, 0.2, 0.4, 0.1],
        )
        .unwrap();
        let json = serde_json::to_string_pretty(&report).unwrap();
        let restored: EvaluationReport = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.confusion, report.confusion);
        assert_eq!(restored.roc[0].threshold, None);
        assert_eq!(restored.pr[0].threshold, None);
        let thresholds: Vec<Option<f64>> = restored.roc.iter().map(|p| p.threshold).collect();
        assert_eq!(thresholds, vec![None, Some(0.9), Some(0.4), Some(0.2), Some(0.1)]);
    }

    #[test]
    fn test_display() {
        let report = EvaluationReport::from_predictions(&[1, 0], &[1, 0], &[0.8, 0.2]).unwrap();
        let text = report.to_string();
        assert!(text.contains("Accuracy:  1.0000"));
        assert!(text.contains("AUC-ROC:   1.0000"));
    }

    #[test]
    fn test_length_mismatch() {
        let err = EvaluationReport::from_predictions(&[1, 0], &[1], &[0.5, 0.5]).unwrap_err();
        assert!(matches!(err, SeroError::ShapeError { .. }));
    }
}
