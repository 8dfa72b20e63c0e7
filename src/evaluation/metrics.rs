//! Binary classification metrics.

use serde::{Deserialize, Serialize};

/// Counts of a binary confusion matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl ConfusionMatrix {
    /// Tally `(truth, predicted)` pairs of 0/1 labels.
    pub fn from_labels(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t == 1, p == 1) {
                (true, true) => cm.tp += 1,
                (false, true) => cm.fp += 1,
                (false, false) => cm.tn += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    /// `(TP + TN) / N`; 0 when empty.
    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// `TP / (TP + FP)`; 0 with no predicted positives.
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// `TP / (TP + FN)`; 0 with no actual positives.
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// Harmonic mean of precision and recall; 0 when both are 0.
    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// As `[[TN, FP], [FN, TP]]`, rows = truth.
    pub fn as_matrix(&self) -> [[usize; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// One ROC operating point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub fpr: f64,
    pub tpr: f64,
    /// Lowest admitted score; `None` for the anchor that admits nothing
    pub threshold: Option<f64>,
}

/// One precision/recall operating point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrPoint {
    pub recall: f64,
    pub precision: f64,
    pub threshold: Option<f64>,
}

/// Cumulative `(threshold, tp, fp)` after admitting every row scoring at
/// least `threshold`, one entry per distinct score, highest first.
fn cumulative_counts(y_true: &[u8], scores: &[f64]) -> Vec<(f64, usize, usize)> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut out = Vec::new();
    let (mut tp, mut fp) = (0usize, 0usize);
    for (k, &i) in order.iter().enumerate() {
        if y_true[i] == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_group = order
            .get(k + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if last_of_group {
            out.push((scores[i], tp, fp));
        }
    }
    out
}

/// ROC curve from `(0, 0)`, where no row is admitted.
pub fn roc_curve(y_true: &[u8], scores: &[f64]) -> Vec<RocPoint> {
    let positives = y_true.iter().filter(|&&y| y == 1).count();
    let negatives = y_true.len() - positives;

    let mut curve = vec![RocPoint {
        fpr: 0.0,
        tpr: 0.0,
        threshold: None,
    }];
    curve.extend(
        cumulative_counts(y_true, scores)
            .into_iter()
            .map(|(threshold, tp, fp)| RocPoint {
                fpr: ratio(fp, negatives),
                tpr: ratio(tp, positives),
                threshold: Some(threshold),
            }),
    );
    curve
}

/// Precision/recall curve from recall 0, precision 1.
pub fn pr_curve(y_true: &[u8], scores: &[f64]) -> Vec<PrPoint> {
    let positives = y_true.iter().filter(|&&y| y == 1).count();

    let mut curve = vec![PrPoint {
        recall: 0.0,
        precision: 1.0,
        threshold: None,
    }];
    curve.extend(
        cumulative_counts(y_true, scores)
            .into_iter()
            .map(|(threshold, tp, fp)| PrPoint {
                recall: ratio(tp, positives),
                precision: ratio(tp, tp + fp),
                threshold: Some(threshold),
            }),
    );
    curve
}

/// Area under the ROC curve by the rank-sum (Mann-Whitney) statistic, ties
/// counting one half. `None` when either class is absent.
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> Option<f64> {
    let n = scores.len();
    let positives = y_true.iter().filter(|&&y| y == 1).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // 1-based average ranks over tie groups
    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = avg_rank;
        }
        start = end;
    }

    let pos_rank_sum: f64 = (0..n).filter(|&i| y_true[i] == 1).map(|i| ranks[i]).sum();
    let p = positives as f64;
    let u = pos_rank_sum - p * (p + 1.0) / 2.0;
    Some(u / (p * negatives as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix_sums_to_n() {
        let y_true = [1, 0, 1, 1, 0, 1, 0, 0];
        let y_pred = [1, 0, 1, 0, 0, 1, 1, 0];
        let cm = ConfusionMatrix::from_labels(&y_true, &y_pred);

        assert_eq!(cm.total(), 8);
        assert_eq!(cm, ConfusionMatrix { tp: 3, fp: 1, tn: 3, fn_: 1 });
        assert!((cm.accuracy() - 0.75).abs() < 1e-12);
        assert!((cm.precision() - 0.75).abs() < 1e-12);
        assert!((cm.recall() - 0.75).abs() < 1e-12);
        assert!((cm.f1() - 0.75).abs() < 1e-12);
        assert_eq!(cm.as_matrix(), [[3, 1], [1, 3]]);
    }

    #[test]
    fn test_no_predicted_positives() {
        let cm = ConfusionMatrix::from_labels(&[1, 0, 0], &[0, 0, 0]);
        assert_eq!(cm.precision(), 0.0);
        assert_eq!(cm.recall(), 0.0);
        assert_eq!(cm.f1(), 0.0);
    }

    #[test]
    fn test_auc_perfect_and_ties() {
        assert_eq!(roc_auc(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&[0, 1], &[0.5, 0.5]), Some(0.5));
        assert_eq!(roc_auc(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]), Some(0.75));
    }

    #[test]
    fn test_auc_single_class() {
        assert_eq!(roc_auc(&[0, 0, 0], &[0.1, 0.2, 0.3]), None);
    }

    #[test]
    fn test_roc_curve_shape() {
        let curve = roc_curve(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]);
        assert_eq!(curve.len(), 5);
        assert_eq!((curve[0].fpr, curve[0].tpr), (0.0, 0.0));
        assert_eq!(curve[0].threshold, None);
        assert_eq!(curve[1].threshold, Some(0.8));
        let last = curve.last().unwrap();
        assert_eq!((last.fpr, last.tpr), (1.0, 1.0));
        assert!(curve.windows(2).all(|w| w[0].fpr <= w[1].fpr && w[0].tpr <= w[1].tpr));
    }

    #[test]
    fn test_roc_curve_groups_ties() {
        let curve = roc_curve(&[0, 1, 1], &[0.5, 0.5, 0.9]);
        assert_eq!(curve.len(), 3);
        assert_eq!((curve[1].fpr, curve[1].tpr), (0.0, 0.5));
        assert_eq!((curve[2].fpr, curve[2].tpr), (1.0, 1.0));
    }

    #[test]
    fn test_pr_curve() {
        let curve = pr_curve(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]);
        assert_eq!((curve[0].recall, curve[0].precision), (0.0, 1.0));
        assert_eq!((curve[1].recall, curve[1].precision), (0.5, 1.0));
        assert_eq!((curve[2].recall, curve[2].precision), (0.5, 0.5));
        let last = curve.last().unwrap();
        assert_eq!((last.recall, last.precision), (1.0, 0.5));
    }
}
