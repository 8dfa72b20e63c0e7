//! Weighted Gini decision tree for binary targets

use crate::error::{Result, SeroError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node holding the weighted positive-class fraction
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Internal node; rows with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    fn leaf(stats: &NodeStats, n_samples: usize) -> Self {
        TreeNode::Leaf {
            value: stats.positive_fraction(),
            n_samples,
        }
    }
}

/// Weighted class totals of a node
#[derive(Debug, Clone, Copy, Default)]
struct NodeStats {
    neg: f64,
    pos: f64,
}

impl NodeStats {
    fn total(&self) -> f64 {
        self.neg + self.pos
    }

    fn gini(&self) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        let p = self.pos / total;
        let q = self.neg / total;
        1.0 - p * p - q * q
    }

    fn positive_fraction(&self) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            0.0
        } else {
            self.pos / total
        }
    }

    fn add(&mut self, label: u8, weight: f64) {
        if label == 1 {
            self.pos += weight;
        } else {
            self.neg += weight;
        }
    }
}

struct BestSplit {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Read-only training inputs shared by every node
struct TrainSet<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<u8>,
    w: &'a [f64],
}

/// Binary classification tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per node; `None` means all
    pub max_features: Option<usize>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set the number of features drawn at each node
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    /// Fit the tree on 0/1 labels with per-row weights.
    ///
    /// `rng` drives the feature draw at every node.
    pub fn fit_weighted(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<u8>,
        sample_weight: &[f64],
        rng: &mut ChaCha8Rng,
    ) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() || n_samples != sample_weight.len() {
            return Err(SeroError::ShapeError {
                expected: format!("{} labels and weights", n_samples),
                actual: format!("{} labels, {} weights", y.len(), sample_weight.len()),
            });
        }
        if n_samples == 0 {
            return Err(SeroError::InsufficientData(
                "cannot fit a tree on zero rows".to_string(),
            ));
        }

        self.n_features = x.ncols();
        let data = TrainSet { x, y, w: sample_weight };
        let mut importances = vec![0.0; self.n_features];
        let indices: Vec<usize> = (0..n_samples).collect();

        self.root = Some(self.build_tree(&data, &indices, 0, &mut importances, rng));

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|imp| *imp /= total);
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn node_stats(data: &TrainSet<'_>, indices: &[usize]) -> NodeStats {
        let mut stats = NodeStats::default();
        for &i in indices {
            stats.add(data.y[i], data.w[i]);
        }
        stats
    }

    fn build_tree(
        &self,
        data: &TrainSet<'_>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let stats = Self::node_stats(data, indices);
        let impurity = stats.gini();

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= f64::EPSILON;

        if should_stop {
            return TreeNode::leaf(&stats, n_samples);
        }

        let best = match self.find_best_split(data, indices, &stats, rng) {
            Some(best) => best,
            None => return TreeNode::leaf(&stats, n_samples),
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| data.x[[i, best.feature_idx]] <= best.threshold);
        if left_indices.len() < self.min_samples_leaf.max(1)
            || right_indices.len() < self.min_samples_leaf.max(1)
        {
            return TreeNode::leaf(&stats, n_samples);
        }

        importances[best.feature_idx] += stats.total() * best.gain;

        let left = Box::new(self.build_tree(data, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(data, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
            n_samples,
            impurity,
        }
    }

    /// Scan features in random order until `max_features` non-constant ones
    /// have been evaluated.
    fn find_best_split(
        &self,
        data: &TrainSet<'_>,
        indices: &[usize],
        parent: &NodeStats,
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let n_features = data.x.ncols();
        let budget = self.max_features.unwrap_or(n_features).min(n_features);

        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(rng);

        let parent_impurity = parent.gini();
        let parent_weight = parent.total();
        let mut best: Option<BestSplit> = None;
        let mut visited = 0;

        for feature_idx in features {
            if visited >= budget {
                break;
            }

            let mut rows: Vec<(f64, u8, f64)> = indices
                .iter()
                .map(|&i| (data.x[[i, feature_idx]], data.y[i], data.w[i]))
                .collect();
            rows.sort_by(|a, b| a.0.total_cmp(&b.0));

            let (first, last) = (rows[0].0, rows[rows.len() - 1].0);
            if last - first <= f64::EPSILON * first.abs().max(1.0) {
                continue;
            }
            visited += 1;

            let mut left = NodeStats::default();
            for k in 0..rows.len() - 1 {
                left.add(rows[k].1, rows[k].2);
                if rows[k + 1].0 <= rows[k].0 {
                    continue;
                }
                let n_left = k + 1;
                let n_right = rows.len() - n_left;
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }

                let right = NodeStats {
                    neg: parent.neg - left.neg,
                    pos: parent.pos - left.pos,
                };
                let weighted = (left.total() * left.gini() + right.total() * right.gini()) / parent_weight;
                let gain = parent_impurity - weighted;

                if gain > best.as_ref().map_or(f64::EPSILON, |b| b.gain) {
                    // Midpoint of adjacent floats can round onto the right value
                    let mut threshold = (rows[k].0 + rows[k + 1].0) / 2.0;
                    if threshold >= rows[k + 1].0 {
                        threshold = rows[k].0;
                    }
                    best = Some(BestSplit {
                        feature_idx,
                        threshold,
                        gain,
                    });
                }
            }
        }

        best
    }

    fn leaf_value(&self, row: ArrayView1<f64>) -> Option<f64> {
        let mut node = self.root.as_ref()?;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return Some(*value),
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Weighted positive fraction of the leaf each row lands in
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.root.is_none() {
            return Err(SeroError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(SeroError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        x.rows()
            .into_iter()
            .map(|row| self.leaf_value(row).ok_or(SeroError::ModelNotFitted))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from_vec)
    }

    /// Normalized impurity decrease per feature
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        self.root.as_ref().map_or(0, walk)
    }

    pub fn n_leaves(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => walk(left) + walk(right),
            }
        }
        self.root.as_ref().map_or(0, walk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn test_separable_data() {
        let x = array![[0.0, 5.0], [0.1, 4.0], [0.2, 6.0], [1.0, 5.0], [1.1, 4.0], [1.2, 6.0]];
        let y = array![0u8, 0, 0, 1, 1, 1];
        let w = vec![1.0; 6];
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let mut tree = DecisionTree::new();
        tree.fit_weighted(&x, &y, &w, &mut rng).unwrap();

        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba.to_vec(), vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(tree.depth(), 1);

        let imp = tree.feature_importances().unwrap();
        assert!((imp[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_max_depth_zero_is_single_leaf() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0u8, 1, 0, 1];
        let w = vec![1.0; 4];
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let mut tree = DecisionTree::new().with_max_depth(0);
        tree.fit_weighted(&x, &y, &w, &mut rng).unwrap();
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict_proba(&x).unwrap().to_vec(), vec![0.5; 4]);
    }

    #[test]
    fn test_weights_shift_leaf_value() {
        let x = array![[0.0], [0.0], [0.0]];
        let y = array![0u8, 0, 1];
        let w = vec![1.0, 1.0, 6.0];
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let mut tree = DecisionTree::new();
        tree.fit_weighted(&x, &y, &w, &mut rng).unwrap();
        let proba = tree.predict_proba(&array![[0.0]]).unwrap();
        assert!((proba[0] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_adjacent_float_values_split_cleanly() {
        let a = f64::from_bits(1.0f64.to_bits() + 1);
        let b = f64::from_bits(1.0f64.to_bits() + 2);
        let x = array![[0.0], [a], [b], [10.0]];
        let y = array![0u8, 0, 1, 1];
        let w = vec![1.0; 4];
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let mut tree = DecisionTree::new();
        tree.fit_weighted(&x, &y, &w, &mut rng).unwrap();

        assert_eq!(tree.predict_proba(&x).unwrap().to_vec(), vec![0.0, 0.0, 1.0, 1.0]);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_unfitted_tree() {
        let tree = DecisionTree::new();
        assert!(matches!(
            tree.predict_proba(&array![[0.0]]),
            Err(SeroError::ModelNotFitted)
        ));
    }
}
