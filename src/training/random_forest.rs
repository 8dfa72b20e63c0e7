//! Random Forest classifier

use super::decision_tree::DecisionTree;
use super::models::{BinaryClassifier, DECISION_THRESHOLD};
use crate::config::ForestConfig;
use crate::error::{Result, SeroError};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Strategy for the number of features drawn at each node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    /// Resolve against a concrete feature count; always at least 1
    pub fn resolve(&self, n_features: usize) -> usize {
        let k = match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).floor() as usize,
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Per-class sample weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassWeight {
    /// Every row weighs 1
    Uniform,
    /// `n / (n_classes * count_c)`, computed on the full training set
    Balanced,
}

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub class_weight: ClassWeight,
    pub random_state: Option<u64>,
    /// Fitted weights for class 0 and class 1
    class_weights: [f64; 2],
    feature_importances: Option<Array1<f64>>,
    n_features: usize,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new_classifier(500)
    }
}

impl RandomForest {
    /// Create a new classifier forest
    pub fn new_classifier(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            class_weight: ClassWeight::Balanced,
            random_state: None,
            class_weights: [1.0, 1.0],
            feature_importances: None,
            n_features: 0,
        }
    }

    /// Build an unfitted forest from configuration
    pub fn from_config(config: &ForestConfig, seed: u64) -> Self {
        let mut forest = Self::new_classifier(config.n_estimators)
            .with_min_samples_split(config.min_samples_split)
            .with_min_samples_leaf(config.min_samples_leaf)
            .with_max_features(config.max_features)
            .with_class_weight(if config.balanced {
                ClassWeight::Balanced
            } else {
                ClassWeight::Uniform
            })
            .with_random_state(seed);
        forest.max_depth = config.max_depth;
        forest
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set class weighting
    pub fn with_class_weight(mut self, class_weight: ClassWeight) -> Self {
        self.class_weight = class_weight;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn compute_class_weights(&self, y: &Array1<u8>) -> [f64; 2] {
        match self.class_weight {
            ClassWeight::Uniform => [1.0, 1.0],
            ClassWeight::Balanced => {
                let n = y.len() as f64;
                let pos = y.iter().filter(|&&v| v == 1).count() as f64;
                let neg = n - pos;
                let n_classes = [neg, pos].iter().filter(|&&c| c > 0.0).count() as f64;
                let weight = |count: f64| if count > 0.0 { n / (n_classes * count) } else { 0.0 };
                [weight(neg), weight(pos)]
            }
        }
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(SeroError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(SeroError::InsufficientData(
                "cannot fit a forest on zero rows".to_string(),
            ));
        }
        if let Some(bad) = y.iter().find(|&&v| v > 1) {
            return Err(SeroError::ValidationError(format!(
                "labels must be 0 or 1, found {}",
                bad
            )));
        }
        if self.n_estimators == 0 {
            return Err(SeroError::InvalidParameter {
                name: "n_estimators".to_string(),
                value: "0".to_string(),
                reason: "at least one tree is required".to_string(),
            });
        }

        self.n_features = n_features;
        self.class_weights = self.compute_class_weights(y);
        let max_features = self.max_features.resolve(n_features);
        let base_seed = self.random_state.unwrap_or(42);

        debug!(
            n_samples,
            n_features,
            max_features,
            weight_neg = self.class_weights[0],
            weight_pos = self.class_weights[1],
            "Fitting forest"
        );

        // Build trees in parallel
        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> =
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot: Array1<u8> = sample_indices.iter().map(|&i| y[i]).collect();
                let w_boot: Vec<f64> = y_boot
                    .iter()
                    .map(|&label| self.class_weights[label as usize])
                    .collect();

                let mut tree = DecisionTree::new()
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(max_features);
                if let Some(d) = self.max_depth {
                    tree = tree.with_max_depth(d);
                }

                tree.fit_weighted(&x_boot, &y_boot, &w_boot, &mut rng)?;
                Ok::<_, SeroError>(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.compute_feature_importances();

        info!(trees = self.trees.len(), n_samples, n_features, "Forest fitted");
        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        if self.trees.is_empty() {
            return;
        }

        let mut total_importances = vec![0.0; self.n_features];
        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (total, &val) in total_importances.iter_mut().zip(imp.iter()) {
                    *total += val;
                }
            }
        }

        let total: f64 = total_importances.iter().sum();
        if total > 0.0 {
            total_importances.iter_mut().for_each(|imp| *imp /= total);
        }

        self.feature_importances = Some(Array1::from_vec(total_importances));
    }

    /// Fraction of trees voting positive for each row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(SeroError::ModelNotFitted);
        }

        let votes: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| {
                tree.predict_proba(x)
                    .map(|p| p.mapv(|v| if v >= DECISION_THRESHOLD { 1.0 } else { 0.0 }))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut proba = Array1::<f64>::zeros(x.nrows());
        for v in &votes {
            proba += v;
        }
        proba /= self.trees.len() as f64;
        Ok(proba)
    }

    /// Hard 0/1 labels at [`DECISION_THRESHOLD`]
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<u8>> {
        Ok(self
            .predict_proba(x)?
            .mapv(|p| u8::from(p >= DECISION_THRESHOLD)))
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Width of the matrix the forest was fitted on
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Fitted weights for class 0 and class 1
    pub fn class_weights(&self) -> [f64; 2] {
        self.class_weights
    }
}

impl BinaryClassifier for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<()> {
        RandomForest::fit(self, x, y).map(|_| ())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RandomForest::predict_proba(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> (Array2<f64>, Array1<u8>) {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.1],
            [0.2, 0.2],
            [0.3, 0.1],
            [1.0, 1.0],
            [1.1, 1.1],
            [1.2, 1.2],
            [1.3, 1.1],
        ];
        let y = array![0u8, 0, 0, 0, 1, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_classifier() {
        let (x, y) = blobs();
        let mut rf = RandomForest::new_classifier(25).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let predictions = rf.predict(&x).unwrap();
        let correct = predictions.iter().zip(y.iter()).filter(|(p, a)| p == a).count();
        assert!(correct >= 7, "accuracy too low: {}/8", correct);
        assert_eq!(rf.n_trees(), 25);
    }

    #[test]
    fn test_proba_in_unit_interval() {
        let (x, y) = blobs();
        let mut rf = RandomForest::new_classifier(10).with_random_state(1);
        rf.fit(&x, &y).unwrap();
        let proba = rf.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_deterministic_given_seed() {
        let (x, y) = blobs();
        let mut a = RandomForest::new_classifier(15).with_random_state(9);
        let mut b = RandomForest::new_classifier(15).with_random_state(9);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_balanced_weights() {
        let x = Array2::<f64>::zeros((4, 1));
        let y = array![0u8, 0, 0, 1];
        let mut rf = RandomForest::new_classifier(2);
        rf.fit(&x, &y).unwrap();
        let [w0, w1] = rf.class_weights();
        assert!((w0 - 4.0 / 6.0).abs() < 1e-12);
        assert!((w1 - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_class_training() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0u8, 0, 0];
        let mut rf = RandomForest::new_classifier(5);
        rf.fit(&x, &y).unwrap();
        assert_eq!(rf.predict(&x).unwrap().to_vec(), vec![0, 0, 0]);
    }

    #[test]
    fn test_rejects_non_binary_labels() {
        let x = array![[0.0], [1.0]];
        let y = array![0u8, 2];
        let mut rf = RandomForest::new_classifier(3);
        assert!(matches!(rf.fit(&x, &y), Err(SeroError::ValidationError(_))));
    }

    #[test]
    fn test_unfitted_forest() {
        let rf = RandomForest::default();
        assert!(matches!(rf.predict(&array![[0.0]]), Err(SeroError::ModelNotFitted)));
    }

    #[test]
    fn test_max_features_resolve() {
        assert_eq!(MaxFeatures::Sqrt.resolve(10), 3);
        assert_eq!(MaxFeatures::Log2.resolve(1), 1);
        assert_eq!(MaxFeatures::Fixed(50).resolve(4), 4);
        assert_eq!(MaxFeatures::All.resolve(7), 7);
    }
}
