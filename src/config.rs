//! Pipeline configuration
//!
//! All paths and knobs are carried here and handed to each run explicitly.

use crate::error::{Result, SeroError};
use crate::training::MaxFeatures;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default target column (VDRL serology result, 0/1)
pub const DEFAULT_TARGET: &str = "VDRL_RESULT";

/// Default age column corrected by the cleaner
pub const DEFAULT_AGE_COLUMN: &str = "AGE";

/// Columns known to be numeric; everything else is categorical
pub const DEFAULT_NUMERIC_FEATURES: [&str; 5] = [
    "AGE",
    "NUM_RES_HOUSEHOLD",
    "NUM_LIV_CHILDREN",
    "NUM_ABORTIONS",
    "NUM_PREGNANCIES",
];

/// Forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    /// Inverse-frequency class weights
    pub balanced: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 500,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            balanced: true,
        }
    }
}

/// Configuration for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Target column name
    pub target_column: String,
    /// Column the cleaner corrects
    pub age_column: String,
    /// Known numeric feature names
    pub numeric_features: Vec<String>,
    /// Fraction of rows held out for evaluation
    pub test_fraction: f64,
    /// Seed for the splitter and the forest
    pub seed: u64,
    /// Forest hyperparameters
    pub forest: ForestConfig,
    /// Where the fitted artifact is written
    pub model_path: PathBuf,
    /// SQLite database for cleaned tables
    pub db_path: PathBuf,
    /// Table holding the cleaned dataset
    pub table_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_column: DEFAULT_TARGET.to_string(),
            age_column: DEFAULT_AGE_COLUMN.to_string(),
            numeric_features: DEFAULT_NUMERIC_FEATURES.iter().map(|s| s.to_string()).collect(),
            test_fraction: 0.2,
            seed: 42,
            forest: ForestConfig::default(),
            model_path: PathBuf::from("models/best_model_rf.bin"),
            db_path: PathBuf::from("data/syphilis.db"),
            table_name: "syphilis_cases".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a configuration from a JSON file; missing keys take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SeroError::FileNotFound(path.display().to_string()));
        }
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Builder method to set the target column
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_column = target.into();
        self
    }

    /// Builder method to set the numeric features
    pub fn with_numeric_features<S: Into<String>>(mut self, features: impl IntoIterator<Item = S>) -> Self {
        self.numeric_features = features.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to set the held-out fraction
    pub fn with_test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = fraction;
        self
    }

    /// Builder method to set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder method to set the number of trees
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.forest.n_estimators = n;
        self
    }

    /// Builder method to set the artifact path
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    /// Check value ranges before a run starts
    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(SeroError::InvalidParameter {
                name: "test_fraction".to_string(),
                value: self.test_fraction.to_string(),
                reason: "must be in (0, 1)".to_string(),
            });
        }
        if self.forest.n_estimators == 0 {
            return Err(SeroError::InvalidParameter {
                name: "n_estimators".to_string(),
                value: "0".to_string(),
                reason: "at least one tree is required".to_string(),
            });
        }
        if self.numeric_features.iter().any(|f| f == &self.target_column) {
            return Err(SeroError::InvalidParameter {
                name: "numeric_features".to_string(),
                value: self.target_column.clone(),
                reason: "target cannot be a feature".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.target_column, "VDRL_RESULT");
        assert_eq!(config.numeric_features.len(), 5);
        assert_eq!(config.forest.n_estimators, 500);
        assert_eq!(config.seed, 42);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = PipelineConfig::new()
            .with_target("label")
            .with_numeric_features(["x"])
            .with_test_fraction(0.3)
            .with_seed(7)
            .with_n_estimators(25);

        assert_eq!(config.target_column, "label");
        assert_eq!(config.numeric_features, vec!["x".to_string()]);
        assert_eq!(config.test_fraction, 0.3);
        assert_eq!(config.seed, 7);
        assert_eq!(config.forest.n_estimators, 25);
    }

    #[test]
    fn test_validate_rejects_bad_fraction() {
        let config = PipelineConfig::new().with_test_fraction(1.0);
        assert!(matches!(config.validate(), Err(SeroError::InvalidParameter { .. })));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"seed": 3}"#).unwrap();
        assert_eq!(config.seed, 3);
        assert_eq!(config.target_column, DEFAULT_TARGET);
    }
}
