//! seroscreen - serology outcome screening
//!
//! Prepares tabular public-health records, trains a random forest that
//! predicts a positive VDRL result, persists the fitted transform and
//! classifier as one artifact and reports its quality.
//!
//! # Modules
//!
//! ## Pipeline
//! - [`preprocessing`] - Age cleaning, feature partitioning, imputation, scaling, one-hot encoding
//! - [`training`] - Stratified split, decision trees, random forest, training pipeline
//! - [`export`] - Atomic, checksummed model artifacts
//! - [`evaluation`] - Confusion matrix, precision/recall/F1, ROC and PR curves
//!
//! ## Data
//! - [`utils`] - CSV loading
//! - [`storage`] - SQLite table persistence
//! - [`config`] - Pipeline configuration
//!
//! ## Services
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;

// Core ML modules
pub mod preprocessing;
pub mod training;
pub mod evaluation;
pub mod export;

// Data
pub mod storage;
pub mod utils;

// Services
pub mod server;
pub mod cli;

pub use error::{Result, SeroError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, SeroError};

    // Configuration
    pub use crate::config::{ForestConfig, PipelineConfig};

    // Preprocessing
    pub use crate::preprocessing::{Cleaner, FeatureSpec, FittedTransform, Preprocessor, Stage};

    // Training
    pub use crate::training::{
        BinaryClassifier, RandomForest, StratifiedSplitter, TrainingOutcome, TrainingPipeline,
        DECISION_THRESHOLD,
    };

    // Evaluation
    pub use crate::evaluation::{EvaluationReport, Evaluator};

    // Export
    pub use crate::export::{ModelArtifact, ModelMetadata};

    // Data
    pub use crate::storage::{IfExists, TableStore};
    pub use crate::utils::DataLoader;
}
