//! End-to-end training pipeline

use super::models::TrainingMetrics;
use super::random_forest::RandomForest;
use super::split::StratifiedSplitter;
use super::binary_labels;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::evaluation::{EvaluationReport, Evaluator};
use crate::export::{ModelArtifact, ModelMetadata};
use crate::preprocessing::{AgeCorrection, Cleaner, FeatureSpec, Preprocessor, Stage};
use polars::prelude::DataFrame;
use std::time::Instant;
use tracing::info;

/// Everything a training run produces
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    /// Table after age cleaning, before the split
    pub cleaned: DataFrame,
    pub train: DataFrame,
    pub test: DataFrame,
    pub metrics: TrainingMetrics,
    /// Held-out evaluation of the fitted artifact
    pub report: EvaluationReport,
}

/// Clean, partition, split, fit the transform and the forest, then evaluate
#[derive(Debug, Clone)]
pub struct TrainingPipeline {
    config: PipelineConfig,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Train on `df` without touching the filesystem
    pub fn fit(&self, df: &DataFrame) -> Result<TrainingOutcome> {
        self.config.validate()?;
        let start = Instant::now();
        let target = self.config.target_column.as_str();

        let cleaner = Cleaner::new(&self.config.age_column);
        let (age_median, cleaned) = cleaner.fit_apply(df)?;
        info!(column = %cleaner.age_column(), median = age_median, "Cleaned age column");
        let spec = FeatureSpec::partition(&cleaned, target, self.config.numeric_features.as_slice())?;

        let splitter = StratifiedSplitter::new(self.config.test_fraction)
            .with_random_state(self.config.seed);
        let (train, test) = splitter.split_frame(&cleaned, target)?;

        let (transform, x_train) = Preprocessor::new(spec).fit_apply(&train)?;
        let y_train = binary_labels(&train, target)?;

        let mut forest = RandomForest::from_config(&self.config.forest, self.config.seed);
        forest.fit(&x_train, &y_train)?;

        let train_pred = forest.predict(&x_train)?;
        let metrics = TrainingMetrics {
            train_accuracy: TrainingMetrics::accuracy(&y_train, &train_pred),
            n_train: train.height(),
            n_test: test.height(),
            n_train_positive: y_train.iter().filter(|&&y| y == 1).count(),
            training_time_secs: start.elapsed().as_secs_f64(),
        };

        let metadata = ModelMetadata::new("random_forest")
            .with_transform(&transform)
            .with_forest(&forest)
            .with_metrics(metrics.clone());
        let artifact = ModelArtifact::new(metadata, transform, forest)
            .with_age_correction(AgeCorrection::new(cleaner.age_column(), age_median));

        let report = Evaluator::new().run_on_table(&artifact, &test)?;

        info!(
            n_train = metrics.n_train,
            n_test = metrics.n_test,
            features = artifact.transform().n_output_features(),
            train_accuracy = metrics.train_accuracy,
            test_accuracy = report.accuracy,
            elapsed_secs = metrics.training_time_secs,
            "Training pipeline complete"
        );

        Ok(TrainingOutcome {
            artifact,
            cleaned,
            train,
            test,
            metrics,
            report,
        })
    }

    /// Train on `df` and write the artifact to the configured model path
    pub fn run(&self, df: &DataFrame) -> Result<TrainingOutcome> {
        let outcome = self.fit(df)?;
        outcome.artifact.save(&self.config.model_path)?;
        info!(path = %self.config.model_path.display(), "Saved model artifact");
        Ok(outcome)
    }
}
