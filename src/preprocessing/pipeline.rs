//! Fit/apply feature transformer
//!
//! Numeric features are median-imputed then standardized; categorical
//! features are mode-imputed then one-hot encoded. The matrix produced by
//! [`FittedTransform::apply`] has numeric columns first, in declared order,
//! followed by one block per categorical feature.

use super::encoder::OneHotVocabulary;
use super::imputer::{self, fill_numeric};
use super::scaler::StandardParams;
use super::{categorical_values, numeric_values, FeatureSpec, Stage};
use crate::error::{Result, SeroError};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Fitted statistics of one numeric feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericFeature {
    pub name: String,
    pub median: f64,
    pub scaling: StandardParams,
}

/// Fitted statistics of one categorical feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalFeature {
    pub name: String,
    /// `None` when the training split held no values for this feature
    pub mode: Option<String>,
    pub vocabulary: OneHotVocabulary,
}

/// Statistics learned from the training split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTransform {
    spec: FeatureSpec,
    numeric: Vec<NumericFeature>,
    categorical: Vec<CategoricalFeature>,
}

impl FittedTransform {
    pub fn spec(&self) -> &FeatureSpec {
        &self.spec
    }

    pub fn numeric(&self) -> &[NumericFeature] {
        &self.numeric
    }

    pub fn categorical(&self) -> &[CategoricalFeature] {
        &self.categorical
    }

    /// Width of the transformed matrix
    pub fn n_output_features(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|c| c.vocabulary.len())
                .sum::<usize>()
    }

    /// Column labels of the transformed matrix
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.numeric.iter().map(|f| f.name.clone()).collect();
        for feature in &self.categorical {
            for category in feature.vocabulary.categories() {
                names.push(format!("{}_{}", feature.name, category));
            }
        }
        names
    }

    /// Map `rows` into the model's feature space.
    ///
    /// Pure with respect to the fitted statistics; extra columns are ignored.
    pub fn apply(&self, rows: &DataFrame) -> Result<Array2<f64>> {
        let missing = self.spec.missing_columns(rows);
        if !missing.is_empty() {
            return Err(SeroError::SchemaError(format!(
                "missing feature columns: {}",
                missing.join(", ")
            )));
        }

        let n_rows = rows.height();
        let mut out = Array2::<f64>::zeros((n_rows, self.n_output_features()));

        for (j, feature) in self.numeric.iter().enumerate() {
            let values = numeric_values(rows, &feature.name)?;
            for (i, v) in values.into_iter().enumerate() {
                out[[i, j]] = feature.scaling.scale(v.unwrap_or(feature.median));
            }
        }

        let mut offset = self.numeric.len();
        for feature in &self.categorical {
            let width = feature.vocabulary.len();
            if width == 0 {
                continue;
            }
            let values = categorical_values(rows, &feature.name)?;
            for (i, v) in values.iter().enumerate() {
                let value = v.as_deref().or(feature.mode.as_deref());
                if let Some(k) = feature.vocabulary.hot_index(value) {
                    out[[i, offset + k]] = 1.0;
                }
            }
            offset += width;
        }

        Ok(out)
    }
}

/// Learns a [`FittedTransform`] for a given feature partition
#[derive(Debug, Clone)]
pub struct Preprocessor {
    spec: FeatureSpec,
}

impl Preprocessor {
    pub fn new(spec: FeatureSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &FeatureSpec {
        &self.spec
    }

    fn fit_numeric(&self, df: &DataFrame, name: &str) -> Result<NumericFeature> {
        let values = numeric_values(df, name)?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();

        let median = match imputer::median(&present) {
            Some(m) => m,
            None => {
                warn!(feature = %name, "No training values; imputing with 0");
                0.0
            }
        };
        let imputed = fill_numeric(&values, median);
        let scaling = StandardParams::fit(&imputed);

        debug!(feature = %name, median, mean = scaling.mean, std = scaling.std, "Fitted numeric feature");
        Ok(NumericFeature {
            name: name.to_string(),
            median,
            scaling,
        })
    }

    fn fit_categorical(&self, df: &DataFrame, name: &str) -> Result<CategoricalFeature> {
        let values = categorical_values(df, name)?;
        let present: Vec<&str> = values.iter().flatten().map(|s| s.as_str()).collect();
        let mode = imputer::most_frequent(&present);

        // Imputed column only adds the mode, which is already present
        let vocabulary = OneHotVocabulary::fit(&present);
        if vocabulary.is_empty() {
            warn!(feature = %name, "No training values; feature encodes to nothing");
        }

        debug!(feature = %name, categories = vocabulary.len(), mode = ?mode, "Fitted categorical feature");
        Ok(CategoricalFeature {
            name: name.to_string(),
            mode,
            vocabulary,
        })
    }
}

impl Stage for Preprocessor {
    type State = FittedTransform;
    type Output = Array2<f64>;

    fn fit(&self, df: &DataFrame) -> Result<FittedTransform> {
        let missing = self.spec.missing_columns(df);
        if !missing.is_empty() {
            return Err(SeroError::SchemaError(format!(
                "missing feature columns: {}",
                missing.join(", ")
            )));
        }
        if df.height() == 0 {
            return Err(SeroError::InsufficientData(
                "cannot fit a transform on zero rows".to_string(),
            ));
        }

        let numeric = self
            .spec
            .numeric
            .iter()
            .map(|name| self.fit_numeric(df, name))
            .collect::<Result<Vec<_>>>()?;
        let categorical = self
            .spec
            .categorical
            .iter()
            .map(|name| self.fit_categorical(df, name))
            .collect::<Result<Vec<_>>>()?;

        let fitted = FittedTransform {
            spec: self.spec.clone(),
            numeric,
            categorical,
        };
        info!(
            rows = df.height(),
            numeric = fitted.numeric.len(),
            categorical = fitted.categorical.len(),
            output_features = fitted.n_output_features(),
            "Fitted preprocessing transform"
        );
        Ok(fitted)
    }

    fn apply(&self, state: &FittedTransform, df: &DataFrame) -> Result<Array2<f64>> {
        state.apply(df)
    }
}
