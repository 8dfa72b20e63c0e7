//! Data preprocessing module
//!
//! Provides the preprocessing half of the pipeline:
//! - Age cleaning (negative ages treated as missing, median fill)
//! - Numeric/categorical feature partitioning
//! - Median/mode imputation
//! - Standard scaling
//! - One-hot encoding with an ignore-unknown policy
//!
//! Every step follows the same two-phase contract, [`Stage`]: statistics are
//! learned once by `fit` and reused unchanged by `apply`.

mod cleaner;
mod encoder;
mod imputer;
mod pipeline;
mod scaler;

pub use cleaner::{AgeCorrection, Cleaner};
pub use encoder::OneHotVocabulary;
pub use imputer::{median, most_frequent};
pub use pipeline::{CategoricalFeature, FittedTransform, NumericFeature, Preprocessor};
pub use scaler::StandardParams;

use crate::error::{Result, SeroError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Two-phase fit/apply contract shared by the table stages.
///
/// `fit` learns a `State` from a table; `apply` maps any table through that
/// state without touching it. Applying never refits.
pub trait Stage {
    /// Statistics learned during fit
    type State;
    /// Result of applying the stage
    type Output;

    /// Learn the stage state from `df`
    fn fit(&self, df: &DataFrame) -> Result<Self::State>;

    /// Apply a previously fitted state to `df`
    fn apply(&self, state: &Self::State, df: &DataFrame) -> Result<Self::Output>;

    /// Fit on `df` and apply to the same rows
    fn fit_apply(&self, df: &DataFrame) -> Result<(Self::State, Self::Output)> {
        let state = self.fit(df)?;
        let output = self.apply(&state, df)?;
        Ok((state, output))
    }
}

/// Role assignment for every non-target column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Target column name
    pub target: String,
    /// Numeric features, in the order they were declared
    pub numeric: Vec<String>,
    /// Categorical features, in table order
    pub categorical: Vec<String>,
}

impl FeatureSpec {
    /// Partition the columns of `df` into numeric and categorical roles.
    ///
    /// Names in `known_numeric` become numeric; every other non-target column
    /// is categorical. Depends on column names only.
    pub fn partition<S: AsRef<str>>(df: &DataFrame, target: &str, known_numeric: &[S]) -> Result<Self> {
        let columns: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();

        if !columns.iter().any(|c| c == target) {
            return Err(SeroError::SchemaError(format!(
                "target column '{}' not found",
                target
            )));
        }

        let mut numeric = Vec::with_capacity(known_numeric.len());
        for name in known_numeric.iter().map(|s| s.as_ref()) {
            if name == target {
                return Err(SeroError::InvalidParameter {
                    name: "numeric_features".to_string(),
                    value: name.to_string(),
                    reason: "target cannot be a feature".to_string(),
                });
            }
            if !columns.iter().any(|c| c == name) {
                return Err(SeroError::SchemaError(format!(
                    "numeric column '{}' not found",
                    name
                )));
            }
            if !numeric.iter().any(|n: &String| n == name) {
                numeric.push(name.to_string());
            }
        }

        let categorical: Vec<String> = columns
            .into_iter()
            .filter(|c| c != target && !numeric.contains(c))
            .collect();

        Ok(Self {
            target: target.to_string(),
            numeric,
            categorical,
        })
    }

    /// All feature names, numeric first
    pub fn feature_names(&self) -> Vec<&str> {
        self.numeric
            .iter()
            .chain(self.categorical.iter())
            .map(|s| s.as_str())
            .collect()
    }

    /// Number of input features
    pub fn n_features(&self) -> usize {
        self.numeric.len() + self.categorical.len()
    }

    /// Feature columns the spec requires but `df` lacks
    pub fn missing_columns(&self, df: &DataFrame) -> Vec<String> {
        let present: HashSet<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        self.feature_names()
            .into_iter()
            .filter(|name| !present.contains(*name))
            .map(|s| s.to_string())
            .collect()
    }
}

pub(crate) fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn require_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    df.column(name)
        .map_err(|_| SeroError::SchemaError(format!("column '{}' not found", name)))
}

/// Read a column as floats. Nulls, NaN and unparseable text become `None`.
pub(crate) fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = require_column(df, name)?;
    let casted = column.cast(&DataType::Float64)?;
    let values = casted
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();
    Ok(values)
}

/// Read a column as category labels. Nulls and blank strings become `None`.
///
/// Integral floats render without a fractional part so a value read as
/// `1.0` and one read as `1` map to the same label.
pub(crate) fn categorical_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = require_column(df, name)?;
    let dtype = column.dtype().clone();

    let values: Vec<Option<String>> = match dtype {
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect(),
        DataType::Float32 | DataType::Float64 => {
            let casted = column.cast(&DataType::Float64)?;
            let values = casted
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()).map(format_category_number))
                .collect();
            values
        }
        ref dt if is_numeric_dtype(dt) => {
            let casted = column.cast(&DataType::Int64)?;
            let values = casted
                .i64()?
                .into_iter()
                .map(|v| v.map(|x| x.to_string()))
                .collect();
            values
        }
        DataType::Boolean => column
            .bool()?
            .into_iter()
            .map(|v| v.map(|b| b.to_string()))
            .collect(),
        _ => {
            let casted = column.cast(&DataType::String)?;
            let values = casted
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect();
            values
        }
    };

    Ok(values
        .into_iter()
        .map(|v| v.filter(|s| !s.trim().is_empty()))
        .collect())
}

pub(crate) fn format_category_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        x.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> DataFrame {
        df!(
            "AGE" => &[25.0, 31.0, 19.0],
            "CITY" => &["Recife", "Olinda", "Recife"],
            "NUM_PREGNANCIES" => &[1i64, 2, 0],
            "RACE" => &[1i64, 2, 1],
            "VDRL_RESULT" => &[0i64, 1, 0],
        )
        .unwrap()
    }

    #[test]
    fn test_partition_disjoint_and_complete() {
        let df = records();
        let spec = FeatureSpec::partition(&df, "VDRL_RESULT", &["AGE", "NUM_PREGNANCIES"]).unwrap();

        assert_eq!(spec.numeric, vec!["AGE", "NUM_PREGNANCIES"]);
        assert_eq!(spec.categorical, vec!["CITY", "RACE"]);

        let mut all: Vec<&str> = spec.feature_names();
        all.sort();
        let mut expected = vec!["AGE", "CITY", "NUM_PREGNANCIES", "RACE"];
        expected.sort();
        assert_eq!(all, expected);
        assert!(spec.numeric.iter().all(|n| !spec.categorical.contains(n)));
    }

    #[test]
    fn test_partition_is_deterministic() {
        let df = records();
        let a = FeatureSpec::partition(&df, "VDRL_RESULT", &["AGE"]).unwrap();
        let b = FeatureSpec::partition(&df, "VDRL_RESULT", &["AGE"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_partition_missing_target() {
        let df = records();
        let err = FeatureSpec::partition(&df, "OUTCOME", &["AGE"]).unwrap_err();
        assert!(matches!(err, SeroError::SchemaError(_)));
    }

    #[test]
    fn test_partition_missing_numeric() {
        let df = records();
        let err = FeatureSpec::partition(&df, "VDRL_RESULT", &["AGE", "NUM_ABORTIONS"]).unwrap_err();
        assert!(matches!(err, SeroError::SchemaError(_)));
    }

    #[test]
    fn test_partition_rejects_target_as_numeric() {
        let df = records();
        let err = FeatureSpec::partition(&df, "VDRL_RESULT", &["VDRL_RESULT"]).unwrap_err();
        assert!(matches!(err, SeroError::InvalidParameter { .. }));
    }

    #[test]
    fn test_categorical_values_integral_labels() {
        let df = df!(
            "a" => &[1.0, 2.5, 3.0],
            "b" => &[1i64, 2, 3],
        )
        .unwrap();
        let a = categorical_values(&df, "a").unwrap();
        let b = categorical_values(&df, "b").unwrap();
        assert_eq!(a, vec![Some("1".to_string()), Some("2.5".to_string()), Some("3".to_string())]);
        assert_eq!(b[0], a[0]);
    }

    #[test]
    fn test_numeric_values_text_becomes_missing() {
        let df = df!("x" => &["4", "n/a", "6"]).unwrap();
        let values = numeric_values(&df, "x").unwrap();
        assert_eq!(values, vec![Some(4.0), None, Some(6.0)]);
    }
}
