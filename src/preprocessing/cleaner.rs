//! Age correction

use super::{imputer, numeric_values, Stage};
use crate::error::{Result, SeroError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Replaces negative or missing ages with the median of the valid ones.
#[derive(Debug, Clone)]
pub struct Cleaner {
    age_column: String,
}

impl Cleaner {
    pub fn new(age_column: impl Into<String>) -> Self {
        Self {
            age_column: age_column.into(),
        }
    }

    pub fn age_column(&self) -> &str {
        &self.age_column
    }

    /// Fit and apply in one call
    pub fn clean(&self, df: &DataFrame) -> Result<DataFrame> {
        let (_, cleaned) = self.fit_apply(df)?;
        Ok(cleaned)
    }

    fn valid_age(age: Option<f64>) -> Option<f64> {
        age.filter(|a| *a >= 0.0)
    }
}

/// Age median learned at training time, reapplied to rows being scored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeCorrection {
    pub column: String,
    pub median: f64,
}

impl AgeCorrection {
    pub fn new(column: impl Into<String>, median: f64) -> Self {
        Self {
            column: column.into(),
            median,
        }
    }

    /// Replace negative or missing ages with the stored median.
    /// Tables without the column pass through unchanged.
    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        if df.column(&self.column).is_err() {
            return Ok(df.clone());
        }
        Cleaner::new(self.column.as_str()).apply(&self.median, df)
    }
}

impl Stage for Cleaner {
    /// Median of the valid ages
    type State = f64;
    type Output = DataFrame;

    fn fit(&self, df: &DataFrame) -> Result<f64> {
        let ages = numeric_values(df, &self.age_column)?;
        let valid: Vec<f64> = ages.into_iter().filter_map(Self::valid_age).collect();

        let median = imputer::median(&valid).ok_or_else(|| {
            SeroError::InsufficientData(format!(
                "column '{}' has no non-negative values",
                self.age_column
            ))
        })?;
        debug!(column = %self.age_column, valid = valid.len(), median, "Fitted age median");
        Ok(median)
    }

    fn apply(&self, median: &f64, df: &DataFrame) -> Result<DataFrame> {
        let ages = numeric_values(df, &self.age_column)?;
        let replaced = ages.iter().filter(|a| Self::valid_age(**a).is_none()).count();
        let filled: Vec<f64> = ages
            .into_iter()
            .map(|a| Self::valid_age(a).unwrap_or(*median))
            .collect();

        let mut out = df.clone();
        out.with_column(Series::new(self.age_column.as_str().into(), filled))?;

        debug!(column = %self.age_column, replaced, median = *median, "Cleaned age column");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_age_replaced_with_median() {
        let df = df!(
            "AGE" => &[-1.0, 0.0, 5.0, 5.0, 40.0],
            "VDRL_RESULT" => &[0i64, 0, 1, 0, 1],
        )
        .unwrap();

        let cleaned = Cleaner::new("AGE").clean(&df).unwrap();
        let ages: Vec<f64> = cleaned
            .column("AGE")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(ages, vec![5.0, 0.0, 5.0, 5.0, 40.0]);
    }

    #[test]
    fn test_null_age_filled() {
        let df = df!("AGE" => &[Some(10.0), None, Some(30.0)]).unwrap();
        let cleaned = Cleaner::new("AGE").clean(&df).unwrap();
        let ages: Vec<f64> = cleaned.column("AGE").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(ages, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_input_not_mutated() {
        let df = df!("AGE" => &[-3i64, 20, 22]).unwrap();
        let _ = Cleaner::new("AGE").clean(&df).unwrap();
        let original: Vec<i64> = df.column("AGE").unwrap().i64().unwrap().into_no_null_iter().collect();
        assert_eq!(original, vec![-3, 20, 22]);
    }

    #[test]
    fn test_missing_column() {
        let df = df!("IDADE" => &[1.0]).unwrap();
        let err = Cleaner::new("AGE").clean(&df).unwrap_err();
        assert!(matches!(err, SeroError::SchemaError(_)));
    }

    #[test]
    fn test_correction_uses_stored_median() {
        let rows = df!("AGE" => &[Some(-1.0), None, Some(80.0), Some(90.0)]).unwrap();
        let corrected = AgeCorrection::new("AGE", 27.0).apply(&rows).unwrap();
        let ages: Vec<f64> = corrected.column("AGE").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(ages, vec![27.0, 27.0, 80.0, 90.0]);
    }

    #[test]
    fn test_correction_scores_single_invalid_row() {
        let rows = df!("AGE" => &[-1.0]).unwrap();
        let corrected = AgeCorrection::new("AGE", 31.0).apply(&rows).unwrap();
        assert_eq!(corrected.column("AGE").unwrap().f64().unwrap().get(0), Some(31.0));
    }

    #[test]
    fn test_correction_skips_tables_without_column() {
        let rows = df!("CITY" => &["Recife"]).unwrap();
        let out = AgeCorrection::new("AGE", 31.0).apply(&rows).unwrap();
        assert!(out.equals_missing(&rows));
    }

    #[test]
    fn test_all_ages_invalid() {
        let df = df!("AGE" => &[-1.0, -2.0]).unwrap();
        let err = Cleaner::new("AGE").clean(&df).unwrap_err();
        assert!(matches!(err, SeroError::InsufficientData(_)));
    }
}
