//! Standard (z-score) scaling

use serde::{Deserialize, Serialize};

/// Fitted center and scale of one numeric feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardParams {
    pub mean: f64,
    /// Population standard deviation (ddof = 0)
    pub std: f64,
}

impl StandardParams {
    /// Learn mean and population std from already-imputed values
    pub fn fit(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self { mean: 0.0, std: 0.0 };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std: variance.sqrt(),
        }
    }

    /// `(x - mean) / std`; a zero-variance feature maps to 0
    #[inline]
    pub fn scale(&self, x: f64) -> f64 {
        if self.std > f64::EPSILON {
            (x - self.mean) / self.std
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_params() {
        let params = StandardParams::fit(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((params.mean - 3.0).abs() < 1e-12);
        assert!((params.std - 2.0_f64.sqrt()).abs() < 1e-12);
        assert!((params.scale(3.0)).abs() < 1e-12);
        assert!((params.scale(5.0) - 2.0 / 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column_scales_to_zero() {
        let params = StandardParams::fit(&[7.0, 7.0, 7.0]);
        assert_eq!(params.std, 0.0);
        assert_eq!(params.scale(7.0), 0.0);
        assert_eq!(params.scale(100.0), 0.0);
    }
}
