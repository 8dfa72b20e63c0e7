//! Fill statistics for missing values

use std::collections::BTreeMap;

/// Median of `values`. Even-length inputs average the two middle values.
///
/// Returns `None` for an empty slice. Non-finite values are ignored.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Most frequent value; ties resolve to the smallest value.
pub fn most_frequent<S: AsRef<str>>(values: &[S]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v.as_ref()).or_insert(0) += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        // BTreeMap iterates ascending, so strict > keeps the smallest on ties
        match best {
            Some((_, c)) if count <= c => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(v, _)| v.to_string())
}

/// Fill `None` entries with `fill`
pub(crate) fn fill_numeric(values: &[Option<f64>], fill: f64) -> Vec<f64> {
    values.iter().map(|v| v.unwrap_or(fill)).collect()
}
