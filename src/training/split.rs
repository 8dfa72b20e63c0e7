//! Stratified train/test splitting

use super::binary_labels;
use crate::error::{Result, SeroError};
use ndarray::Array1;
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Disjoint train/test row indices, each in ascending order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Class-proportional holdout splitter
#[derive(Debug, Clone)]
pub struct StratifiedSplitter {
    test_fraction: f64,
    random_state: u64,
}

impl Default for StratifiedSplitter {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl StratifiedSplitter {
    pub fn new(test_fraction: f64) -> Self {
        Self {
            test_fraction,
            random_state: 42,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn test_fraction(&self) -> f64 {
        self.test_fraction
    }

    /// Split row indices so every class keeps its share in both parts.
    pub fn split(&self, labels: &Array1<u8>) -> Result<Split> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(SeroError::InvalidParameter {
                name: "test_fraction".to_string(),
                value: self.test_fraction.to_string(),
                reason: "must be in (0, 1)".to_string(),
            });
        }

        let n = labels.len();
        let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
        for (idx, &label) in labels.iter().enumerate() {
            by_class.entry(label).or_default().push(idx);
        }

        if let Some((class, members)) = by_class.iter().find(|(_, m)| m.len() < 2) {
            return Err(SeroError::InsufficientData(format!(
                "class {} has {} member(s); at least 2 are required",
                class,
                members.len()
            )));
        }

        let n_classes = by_class.len();
        let n_test = (self.test_fraction * n as f64).ceil() as usize;
        let n_train = n.saturating_sub(n_test);
        if n_test < n_classes || n_train < n_classes {
            return Err(SeroError::InsufficientData(format!(
                "{} rows give train={} test={}, fewer than the {} classes",
                n, n_train, n_test, n_classes
            )));
        }

        let counts: Vec<usize> = by_class.values().map(|m| m.len()).collect();
        let allocation = allocate(&counts, n_test, n);

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut train_indices = Vec::with_capacity(n_train);
        let mut test_indices = Vec::with_capacity(n_test);

        for ((class, members), &k) in by_class.iter().zip(allocation.iter()) {
            let mut shuffled = members.clone();
            shuffled.shuffle(&mut rng);
            test_indices.extend_from_slice(&shuffled[..k]);
            train_indices.extend_from_slice(&shuffled[k..]);
            debug!(class, total = members.len(), test = k, "Allocated class rows");
        }

        train_indices.sort_unstable();
        test_indices.sort_unstable();

        info!(
            rows = n,
            train = train_indices.len(),
            test = test_indices.len(),
            seed = self.random_state,
            "Stratified split"
        );
        Ok(Split {
            train_indices,
            test_indices,
        })
    }

    /// Split a table on its `target` column
    pub fn split_frame(&self, df: &DataFrame, target: &str) -> Result<(DataFrame, DataFrame)> {
        let labels = binary_labels(df, target)?;
        let split = self.split(&labels)?;
        Ok((take_rows(df, &split.train_indices)?, take_rows(df, &split.test_indices)?))
    }
}

/// Select rows of `df` by position
pub fn take_rows(df: &DataFrame, indices: &[usize]) -> Result<DataFrame> {
    let idx: Vec<IdxSize> = indices.iter().map(|&i| i as IdxSize).collect();
    let idx = IdxCa::from_vec("idx".into(), idx);
    Ok(df.take(&idx)?)
}

/// Largest-remainder allocation of `n_test` rows across classes of sizes
/// `counts`, each clamped to `[1, count - 1]`.
fn allocate(counts: &[usize], n_test: usize, n: usize) -> Vec<usize> {
    let exact: Vec<f64> = counts
        .iter()
        .map(|&c| n_test as f64 * c as f64 / n as f64)
        .collect();
    let mut alloc: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    let assigned: usize = alloc.iter().sum();
    for &c in order.iter().take(n_test.saturating_sub(assigned)) {
        alloc[c] += 1;
    }

    for (a, &c) in alloc.iter_mut().zip(counts) {
        *a = (*a).clamp(1, c - 1);
    }

    // Clamping can move the total; shift rows between classes to restore it
    loop {
        let total: usize = alloc.iter().sum();
        if total == n_test {
            break;
        }
        let candidate = if total > n_test {
            (0..counts.len())
                .filter(|&c| alloc[c] > 1)
                .max_by(|&a, &b| (alloc[a] as f64 - exact[a]).total_cmp(&(alloc[b] as f64 - exact[b])))
        } else {
            (0..counts.len())
                .filter(|&c| alloc[c] < counts[c] - 1)
                .min_by(|&a, &b| (alloc[a] as f64 - exact[a]).total_cmp(&(alloc[b] as f64 - exact[b])))
        };
        match candidate {
            Some(c) if total > n_test => alloc[c] -= 1,
            Some(c) => alloc[c] += 1,
            None => break,
        }
    }
    alloc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n_pos: usize, n_neg: usize) -> Array1<u8> {
        let mut v = vec![1u8; n_pos];
        v.extend(std::iter::repeat(0u8).take(n_neg));
        Array1::from_vec(v)
    }

    #[test]
    fn test_split_sizes_and_ratio() {
        let y = labels(10, 90);
        let split = StratifiedSplitter::new(0.2).split(&y).unwrap();

        assert_eq!(split.test_indices.len(), 20);
        assert_eq!(split.train_indices.len(), 80);
        let test_pos = split.test_indices.iter().filter(|&&i| y[i] == 1).count();
        assert_eq!(test_pos, 2);
    }

    #[test]
    fn test_split_disjoint_and_complete() {
        let y = labels(13, 37);
        let split = StratifiedSplitter::new(0.3).split(&y).unwrap();

        let mut all: Vec<usize> = split
            .train_indices
            .iter()
            .chain(split.test_indices.iter())
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_within_one_row_of_share() {
        let y = labels(7, 24);
        let split = StratifiedSplitter::new(0.25).split(&y).unwrap();
        let n_test = split.test_indices.len();
        let pos = split.test_indices.iter().filter(|&&i| y[i] == 1).count() as f64;
        let share = n_test as f64 * 7.0 / 31.0;
        assert!((pos - share).abs() < 1.0);
    }

    #[test]
    fn test_split_deterministic() {
        let y = labels(20, 30);
        let a = StratifiedSplitter::new(0.2).with_random_state(7).split(&y).unwrap();
        let b = StratifiedSplitter::new(0.2).with_random_state(7).split(&y).unwrap();
        let c = StratifiedSplitter::new(0.2).with_random_state(8).split(&y).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.test_indices, c.test_indices);
    }

    #[test]
    fn test_single_member_class_rejected() {
        let y = labels(1, 20);
        let err = StratifiedSplitter::new(0.2).split(&y).unwrap_err();
        assert!(matches!(err, SeroError::InsufficientData(_)));
    }

    #[test]
    fn test_tiny_test_set_rejected() {
        let y = labels(2, 2);
        let err = StratifiedSplitter::new(0.1).split(&y).unwrap_err();
        assert!(matches!(err, SeroError::InsufficientData(_)));
    }

    #[test]
    fn test_bad_fraction() {
        let y = labels(5, 5);
        let err = StratifiedSplitter::new(0.0).split(&y).unwrap_err();
        assert!(matches!(err, SeroError::InvalidParameter { .. }));
    }

    #[test]
    fn test_split_frame() {
        let df = df!(
            "AGE" => (0..20).map(|i| i as f64).collect::<Vec<_>>(),
            "VDRL_RESULT" => (0..20).map(|i| (i % 4 == 0) as i64).collect::<Vec<_>>(),
        )
        .unwrap();
        let (train, test) = StratifiedSplitter::new(0.2).split_frame(&df, "VDRL_RESULT").unwrap();
        assert_eq!(train.height(), 16);
        assert_eq!(test.height(), 4);
    }
}
