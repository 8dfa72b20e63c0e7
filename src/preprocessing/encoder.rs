//! One-hot encoding over a fixed vocabulary

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sorted set of categories seen during fit.
///
/// Values outside the vocabulary encode as an all-zero block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OneHotVocabulary {
    categories: Vec<String>,
}

impl OneHotVocabulary {
    /// Build a vocabulary from the distinct values of `values`
    pub fn fit<S: AsRef<str>>(values: &[S]) -> Self {
        let distinct: BTreeSet<&str> = values.iter().map(|v| v.as_ref()).collect();
        Self {
            categories: distinct.into_iter().map(str::to_string).collect(),
        }
    }

    /// Width of the encoded block
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Position of `value` in the block, if known
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(value))
            .ok()
    }

    /// Hot position for `value`; `None` for missing or unseen values
    pub fn hot_index(&self, value: Option<&str>) -> Option<usize> {
        value.and_then(|v| self.index_of(v))
    }

    /// Dense one-hot block for `value`
    pub fn encode(&self, value: Option<&str>) -> Vec<f64> {
        let mut block = vec![0.0; self.len()];
        if let Some(idx) = self.hot_index(value) {
            block[idx] = 1.0;
        }
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_sorted_and_distinct() {
        let vocab = OneHotVocabulary::fit(&["Recife", "Olinda", "Recife", "Caruaru"]);
        assert_eq!(vocab.categories(), &["Caruaru", "Olinda", "Recife"]);
        assert_eq!(vocab.index_of("Olinda"), Some(1));
    }

    #[test]
    fn test_unknown_value_is_all_zero() {
        let vocab = OneHotVocabulary::fit(&["A", "B"]);
        assert_eq!(vocab.encode(Some("UNKNOWN_CITY")), vec![0.0, 0.0]);
        assert_eq!(vocab.encode(None), vec![0.0, 0.0]);
        assert_eq!(vocab.encode(Some("B")), vec![0.0, 1.0]);
    }
}
