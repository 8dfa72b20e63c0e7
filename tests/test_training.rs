//! Integration test: stratified split and random forest

use seroscreen::training::{
    binary_labels, BinaryClassifier, ClassWeight, MaxFeatures, RandomForest, StratifiedSplitter,
};
use seroscreen::SeroError;
use ndarray::{Array1, Array2};
use polars::prelude::*;

fn imbalanced_labels(n: usize, every: usize) -> Array1<u8> {
    Array1::from_iter((0..n).map(|i| u8::from(i % every == 0)))
}

/// Two well separated clusters; positives sit at high x0
fn separable(n: usize) -> (Array2<f64>, Array1<u8>) {
    let mut x = Array2::<f64>::zeros((n, 3));
    let mut y = Array1::<u8>::zeros(n);
    for i in 0..n {
        let positive = i % 4 == 0;
        let jitter = (i % 7) as f64 * 0.05;
        x[[i, 0]] = if positive { 3.0 + jitter } else { -3.0 - jitter };
        x[[i, 1]] = (i % 5) as f64;
        x[[i, 2]] = jitter;
        y[i] = u8::from(positive);
    }
    (x, y)
}

#[test]
fn test_split_sizes_and_disjointness() {
    let labels = imbalanced_labels(200, 10);
    let split = StratifiedSplitter::new(0.2).split(&labels).unwrap();

    assert_eq!(split.train_indices.len() + split.test_indices.len(), 200);
    assert_eq!(split.test_indices.len(), 40);
    assert!(split.test_indices.iter().all(|i| split.train_indices.binary_search(i).is_err()));
}

#[test]
fn test_split_preserves_class_ratio() {
    let labels = imbalanced_labels(500, 8);
    let split = StratifiedSplitter::new(0.2).with_random_state(7).split(&labels).unwrap();

    let ratio = |idx: &[usize]| {
        idx.iter().filter(|&&i| labels[i] == 1).count() as f64 / idx.len() as f64
    };
    let overall = labels.iter().filter(|&&y| y == 1).count() as f64 / labels.len() as f64;
    assert!((ratio(&split.test_indices) - overall).abs() < 0.02);
    assert!((ratio(&split.train_indices) - overall).abs() < 0.02);
}

#[test]
fn test_split_is_deterministic_for_a_seed() {
    let labels = imbalanced_labels(120, 6);
    let a = StratifiedSplitter::new(0.25).with_random_state(11).split(&labels).unwrap();
    let b = StratifiedSplitter::new(0.25).with_random_state(11).split(&labels).unwrap();
    assert_eq!(a.test_indices, b.test_indices);
}

#[test]
fn test_split_rejects_singleton_class() {
    let mut labels = Array1::<u8>::zeros(30);
    labels[4] = 1;
    let err = StratifiedSplitter::new(0.2).split(&labels).unwrap_err();
    assert!(matches!(err, SeroError::InsufficientData(_)));
}

#[test]
fn test_split_frame_keeps_columns() {
    let df = df!(
        "AGE" => (0..40).map(|i| i as f64).collect::<Vec<_>>(),
        "VDRL_RESULT" => (0..40).map(|i| i64::from(i % 4 == 0)).collect::<Vec<_>>()
    )
    .unwrap();
    let (train, test) = StratifiedSplitter::new(0.2).split_frame(&df, "VDRL_RESULT").unwrap();
    assert_eq!(train.height(), 32);
    assert_eq!(test.height(), 8);
    assert_eq!(train.width(), 2);

    let test_labels = binary_labels(&test, "VDRL_RESULT").unwrap();
    assert_eq!(test_labels.iter().filter(|&&y| y == 1).count(), 2);
}

#[test]
fn test_forest_separates_clusters() {
    let (x, y) = separable(120);
    let mut forest = RandomForest::new_classifier(25)
        .with_max_features(MaxFeatures::All)
        .with_random_state(3);
    forest.fit(&x, &y).unwrap();

    let predictions = forest.predict(&x).unwrap();
    assert_eq!(predictions, y);

    let proba = forest.predict_proba(&x).unwrap();
    assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn test_forest_is_deterministic_for_a_seed() {
    let (x, y) = separable(80);
    let fit = || {
        let mut forest = RandomForest::new_classifier(10)
            .with_max_features(MaxFeatures::All)
            .with_random_state(42);
        forest.fit(&x, &y).unwrap();
        forest.predict_proba(&x).unwrap()
    };
    assert_eq!(fit(), fit());
}

#[test]
fn test_balanced_weights_favor_the_minority_class() {
    let (x, y) = separable(100);
    let mut forest = RandomForest::new_classifier(5)
        .with_class_weight(ClassWeight::Balanced)
        .with_random_state(1);
    forest.fit(&x, &y).unwrap();

    let [w_neg, w_pos] = forest.class_weights();
    assert!(w_pos > w_neg);
}

#[test]
fn test_forest_through_trait_object() {
    let (x, y) = separable(60);
    let mut model: Box<dyn BinaryClassifier> = Box::new(RandomForest::new_classifier(8).with_random_state(5));
    model.fit(&x, &y).unwrap();
    assert_eq!(model.predict(&x).unwrap().len(), 60);
    assert!(model.feature_importances().is_some());
}

#[test]
fn test_predict_before_fit_fails() {
    let forest = RandomForest::new_classifier(3);
    let x = Array2::<f64>::zeros((2, 3));
    assert!(forest.predict_proba(&x).is_err());
}
