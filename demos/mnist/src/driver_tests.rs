//! End-to-end runs of the driver on synthetic digits

use indicatif::ProgressBar;
use vidar::{VidarConfig, VidarContext};

use crate::driver::{Features, synthetic_digits, train_and_score};

#[test]
fn synthetic_digits_are_split_and_zero_based() {
    let digits = synthetic_digits(3);
    assert_eq!(digits.train.labels.len(), digits.train.rows);
    assert_eq!(digits.test.labels.len(), digits.test.rows);
    assert!(digits.train.labels.iter().all(|l| *l < 10));
    match &digits.test.features {
        Features::Values(v) => assert_eq!(v.len(), digits.test.rows * digits.test.cols),
        Features::Pixels(_) => panic!("synthetic digits are real valued"),
    }
}

#[test]
fn pipeline_scores_synthetic_digits() {
    let digits = synthetic_digits(5);
    let bar = ProgressBar::hidden();

    let accuracy = VidarContext::scope_with(VidarConfig::default().with_threads(4), |ctx| {
        train_and_score(ctx, &digits, &bar)
    })
    .unwrap();

    assert!(accuracy > 90.0, "test accuracy {accuracy}");
    assert!(accuracy <= 100.0);
}
