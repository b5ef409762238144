//! Classical classifiers and cross-validation.

pub mod classical;
pub mod evaluation;
pub mod knn;
pub mod logistic;
pub mod svm;
pub mod tree;

pub use classical::{ClassicalAlgorithm, Classifier, ModelFamily};
pub use evaluation::{CrossValidation, CrossValidationResult, Fold};
