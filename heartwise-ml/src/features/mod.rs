//! Feature preprocessing: column routing, imputation, scaling and encoding.

pub mod preprocess;
pub mod transforms;

pub use preprocess::{PreprocessOutput, PreprocessorArtifact, preprocess, split_features_label};
pub use transforms::{ColumnTransformer, FittedTransformer};
