//! # heartwise-ml — heart-disease tabular pipeline
//!
//! Library half of the `heartwise` tool. Each stage takes its configuration
//! section explicitly and hands an owned table to the next:
//!
//! 1. **Combine** — read the per-site raw files into one named table
//! 2. **Validate** — file, schema, missingness, range and correlation checks
//! 3. **Clean** — drop known duplicates, cast columns, unify categorical levels
//! 4. **Split** — seeded train/test partition
//! 5. **Preprocess** — impute, scale and one-hot encode with a fitted transformer
//! 6. **Train** — randomized search over four classical model families,
//!    test-set evaluation and reports

// Foundation
pub mod config;
pub mod error;
pub mod persistence;

// Data stages
pub mod data;
pub mod features;

// Estimators and search
pub mod algorithms;
pub mod training;

// Re-exports
pub use config::{PipelineConfig, load_config};
pub use data::{Cell, Table};
pub use error::MlError;
pub use features::{ColumnTransformer, FittedTransformer, PreprocessorArtifact};
pub use training::{TrainingSummary, models_fit_and_result_output};
