//! Model search, evaluation metrics and report output.

pub mod metrics;
pub mod pipeline;
pub mod runner;
pub mod search;
pub mod sweep;

pub use metrics::{ClassMetrics, ClassificationMetrics};
pub use pipeline::{FittedPipeline, LabelEncoding, Pipeline};
pub use runner::{ModelSummary, TrainingSummary, models_fit_and_result_output};
pub use search::{RandomizedSearch, SearchOutcome};
pub use sweep::{HyperparamSweep, ParamDistribution, SearchSpace, SweepTrial};
