//! Error types for the heartwise-ml crate.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for pipeline operations.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Empty rows found.")]
    EmptyRows { rows: usize, missing_cells: usize },

    #[error("Cast error in column '{column}': cannot convert {value:?} to float")]
    Cast { column: String, value: String },

    #[error("{message}")]
    CorrelationThreshold {
        message: String,
        offenders: Vec<(String, f64)>,
    },

    #[error("Preprocessing error: {0}")]
    Preprocess(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MlError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn preprocess(msg: impl Into<String>) -> Self {
        Self::Preprocess(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error belongs to the hard tier that must abort a validation run.
    pub fn is_fatal_check(&self) -> bool {
        matches!(self, Self::CorrelationThreshold { .. })
    }
}
