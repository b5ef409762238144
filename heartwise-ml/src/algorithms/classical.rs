//! Classical classifier families and the estimator trait they implement.

use crate::algorithms::knn::{KNearestNeighbors, Weights};
use crate::algorithms::logistic::{LogisticRegression, Solver};
use crate::algorithms::svm::{Kernel, SupportVectorClassifier};
use crate::algorithms::tree::DecisionTree;
use crate::error::MlError;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A fitted-in-place classifier over dense feature matrices.
///
/// Labels are class indices in `0..n_classes`; `n_classes` is the width of
/// every probability row, even when a training fold lacks some classes.
pub trait Classifier: fmt::Debug + Send + Sync {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<(), MlError>;

    /// Per-class scores in `[0, 1]` summing to 1 for every row.
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, MlError>;

    /// Highest-scoring class per row; ties go to the lowest class index.
    fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<usize>, MlError> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (k, &p)| {
                        if p > best.1 { (k, p) } else { best }
                    })
                    .0
            })
            .collect())
    }
}

/// Check the shape agreement every `fit` needs.
pub(crate) fn check_fit_input(
    x: &ArrayView2<f64>,
    y: &[usize],
    n_classes: usize,
) -> Result<(), MlError> {
    if x.nrows() != y.len() {
        return Err(MlError::model(format!(
            "feature matrix has {} rows but {} labels were given",
            x.nrows(),
            y.len()
        )));
    }
    if x.nrows() == 0 {
        return Err(MlError::model("cannot fit on an empty training set"));
    }
    if let Some(bad) = y.iter().find(|&&c| c >= n_classes) {
        return Err(MlError::model(format!(
            "label index {bad} out of range for {n_classes} classes"
        )));
    }
    Ok(())
}

/// The four model families searched by the trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    LogisticRegression,
    DecisionTree,
    SupportVectorMachine,
    KNearestNeighbors,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 4] = [
        ModelFamily::LogisticRegression,
        ModelFamily::DecisionTree,
        ModelFamily::SupportVectorMachine,
        ModelFamily::KNearestNeighbors,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            ModelFamily::LogisticRegression => "Logistic Regression",
            ModelFamily::DecisionTree => "Decision Tree",
            ModelFamily::SupportVectorMachine => "Support Vector Machine",
            ModelFamily::KNearestNeighbors => "K-Nearest Neighbors",
        }
    }

    /// File name of this family's classification report.
    pub fn report_file_name(self) -> String {
        format!(
            "classification_report_{}.txt",
            self.display_name().replace(' ', "_")
        )
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A fully specified estimator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ClassicalAlgorithm {
    LogisticRegression {
        c: f64,
        solver: Solver,
        max_iter: usize,
    },
    DecisionTree {
        max_depth: Option<usize>,
        min_samples_split: usize,
    },
    Svm {
        c: f64,
        kernel: Kernel,
    },
    Knn {
        n_neighbors: usize,
        weights: Weights,
    },
}

impl ClassicalAlgorithm {
    pub fn family(&self) -> ModelFamily {
        match self {
            Self::LogisticRegression { .. } => ModelFamily::LogisticRegression,
            Self::DecisionTree { .. } => ModelFamily::DecisionTree,
            Self::Svm { .. } => ModelFamily::SupportVectorMachine,
            Self::Knn { .. } => ModelFamily::KNearestNeighbors,
        }
    }

    /// Library defaults for a family, before any search.
    pub fn default_for(family: ModelFamily, max_iter: usize) -> Self {
        match family {
            ModelFamily::LogisticRegression => Self::LogisticRegression {
                c: 1.0,
                solver: Solver::Lbfgs,
                max_iter,
            },
            ModelFamily::DecisionTree => Self::DecisionTree {
                max_depth: None,
                min_samples_split: 2,
            },
            ModelFamily::SupportVectorMachine => Self::Svm {
                c: 1.0,
                kernel: Kernel::Rbf,
            },
            ModelFamily::KNearestNeighbors => Self::Knn {
                n_neighbors: 5,
                weights: Weights::Uniform,
            },
        }
    }

    /// Apply sampled hyperparameters on top of the family defaults.
    pub fn with_params(
        family: ModelFamily,
        params: &BTreeMap<String, serde_json::Value>,
        max_iter: usize,
    ) -> Result<Self, MlError> {
        let mut algo = Self::default_for(family, max_iter);
        for (name, value) in params {
            algo.set_param(name, value)?;
        }
        Ok(algo)
    }

    fn set_param(&mut self, name: &str, value: &serde_json::Value) -> Result<(), MlError> {
        let bad = || MlError::config(format!("invalid value {value} for parameter '{name}'"));
        match (self, name) {
            (Self::LogisticRegression { c, .. }, "C") | (Self::Svm { c, .. }, "C") => {
                *c = value.as_f64().ok_or_else(bad)?;
            }
            (Self::LogisticRegression { solver, .. }, "solver") => {
                *solver = serde_json::from_value(value.clone()).map_err(|_| bad())?;
            }
            (Self::DecisionTree { max_depth, .. }, "max_depth") => {
                *max_depth = match value {
                    serde_json::Value::Null => None,
                    v => Some(v.as_u64().ok_or_else(bad)? as usize),
                };
            }
            (
                Self::DecisionTree {
                    min_samples_split, ..
                },
                "min_samples_split",
            ) => {
                *min_samples_split = value.as_u64().ok_or_else(bad)? as usize;
            }
            (Self::Svm { kernel, .. }, "kernel") => {
                *kernel = serde_json::from_value(value.clone()).map_err(|_| bad())?;
            }
            (Self::Knn { n_neighbors, .. }, "n_neighbors") => {
                *n_neighbors = value.as_u64().ok_or_else(bad)? as usize;
            }
            (Self::Knn { weights, .. }, "weights") => {
                *weights = serde_json::from_value(value.clone()).map_err(|_| bad())?;
            }
            (algo, _) => {
                return Err(MlError::config(format!(
                    "unknown parameter '{name}' for {}",
                    algo.family()
                )));
            }
        }
        Ok(())
    }

    /// Build an unfitted estimator.
    pub fn build(&self) -> Box<dyn Classifier> {
        match self {
            Self::LogisticRegression {
                c,
                solver,
                max_iter,
            } => Box::new(LogisticRegression::new(*c, *solver, *max_iter)),
            Self::DecisionTree {
                max_depth,
                min_samples_split,
            } => Box::new(DecisionTree::new(*max_depth, *min_samples_split)),
            Self::Svm { c, kernel } => Box::new(SupportVectorClassifier::new(*c, *kernel)),
            Self::Knn {
                n_neighbors,
                weights,
            } => Box::new(KNearestNeighbors::new(*n_neighbors, *weights)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_file_names() {
        assert_eq!(
            ModelFamily::LogisticRegression.report_file_name(),
            "classification_report_Logistic_Regression.txt"
        );
        assert_eq!(
            ModelFamily::KNearestNeighbors.report_file_name(),
            "classification_report_K-Nearest_Neighbors.txt"
        );
    }

    #[test]
    fn test_with_params() {
        let params = BTreeMap::from([
            ("C".to_string(), json!(0.5)),
            ("kernel".to_string(), json!("linear")),
        ]);
        let algo =
            ClassicalAlgorithm::with_params(ModelFamily::SupportVectorMachine, &params, 100)
                .unwrap();
        assert_eq!(
            algo,
            ClassicalAlgorithm::Svm {
                c: 0.5,
                kernel: Kernel::Linear
            }
        );
    }

    #[test]
    fn test_with_params_rejects_foreign_parameter() {
        let params = BTreeMap::from([("kernel".to_string(), json!("rbf"))]);
        assert!(ClassicalAlgorithm::with_params(ModelFamily::DecisionTree, &params, 100).is_err());
    }
}
