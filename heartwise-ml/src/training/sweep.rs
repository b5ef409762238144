//! Hyperparameter search spaces and sweep records.

use crate::algorithms::ModelFamily;
use crate::config::Scoring;
use crate::data::table::format_float;
use crate::error::MlError;
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Sampled parameter values keyed by parameter name.
pub type ParamSet = BTreeMap<String, Value>;

/// Parameter distribution for random search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamDistribution {
    /// `exp(U(ln min, ln max))`; both bounds must be positive.
    LogUniform { min: f64, max: f64 },
    Choice { values: Vec<Value> },
    /// Integers in `[min, max)`.
    IntRange { min: i64, max: i64 },
}

impl ParamDistribution {
    fn choice<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        Self::Choice {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Draw one value.
    pub fn sample(&self, rng: &mut StdRng) -> Result<Value, MlError> {
        match self {
            Self::LogUniform { min, max } if *min > 0.0 && min < max => {
                let exponent = rng.gen_range(min.ln()..max.ln());
                Ok(Value::from(exponent.exp()))
            }
            Self::Choice { values } if !values.is_empty() => {
                Ok(values[rng.gen_range(0..values.len())].clone())
            }
            Self::IntRange { min, max } if min < max => Ok(Value::from(rng.gen_range(*min..*max))),
            other => Err(MlError::config(format!("empty distribution {other:?}"))),
        }
    }
}

/// Distributions for every tuned parameter of one model family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub params: BTreeMap<String, ParamDistribution>,
}

impl SearchSpace {
    /// The default space searched for `family`.
    pub fn for_family(family: ModelFamily) -> Self {
        let params = match family {
            ModelFamily::LogisticRegression => BTreeMap::from([
                ("C".to_string(), ParamDistribution::LogUniform { min: 1e-3, max: 1e3 }),
                (
                    "solver".to_string(),
                    ParamDistribution::choice(["liblinear", "lbfgs"]),
                ),
            ]),
            ModelFamily::DecisionTree => BTreeMap::from([
                ("max_depth".to_string(), ParamDistribution::choice([3, 5, 10])),
                (
                    "min_samples_split".to_string(),
                    ParamDistribution::IntRange { min: 2, max: 20 },
                ),
            ]),
            ModelFamily::SupportVectorMachine => BTreeMap::from([
                ("C".to_string(), ParamDistribution::LogUniform { min: 1e-2, max: 1e2 }),
                ("kernel".to_string(), ParamDistribution::choice(["linear", "rbf"])),
            ]),
            ModelFamily::KNearestNeighbors => BTreeMap::from([
                (
                    "n_neighbors".to_string(),
                    ParamDistribution::IntRange { min: 3, max: 20 },
                ),
                (
                    "weights".to_string(),
                    ParamDistribution::choice(["uniform", "distance"]),
                ),
            ]),
        };
        Self { params }
    }

    /// Draw one candidate, parameters in name order.
    pub fn sample(&self, rng: &mut StdRng) -> Result<ParamSet, MlError> {
        self.params
            .iter()
            .map(|(name, dist)| Ok((name.clone(), dist.sample(rng)?)))
            .collect()
    }

    /// Draw `n` candidates from one generator.
    pub fn sample_n(&self, n: usize, rng: &mut StdRng) -> Result<Vec<ParamSet>, MlError> {
        (0..n).map(|_| self.sample(rng)).collect()
    }
}

/// Render parameters as `{'C': 0.5, 'solver': 'lbfgs'}`.
pub fn format_params(params: &ParamSet) -> String {
    let body: Vec<String> = params
        .iter()
        .map(|(name, value)| {
            let rendered = match value {
                Value::String(s) => format!("'{s}'"),
                Value::Null => "None".to_string(),
                Value::Number(n) if n.is_f64() => n.as_f64().map(format_float).unwrap_or_default(),
                other => other.to_string(),
            };
            format!("'{name}': {rendered}")
        })
        .collect();
    format!("{{{}}}", body.join(", "))
}

/// Outcome of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Completed,
    Failed,
}

/// A single sweep trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepTrial {
    pub trial_number: usize,
    pub params: ParamSet,
    pub fold_scores: Vec<f64>,
    /// Mean cross-validated score; `None` when any fold failed.
    pub metric: Option<f64>,
    pub status: TrialStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A randomized search over one family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperparamSweep {
    pub family: ModelFamily,
    pub scoring: Scoring,
    pub seed: u64,
    pub space: SearchSpace,
    pub trials: Vec<SweepTrial>,
    pub best_trial: Option<usize>,
}

impl HyperparamSweep {
    pub fn new(family: ModelFamily, scoring: Scoring, seed: u64) -> Self {
        Self {
            family,
            scoring,
            seed,
            space: SearchSpace::for_family(family),
            trials: Vec::new(),
            best_trial: None,
        }
    }

    /// Append a trial and update the best one. Earlier trials win ties.
    pub fn record(&mut self, trial: SweepTrial) {
        let index = self.trials.len();
        let beats = match (trial.metric, self.best()) {
            (Some(score), Some(best)) => best.metric.is_none_or(|b| score > b),
            (Some(_), None) => true,
            (None, _) => false,
        };
        self.trials.push(trial);
        if beats {
            self.best_trial = Some(index);
        }
    }

    pub fn best(&self) -> Option<&SweepTrial> {
        self.best_trial.and_then(|i| self.trials.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;

    fn trial(n: usize, metric: Option<f64>) -> SweepTrial {
        SweepTrial {
            trial_number: n,
            params: ParamSet::new(),
            fold_scores: Vec::new(),
            metric,
            status: if metric.is_some() {
                TrialStatus::Completed
            } else {
                TrialStatus::Failed
            },
            error: None,
        }
    }

    #[test]
    fn test_samples_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(999);
        for family in ModelFamily::ALL {
            let space = SearchSpace::for_family(family);
            for params in space.sample_n(200, &mut rng).unwrap() {
                match family {
                    ModelFamily::LogisticRegression => {
                        let c = params["C"].as_f64().unwrap();
                        assert!((1e-3..=1e3).contains(&c));
                    }
                    ModelFamily::DecisionTree => {
                        let split = params["min_samples_split"].as_i64().unwrap();
                        assert!((2..20).contains(&split));
                        assert!([3, 5, 10].contains(&params["max_depth"].as_i64().unwrap()));
                    }
                    ModelFamily::SupportVectorMachine => {
                        let c = params["C"].as_f64().unwrap();
                        assert!((1e-2..=1e2).contains(&c));
                    }
                    ModelFamily::KNearestNeighbors => {
                        let k = params["n_neighbors"].as_i64().unwrap();
                        assert!((3..20).contains(&k));
                    }
                }
            }
        }
    }

    #[test]
    fn test_sampling_is_reproducible() {
        let space = SearchSpace::for_family(ModelFamily::LogisticRegression);
        let a = space.sample_n(10, &mut StdRng::seed_from_u64(999)).unwrap();
        let b = space.sample_n(10, &mut StdRng::seed_from_u64(999)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sampled_params_build_estimators() {
        let mut rng = StdRng::seed_from_u64(1);
        for family in ModelFamily::ALL {
            let params = SearchSpace::for_family(family).sample(&mut rng).unwrap();
            let algo = crate::algorithms::ClassicalAlgorithm::with_params(family, &params, 100).unwrap();
            assert_eq!(algo.family(), family);
        }
    }

    #[test]
    fn test_empty_distribution_is_error() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(ParamDistribution::Choice { values: vec![] }.sample(&mut rng).is_err());
        assert!(ParamDistribution::IntRange { min: 5, max: 5 }.sample(&mut rng).is_err());
        assert!(
            ParamDistribution::LogUniform { min: 0.0, max: 1.0 }
                .sample(&mut rng)
                .is_err()
        );
    }

    #[test]
    fn test_format_params() {
        let params = ParamSet::from([
            ("C".to_string(), Value::from(2.0)),
            ("solver".to_string(), Value::from("lbfgs")),
            ("max_depth".to_string(), Value::from(5)),
        ]);
        assert_eq!(format_params(&params), "{'C': 2.0, 'max_depth': 5, 'solver': 'lbfgs'}");
    }

    #[test]
    fn test_best_trial_first_wins_ties_and_skips_failures() {
        let mut sweep = HyperparamSweep::new(ModelFamily::DecisionTree, Scoring::Accuracy, 999);
        sweep.record(trial(0, None));
        assert!(sweep.best().is_none());
        sweep.record(trial(1, Some(0.8)));
        sweep.record(trial(2, Some(0.8)));
        sweep.record(trial(3, Some(0.7)));
        assert_eq!(sweep.best_trial, Some(1));
        sweep.record(trial(4, Some(0.9)));
        assert_eq!(sweep.best_trial, Some(4));
    }
}
