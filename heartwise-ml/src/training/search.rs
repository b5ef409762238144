//! Randomized hyperparameter search with cross-validation.

use crate::algorithms::{ClassicalAlgorithm, CrossValidation, CrossValidationResult, ModelFamily};
use crate::config::{Scoring, TrainingConfig};
use crate::data::table::Table;
use crate::error::MlError;
use crate::features::transforms::ColumnTransformer;
use crate::training::metrics::{accuracy_score, roc_auc_score};
use crate::training::pipeline::{FittedPipeline, Pipeline};
use crate::training::sweep::{HyperparamSweep, ParamSet, SweepTrial, TrialStatus};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Sample `n_iter` candidates for one family, score each by stratified
/// k-fold, and refit the best on the whole training set.
#[derive(Debug, Clone)]
pub struct RandomizedSearch {
    pub family: ModelFamily,
    pub n_iter: usize,
    pub cv: CrossValidation,
    pub scoring: Scoring,
    pub seed: u64,
    pub max_iter: usize,
}

/// The finished search and its refit winner.
#[derive(Debug)]
pub struct SearchOutcome {
    pub sweep: HyperparamSweep,
    pub best_params: ParamSet,
    pub best_score: f64,
    pub best_pipeline: FittedPipeline,
}

impl RandomizedSearch {
    pub fn new(family: ModelFamily, config: &TrainingConfig) -> Self {
        Self {
            family,
            n_iter: config.n_iter,
            cv: CrossValidation::stratified(config.cv_folds),
            scoring: config.scoring,
            seed: config.seed,
            max_iter: config.max_iter,
        }
    }

    /// Score one fitted fold.
    fn score(&self, fitted: &FittedPipeline, x: &Table, y: &[usize]) -> Result<f64, MlError> {
        match self.scoring {
            Scoring::Accuracy => Ok(accuracy_score(y, &fitted.predict(x)?)),
            Scoring::RocAuc => roc_auc_score(y, &fitted.predict_proba(x)?),
        }
    }

    fn evaluate(
        &self,
        pipeline: &Pipeline,
        x: &Table,
        y: &[usize],
        n_classes: usize,
    ) -> Result<CrossValidationResult, MlError> {
        let folds = self.cv.split(y)?;
        let mut scores = Vec::with_capacity(folds.len());
        for fold in &folds {
            let y_train: Vec<usize> = fold.train.iter().map(|&i| y[i]).collect();
            let y_test: Vec<usize> = fold.test.iter().map(|&i| y[i]).collect();
            let fitted = pipeline.fit(&x.take_rows(&fold.train), &y_train, n_classes)?;
            scores.push(self.score(&fitted, &x.take_rows(&fold.test), &y_test)?);
        }
        Ok(CrossValidationResult::from_scores(scores, scoring_name(self.scoring)))
    }

    /// Run the search. A candidate that fails on any fold is recorded as
    /// failed; the search fails only when every candidate does.
    pub fn fit(
        &self,
        transformer: Option<&ColumnTransformer>,
        x: &Table,
        y: &[usize],
        n_classes: usize,
    ) -> Result<SearchOutcome, MlError> {
        if x.row_count() != y.len() {
            return Err(MlError::training(format!(
                "{} feature rows but {} labels",
                x.row_count(),
                y.len()
            )));
        }
        let _span = tracing::info_span!("search", family = %self.family).entered();

        let mut sweep = HyperparamSweep::new(self.family, self.scoring, self.seed);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let candidates = sweep.space.sample_n(self.n_iter, &mut rng)?;
        let mut last_error = None;

        for (trial_number, params) in candidates.into_iter().enumerate() {
            let result = ClassicalAlgorithm::with_params(self.family, &params, self.max_iter)
                .and_then(|algorithm| {
                    let pipeline = Pipeline::new(transformer.cloned(), algorithm);
                    self.evaluate(&pipeline, x, y, n_classes)
                });
            let trial = match result {
                Ok(cv) => {
                    tracing::debug!(trial = trial_number, score = cv.mean_score, "Candidate scored");
                    SweepTrial {
                        trial_number,
                        params,
                        metric: Some(cv.mean_score).filter(|s| !s.is_nan()),
                        fold_scores: cv.fold_scores,
                        status: TrialStatus::Completed,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(trial = trial_number, error = %e, "Candidate failed; scored as NaN");
                    let message = e.to_string();
                    last_error = Some(e);
                    SweepTrial {
                        trial_number,
                        params,
                        fold_scores: Vec::new(),
                        metric: None,
                        status: TrialStatus::Failed,
                        error: Some(message),
                    }
                }
            };
            sweep.record(trial);
        }

        let (best_params, best_score) = match sweep.best() {
            Some(best) => (best.params.clone(), best.metric.unwrap_or(f64::NAN)),
            None => {
                let cause = last_error.map(|e| e.to_string()).unwrap_or_default();
                return Err(MlError::training(format!(
                    "all {} candidates failed for {}: {cause}",
                    self.n_iter, self.family
                )));
            }
        };

        let algorithm = ClassicalAlgorithm::with_params(self.family, &best_params, self.max_iter)?;
        let best_pipeline = Pipeline::new(transformer.cloned(), algorithm).fit(x, y, n_classes)?;
        tracing::info!(score = best_score, "Refit best candidate on full training set");

        Ok(SearchOutcome {
            sweep,
            best_params,
            best_score,
            best_pipeline,
        })
    }
}

fn scoring_name(scoring: Scoring) -> &'static str {
    match scoring {
        Scoring::Accuracy => "accuracy",
        Scoring::RocAuc => "roc_auc",
    }
}
