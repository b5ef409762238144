//! Cross-validation folds and fold-score summaries.

use crate::error::MlError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Cross-validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidation {
    pub n_folds: usize,
    pub stratified: bool,
    pub shuffle: bool,
    pub random_state: Option<u64>,
}

impl Default for CrossValidation {
    fn default() -> Self {
        Self {
            n_folds: 5,
            stratified: true,
            shuffle: false,
            random_state: None,
        }
    }
}

/// Row positions of one fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl CrossValidation {
    pub fn stratified(n_folds: usize) -> Self {
        Self {
            n_folds,
            ..Self::default()
        }
    }

    /// Split `y.len()` samples into `n_folds` train/test partitions.
    ///
    /// Stratified folds keep every class spread evenly across folds; within a
    /// class, samples go to folds in contiguous runs of their original order
    /// unless `shuffle` is set.
    pub fn split(&self, y: &[usize]) -> Result<Vec<Fold>, MlError> {
        let n = y.len();
        if self.n_folds < 2 {
            return Err(MlError::config(format!(
                "cross-validation needs at least 2 folds, got {}",
                self.n_folds
            )));
        }
        if self.n_folds > n {
            return Err(MlError::training(format!(
                "cannot split {n} samples into {} folds",
                self.n_folds
            )));
        }

        let mut order: Vec<usize> = (0..n).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.random_state.unwrap_or(0));
            order.shuffle(&mut rng);
        }

        let assignment = if self.stratified {
            self.stratified_assignment(y, &order)?
        } else {
            self.plain_assignment(&order)
        };

        Ok((0..self.n_folds)
            .map(|k| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..n).partition(|&i| assignment[i] == k);
                Fold { train, test }
            })
            .collect())
    }

    fn plain_assignment(&self, order: &[usize]) -> Vec<usize> {
        let n = order.len();
        let mut assignment = vec![0; n];
        let mut start = 0;
        for k in 0..self.n_folds {
            let size = n / self.n_folds + usize::from(k < n % self.n_folds);
            for &i in &order[start..start + size] {
                assignment[i] = k;
            }
            start += size;
        }
        assignment
    }

    fn stratified_assignment(&self, y: &[usize], order: &[usize]) -> Result<Vec<usize>, MlError> {
        // Encode classes by first appearance in visiting order.
        let mut classes: Vec<usize> = Vec::new();
        let mut encoded = vec![0usize; y.len()];
        for &i in order {
            let code = match classes.iter().position(|&c| c == y[i]) {
                Some(code) => code,
                None => {
                    classes.push(y[i]);
                    classes.len() - 1
                }
            };
            encoded[i] = code;
        }

        let mut counts = vec![0usize; classes.len()];
        for &code in &encoded {
            counts[code] += 1;
        }
        if counts.iter().all(|&c| c < self.n_folds) {
            return Err(MlError::training(format!(
                "n_folds={} cannot be greater than the number of members in each class",
                self.n_folds
            )));
        }
        if let Some(min) = counts.iter().min().filter(|&&m| m < self.n_folds) {
            tracing::warn!(
                least_populated = min,
                n_folds = self.n_folds,
                "Least populated class has fewer members than folds"
            );
        }

        // Deal the sorted labels round-robin to get each fold's share per class.
        let mut sorted = encoded.clone();
        sorted.sort_unstable();
        let mut allocation = vec![vec![0usize; classes.len()]; self.n_folds];
        for (pos, &code) in sorted.iter().enumerate() {
            allocation[pos % self.n_folds][code] += 1;
        }

        let mut assignment = vec![0usize; y.len()];
        for code in 0..classes.len() {
            let mut folds = (0..self.n_folds)
                .flat_map(|k| std::iter::repeat_n(k, allocation[k][code]));
            for &i in order.iter().filter(|&&i| encoded[i] == code) {
                assignment[i] = folds.next().unwrap_or(self.n_folds - 1);
            }
        }
        Ok(assignment)
    }
}

/// Cross-validation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidationResult {
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
    pub metric_name: String,
}

impl CrossValidationResult {
    /// Summarize fold scores. A NaN fold makes the mean NaN.
    pub fn from_scores(scores: Vec<f64>, metric_name: &str) -> Self {
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
        Self {
            fold_scores: scores,
            mean_score: mean,
            std_score: variance.sqrt(),
            metric_name: metric_name.to_string(),
        }
    }
}
