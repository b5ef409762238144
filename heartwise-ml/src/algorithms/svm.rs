//! C-support vector classifier trained with SMO.
//!
//! Multi-class problems are decomposed one-vs-one. Per-class scores come from
//! pairwise votes plus a bounded confidence term, normalized with a softmax.

use crate::algorithms::classical::{Classifier, check_fit_input};
use crate::error::MlError;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kernel {
    Linear,
    /// Gaussian kernel with `gamma = 1 / (n_features * Var(X))`.
    Rbf,
}

const TOLERANCE: f64 = 1e-3;
const TAU: f64 = 1e-12;

/// Decision function separating class `first` (positive) from `second`.
#[derive(Debug, Clone)]
struct PairModel {
    first: usize,
    second: usize,
    /// `(training row, alpha_i * y_i)` for each support vector.
    support: Vec<(usize, f64)>,
    rho: f64,
}

#[derive(Debug, Clone)]
pub struct SupportVectorClassifier {
    pub c: f64,
    pub kernel: Kernel,
    gamma: f64,
    x: Array2<f64>,
    pairs: Vec<PairModel>,
    n_classes: usize,
}

impl SupportVectorClassifier {
    pub fn new(c: f64, kernel: Kernel) -> Self {
        Self {
            c,
            kernel,
            gamma: 1.0,
            x: Array2::zeros((0, 0)),
            pairs: Vec::new(),
            n_classes: 0,
        }
    }

    fn k(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self.kernel {
            Kernel::Linear => a.dot(&b),
            Kernel::Rbf => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(u, v)| (u - v).powi(2)).sum();
                (-self.gamma * sq).exp()
            }
        }
    }

    /// Solve the dual for rows `idx` with labels `+1`/`-1` in `sign`.
    fn solve_pair(&self, idx: &[usize], sign: &[f64]) -> (Vec<(usize, f64)>, f64) {
        let n = idx.len();
        let mut kernel = Array2::zeros((n, n));
        for a in 0..n {
            for b in a..n {
                let v = self.k(self.x.row(idx[a]), self.x.row(idx[b]));
                kernel[[a, b]] = v;
                kernel[[b, a]] = v;
            }
        }

        let c = self.c;
        let mut alpha = vec![0.0; n];
        let mut grad = vec![-1.0; n];
        let upper = |a: f64| a >= c;
        let lower = |a: f64| a <= 0.0;
        let max_iter = (100 * n).max(10_000);

        let mut iterations = 0;
        while iterations < max_iter {
            iterations += 1;

            // Working set: maximal violator i, then second-order choice of j.
            let mut gmax = f64::NEG_INFINITY;
            let mut i_sel = None;
            for t in 0..n {
                let candidate = if sign[t] > 0.0 {
                    (!upper(alpha[t])).then_some(-grad[t])
                } else {
                    (!lower(alpha[t])).then_some(grad[t])
                };
                if let Some(v) = candidate.filter(|&v| v >= gmax) {
                    gmax = v;
                    i_sel = Some(t);
                }
            }
            let Some(i) = i_sel else { break };

            let mut gmax2 = f64::NEG_INFINITY;
            let mut obj_min = f64::INFINITY;
            let mut j_sel = None;
            for t in 0..n {
                let (eligible, grad_diff, bound) = if sign[t] > 0.0 {
                    (!lower(alpha[t]), gmax + grad[t], grad[t])
                } else {
                    (!upper(alpha[t]), gmax - grad[t], -grad[t])
                };
                if !eligible {
                    continue;
                }
                gmax2 = gmax2.max(bound);
                if grad_diff > 0.0 {
                    let quad = kernel[[i, i]] + kernel[[t, t]] - 2.0 * kernel[[i, t]];
                    let obj = -(grad_diff * grad_diff) / if quad > 0.0 { quad } else { TAU };
                    if obj <= obj_min {
                        obj_min = obj;
                        j_sel = Some(t);
                    }
                }
            }
            let Some(j) = j_sel else { break };
            if gmax + gmax2 < TOLERANCE {
                break;
            }

            let q_ij = sign[i] * sign[j] * kernel[[i, j]];
            let (old_i, old_j) = (alpha[i], alpha[j]);
            if sign[i] != sign[j] {
                let quad = kernel[[i, i]] + kernel[[j, j]] + 2.0 * q_ij;
                let delta = (-grad[i] - grad[j]) / if quad > 0.0 { quad } else { TAU };
                let diff = alpha[i] - alpha[j];
                alpha[i] += delta;
                alpha[j] += delta;
                if diff > 0.0 {
                    if alpha[j] < 0.0 {
                        alpha[j] = 0.0;
                        alpha[i] = diff;
                    }
                } else if alpha[i] < 0.0 {
                    alpha[i] = 0.0;
                    alpha[j] = -diff;
                }
                if diff > 0.0 {
                    if alpha[i] > c {
                        alpha[i] = c;
                        alpha[j] = c - diff;
                    }
                } else if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = c + diff;
                }
            } else {
                let quad = kernel[[i, i]] + kernel[[j, j]] - 2.0 * q_ij;
                let delta = (grad[i] - grad[j]) / if quad > 0.0 { quad } else { TAU };
                let sum = alpha[i] + alpha[j];
                alpha[i] -= delta;
                alpha[j] += delta;
                if sum > c {
                    if alpha[i] > c {
                        alpha[i] = c;
                        alpha[j] = sum - c;
                    }
                } else if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = sum;
                }
                if sum > c {
                    if alpha[j] > c {
                        alpha[j] = c;
                        alpha[i] = sum - c;
                    }
                } else if alpha[i] < 0.0 {
                    alpha[i] = 0.0;
                    alpha[j] = sum;
                }
            }

            let (d_i, d_j) = (alpha[i] - old_i, alpha[j] - old_j);
            for t in 0..n {
                grad[t] += sign[i] * sign[t] * kernel[[i, t]] * d_i
                    + sign[j] * sign[t] * kernel[[j, t]] * d_j;
            }
        }
        if iterations >= max_iter {
            tracing::warn!(max_iter, "SMO reached the iteration cap before converging");
        }

        // Offset from free vectors, or the midpoint of the feasible range.
        let (mut ub, mut lb) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut free, mut free_sum) = (0usize, 0.0);
        for t in 0..n {
            let yg = sign[t] * grad[t];
            if upper(alpha[t]) {
                if sign[t] < 0.0 { ub = ub.min(yg) } else { lb = lb.max(yg) }
            } else if lower(alpha[t]) {
                if sign[t] > 0.0 { ub = ub.min(yg) } else { lb = lb.max(yg) }
            } else {
                free += 1;
                free_sum += yg;
            }
        }
        let rho = if free > 0 { free_sum / free as f64 } else { (ub + lb) / 2.0 };

        let support = (0..n)
            .filter(|&t| alpha[t] > 0.0)
            .map(|t| (idx[t], alpha[t] * sign[t]))
            .collect();
        (support, rho)
    }

    fn decision(&self, pair: &PairModel, row: ArrayView1<f64>) -> f64 {
        pair.support
            .iter()
            .map(|&(sv, coef)| coef * self.k(self.x.row(sv), row))
            .sum::<f64>()
            - pair.rho
    }
}

impl Classifier for SupportVectorClassifier {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<(), MlError> {
        check_fit_input(&x, y, n_classes)?;
        if self.c <= 0.0 || !self.c.is_finite() {
            return Err(MlError::model(format!(
                "C must be a positive finite number, got {}",
                self.c
            )));
        }
        let mut present: Vec<usize> = y.to_vec();
        present.sort_unstable();
        present.dedup();
        if present.len() < 2 {
            return Err(MlError::model(
                "support vector classifier needs samples of at least 2 classes",
            ));
        }

        self.x = x.to_owned();
        self.n_classes = n_classes;
        self.gamma = {
            let var = x.var(0.0);
            if var > 0.0 { 1.0 / (x.ncols() as f64 * var) } else { 1.0 }
        };

        let mut pairs = Vec::new();
        for (a, &first) in present.iter().enumerate() {
            for &second in &present[a + 1..] {
                let idx: Vec<usize> = (0..y.len())
                    .filter(|&i| y[i] == first || y[i] == second)
                    .collect();
                let sign: Vec<f64> = idx
                    .iter()
                    .map(|&i| if y[i] == first { 1.0 } else { -1.0 })
                    .collect();
                let (support, rho) = self.solve_pair(&idx, &sign);
                pairs.push(PairModel {
                    first,
                    second,
                    support,
                    rho,
                });
            }
        }
        tracing::trace!(
            pairs = pairs.len(),
            support_vectors = pairs.iter().map(|p| p.support.len()).sum::<usize>(),
            "SVM fitted"
        );
        self.pairs = pairs;
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, MlError> {
        if self.pairs.is_empty() {
            return Err(MlError::model("support vector classifier is not fitted"));
        }
        if x.ncols() != self.x.ncols() {
            return Err(MlError::model(format!(
                "expected {} features, got {}",
                self.x.ncols(),
                x.ncols()
            )));
        }
        let mut out = Array2::zeros((x.nrows(), self.n_classes));
        for (r, row) in x.rows().into_iter().enumerate() {
            let mut votes = vec![0.0; self.n_classes];
            let mut confidence = vec![0.0; self.n_classes];
            for pair in &self.pairs {
                let f = self.decision(pair, row);
                if f > 0.0 {
                    votes[pair.first] += 1.0;
                } else {
                    votes[pair.second] += 1.0;
                }
                confidence[pair.first] += f;
                confidence[pair.second] -= f;
            }
            // Confidence is squashed into (-1/3, 1/3) so it only breaks vote ties.
            let scores: Vec<f64> = votes
                .iter()
                .zip(&confidence)
                .map(|(v, c)| v + c / (3.0 * (c.abs() + 1.0)))
                .collect();
            let max = scores.iter().fold(f64::NEG_INFINITY, |m, &s| m.max(s));
            let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
            let total: f64 = exp.iter().sum();
            for (k, e) in exp.into_iter().enumerate() {
                out[[r, k]] = e / total;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_separable() {
        let x = array![[0.0, 0.0], [0.5, 0.2], [0.2, 0.6], [3.0, 3.0], [3.5, 2.8], [2.9, 3.6]];
        let y = [0, 0, 0, 1, 1, 1];
        let mut svm = SupportVectorClassifier::new(1.0, Kernel::Linear);
        svm.fit(x.view(), &y, 2).unwrap();
        assert_eq!(svm.predict(x.view()).unwrap(), y.to_vec());
        assert_eq!(svm.predict(array![[-1.0, -1.0], [4.0, 4.0]].view()).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_rbf_handles_ring() {
        let x = array![
            [0.0, 0.0],
            [0.1, -0.1],
            [-0.1, 0.1],
            [2.0, 0.0],
            [-2.0, 0.0],
            [0.0, 2.0],
            [0.0, -2.0]
        ];
        let y = [0, 0, 0, 1, 1, 1, 1];
        let mut svm = SupportVectorClassifier::new(10.0, Kernel::Rbf);
        svm.fit(x.view(), &y, 2).unwrap();
        assert_eq!(svm.predict(x.view()).unwrap(), y.to_vec());
    }

    #[test]
    fn test_three_classes_one_vs_one() {
        let x = array![[0.0], [0.2], [5.0], [5.2], [10.0], [10.2]];
        let y = [0, 0, 1, 1, 2, 2];
        let mut svm = SupportVectorClassifier::new(1.0, Kernel::Linear);
        svm.fit(x.view(), &y, 3).unwrap();
        assert_eq!(svm.pairs.len(), 3);
        assert_eq!(svm.predict(x.view()).unwrap(), y.to_vec());
        let proba = svm.predict_proba(x.view()).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }
}
