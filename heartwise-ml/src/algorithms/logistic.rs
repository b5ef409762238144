//! L2-regularized logistic regression.
//!
//! Minimizes `0.5 * ||w||^2 + C * sum(log_loss)` with an unpenalized
//! intercept. Two-class problems fit a single sigmoid. With more classes,
//! [`Solver::Liblinear`] fits one-vs-rest sigmoids and [`Solver::Lbfgs`]
//! fits a multinomial softmax. Both are optimized with L-BFGS.

use crate::algorithms::classical::{Classifier, check_fit_input};
use crate::error::MlError;
use ndarray::{Array1, Array2, ArrayView2, Axis, s};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Solver {
    /// One-vs-rest.
    Liblinear,
    /// Multinomial.
    Lbfgs,
}

const HISTORY: usize = 10;
const GRAD_TOL: f64 = 1e-5;

#[derive(Debug, Clone)]
pub struct LogisticRegression {
    pub c: f64,
    pub solver: Solver,
    pub max_iter: usize,
    /// One row per decision function: `[w_1 .. w_d, b]`.
    coef: Array2<f64>,
    n_classes: usize,
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `log(1 + exp(z))` without overflow.
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Append a column of ones for the intercept.
fn with_bias(x: &ArrayView2<f64>) -> Array2<f64> {
    let mut xb = Array2::ones((x.nrows(), x.ncols() + 1));
    xb.slice_mut(s![.., ..x.ncols()]).assign(x);
    xb
}

/// Minimize `f` from `x0` with limited-memory BFGS and an Armijo backtracking
/// line search. Returns the final point and whether the gradient tolerance
/// was reached.
fn lbfgs<F>(f: F, x0: Array1<f64>, max_iter: usize) -> (Array1<f64>, bool)
where
    F: Fn(&Array1<f64>) -> (f64, Array1<f64>),
{
    let mut x = x0;
    let (mut fx, mut g) = f(&x);
    let mut history: VecDeque<(Array1<f64>, Array1<f64>, f64)> = VecDeque::new();

    for _ in 0..max_iter {
        let g_norm = g.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        if g_norm < GRAD_TOL {
            return (x, true);
        }

        // Two-loop recursion for the search direction.
        let mut q = g.clone();
        let mut alphas = Vec::with_capacity(history.len());
        for (s, y, rho) in history.iter().rev() {
            let a = rho * s.dot(&q);
            q.scaled_add(-a, y);
            alphas.push(a);
        }
        let gamma = match history.back() {
            Some((s, y, _)) => s.dot(y) / y.dot(y),
            None => 1.0 / g.dot(&g).sqrt().max(1.0),
        };
        q *= gamma;
        for ((s, y, rho), a) in history.iter().zip(alphas.iter().rev()) {
            let b = rho * y.dot(&q);
            q.scaled_add(a - b, s);
        }
        let mut direction = -q;
        let mut slope = g.dot(&direction);
        if slope >= 0.0 {
            history.clear();
            direction = -&g;
            slope = g.dot(&direction);
        }

        let mut step = 1.0;
        let (x_new, f_new, g_new) = loop {
            let candidate = &x + &(&direction * step);
            let (fc, gc) = f(&candidate);
            if fc <= fx + 1e-4 * step * slope {
                break (candidate, fc, gc);
            }
            step *= 0.5;
            if step < 1e-12 {
                return (x, false);
            }
        };

        let s = &x_new - &x;
        let y = &g_new - &g;
        let sy = s.dot(&y);
        if sy > 1e-10 {
            history.push_back((s, y, 1.0 / sy));
            if history.len() > HISTORY {
                history.pop_front();
            }
        }

        let converged = (fx - f_new).abs() <= 1e-12 * fx.abs().max(1.0);
        x = x_new;
        fx = f_new;
        g = g_new;
        if converged {
            return (x, true);
        }
    }
    (x, false)
}

impl LogisticRegression {
    pub fn new(c: f64, solver: Solver, max_iter: usize) -> Self {
        Self {
            c,
            solver,
            max_iter,
            coef: Array2::zeros((0, 0)),
            n_classes: 0,
        }
    }

    /// Fit one sigmoid separating `positive` from everything else.
    fn fit_binary(&self, xb: &Array2<f64>, positive: &[bool]) -> (Array1<f64>, bool) {
        let d = xb.ncols() - 1;
        let sign: Array1<f64> = positive
            .iter()
            .map(|&p| if p { 1.0 } else { -1.0 })
            .collect();
        let c = self.c;
        let objective = |w: &Array1<f64>| {
            let z = xb.dot(w);
            let mut loss = 0.0;
            let mut residual = Array1::zeros(z.len());
            for i in 0..z.len() {
                let m = sign[i] * z[i];
                loss += softplus(-m);
                residual[i] = -sign[i] * sigmoid(-m);
            }
            let mut grad = xb.t().dot(&residual) * c;
            let penalty = 0.5 * w.slice(s![..d]).dot(&w.slice(s![..d]));
            grad.slice_mut(s![..d]).scaled_add(1.0, &w.slice(s![..d]));
            (penalty + c * loss, grad)
        };
        lbfgs(objective, Array1::zeros(d + 1), self.max_iter)
    }

    fn fit_multinomial(&self, xb: &Array2<f64>, y: &[usize]) -> (Array2<f64>, bool) {
        let (n, p) = xb.dim();
        let d = p - 1;
        let k = self.n_classes;
        let c = self.c;
        let objective = |flat: &Array1<f64>| {
            let w = flat
                .view()
                .into_shape_with_order((k, p))
                .map(|v| v.to_owned())
                .unwrap_or_else(|_| Array2::zeros((k, p)));
            let z = xb.dot(&w.t());
            let mut loss = 0.0;
            let mut residual = Array2::zeros((n, k));
            for i in 0..n {
                let row = z.row(i);
                let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
                let sum: f64 = row.iter().map(|v| (v - max).exp()).sum();
                let lse = max + sum.ln();
                loss += lse - row[y[i]];
                for j in 0..k {
                    residual[[i, j]] = (row[j] - lse).exp() - f64::from(u8::from(j == y[i]));
                }
            }
            let mut grad = residual.t().dot(xb) * c;
            let weights = w.slice(s![.., ..d]);
            grad.slice_mut(s![.., ..d]).scaled_add(1.0, &weights);
            let penalty = 0.5 * weights.iter().map(|v| v * v).sum::<f64>();
            let flat_grad = Array1::from_iter(grad.iter().copied());
            (penalty + c * loss, flat_grad)
        };
        let (flat, converged) = lbfgs(objective, Array1::zeros(k * p), self.max_iter);
        let coef = Array2::from_shape_vec((k, p), flat.to_vec())
            .unwrap_or_else(|_| Array2::zeros((k, p)));
        (coef, converged)
    }
}

impl Classifier for LogisticRegression {
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
                "logistic regression needs samples of at least 2 classes",
            ));
        }

        self.n_classes = n_classes;
        let xb = with_bias(&x);
        let converged = if n_classes == 2 {
            let positive: Vec<bool> = y.iter().map(|&c| c == 1).collect();
            let (w, ok) = self.fit_binary(&xb, &positive);
            self.coef = w.insert_axis(Axis(0));
            ok
        } else {
            match self.solver {
                Solver::Liblinear => {
                    let mut coef = Array2::zeros((n_classes, xb.ncols()));
                    let mut all_ok = true;
                    for k in 0..n_classes {
                        let positive: Vec<bool> = y.iter().map(|&c| c == k).collect();
                        let (w, ok) = self.fit_binary(&xb, &positive);
                        coef.row_mut(k).assign(&w);
                        all_ok &= ok;
                    }
                    self.coef = coef;
                    all_ok
                }
                Solver::Lbfgs => {
                    let (coef, ok) = self.fit_multinomial(&xb, y);
                    self.coef = coef;
                    ok
                }
            }
        };
        if !converged {
            tracing::warn!(
                max_iter = self.max_iter,
                "Logistic regression failed to converge; increase max_iter"
            );
        }
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, MlError> {
        if self.n_classes == 0 {
            return Err(MlError::model("logistic regression is not fitted"));
        }
        if x.ncols() + 1 != self.coef.ncols() {
            return Err(MlError::model(format!(
                "expected {} features, got {}",
                self.coef.ncols() - 1,
                x.ncols()
            )));
        }
        let z = with_bias(&x).dot(&self.coef.t());
        let mut out = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in z.rows().into_iter().enumerate() {
            if self.n_classes == 2 {
                let p = sigmoid(row[0]);
                out[[i, 0]] = 1.0 - p;
                out[[i, 1]] = p;
            } else if self.solver == Solver::Liblinear {
                let raw: Vec<f64> = row.iter().map(|&v| sigmoid(v)).collect();
                let total: f64 = raw.iter().sum();
                for (k, p) in raw.into_iter().enumerate() {
                    out[[i, k]] = p / total;
                }
            } else {
                let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
                let exp: Vec<f64> = row.iter().map(|v| (v - max).exp()).collect();
                let total: f64 = exp.iter().sum();
                for (k, e) in exp.into_iter().enumerate() {
                    out[[i, k]] = e / total;
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> (Array2<f64>, Vec<usize>) {
        let x = array![
            [0.0, 0.1],
            [0.2, 0.0],
            [0.1, 0.3],
            [3.0, 3.1],
            [3.2, 2.9],
            [2.8, 3.0],
            [0.0, 3.0],
            [0.2, 3.2],
            [0.1, 2.8]
        ];
        (x, vec![0, 0, 0, 1, 1, 1, 2, 2, 2])
    }

    #[test]
    fn test_binary_fit_separates() {
        let x = array![[-2.0], [-1.0], [-0.5], [0.5], [1.0], [2.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let mut model = LogisticRegression::new(1.0, Solver::Lbfgs, 1000);
        model.fit(x.view(), &y, 2).unwrap();
        assert_eq!(model.predict(x.view()).unwrap(), y.to_vec());
        let proba = model.predict_proba(array![[0.0]].view()).unwrap();
        assert!((proba[[0, 0]] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_multiclass_solvers() {
        let (x, y) = blobs();
        for solver in [Solver::Liblinear, Solver::Lbfgs] {
            let mut model = LogisticRegression::new(10.0, solver, 1000);
            model.fit(x.view(), &y, 3).unwrap();
            assert_eq!(model.predict(x.view()).unwrap(), y, "{solver:?}");
            let proba = model.predict_proba(x.view()).unwrap();
            for row in proba.rows() {
                assert!((row.sum() - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_single_class_rejected() {
        let x = array![[1.0], [2.0]];
        let mut model = LogisticRegression::new(1.0, Solver::Lbfgs, 100);
        assert!(model.fit(x.view(), &[0, 0], 2).is_err());
    }

    #[test]
    fn test_stronger_regularization_shrinks_weights() {
        let x = array![[-2.0], [-1.0], [1.0], [2.0]];
        let y = [0, 0, 1, 1];
        let mut weak = LogisticRegression::new(100.0, Solver::Lbfgs, 1000);
        let mut strong = LogisticRegression::new(0.01, Solver::Lbfgs, 1000);
        weak.fit(x.view(), &y, 2).unwrap();
        strong.fit(x.view(), &y, 2).unwrap();
        assert!(strong.coef[[0, 0]].abs() < weak.coef[[0, 0]].abs());
    }
}
