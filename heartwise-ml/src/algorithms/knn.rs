//! k-nearest-neighbors classifier over Euclidean distance.

use crate::algorithms::classical::{Classifier, check_fit_input};
use crate::error::MlError;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Neighbor vote weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weights {
    Uniform,
    /// Inverse distance; exact matches take all the weight.
    Distance,
}

#[derive(Debug, Clone)]
pub struct KNearestNeighbors {
    pub n_neighbors: usize,
    pub weights: Weights,
    x: Array2<f64>,
    y: Vec<usize>,
    n_classes: usize,
}

impl KNearestNeighbors {
    pub fn new(n_neighbors: usize, weights: Weights) -> Self {
        Self {
            n_neighbors,
            weights,
            x: Array2::zeros((0, 0)),
            y: Vec::new(),
            n_classes: 0,
        }
    }

    fn vote(&self, query: ArrayView1<f64>) -> Vec<f64> {
        let mut neighbors: Vec<(f64, usize)> = self
            .x
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let d = row
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt();
                (d, i)
            })
            .collect();
        // Stable on index so equidistant neighbors resolve by training order.
        neighbors.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        neighbors.truncate(self.n_neighbors);

        let mut scores = vec![0.0; self.n_classes];
        let exact = neighbors.iter().any(|(d, _)| *d == 0.0);
        for &(d, i) in &neighbors {
            let w = match self.weights {
                Weights::Uniform => 1.0,
                Weights::Distance if exact => f64::from(u8::from(d == 0.0)),
                Weights::Distance => 1.0 / d,
            };
            scores[self.y[i]] += w;
        }
        let total: f64 = scores.iter().sum();
        if total > 0.0 {
            scores.iter_mut().for_each(|s| *s /= total);
        }
        scores
    }
}

impl Classifier for KNearestNeighbors {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<(), MlError> {
        check_fit_input(&x, y, n_classes)?;
        if self.n_neighbors == 0 {
            return Err(MlError::model("n_neighbors must be at least 1"));
        }
        if self.n_neighbors > x.nrows() {
            return Err(MlError::model(format!(
                "Expected n_neighbors <= n_samples, but n_samples = {}, n_neighbors = {}",
                x.nrows(),
                self.n_neighbors
            )));
        }
        self.x = x.to_owned();
        self.y = y.to_vec();
        self.n_classes = n_classes;
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, MlError> {
        if self.y.is_empty() {
            return Err(MlError::model("k-nearest-neighbors model is not fitted"));
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
            for (k, p) in self.vote(row).into_iter().enumerate() {
                out[[r, k]] = p;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn training() -> (Array2<f64>, Vec<usize>) {
        (
            array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [5.0, 5.0], [5.0, 6.0]],
            vec![0, 0, 0, 1, 1],
        )
    }

    #[test]
    fn test_uniform_vote() {
        let (x, y) = training();
        let mut knn = KNearestNeighbors::new(3, Weights::Uniform);
        knn.fit(x.view(), &y, 2).unwrap();
        let proba = knn.predict_proba(array![[0.1, 0.1]].view()).unwrap();
        assert_eq!(proba.row(0).to_vec(), vec![1.0, 0.0]);
        assert_eq!(knn.predict(array![[5.0, 5.5]].view()).unwrap(), vec![1]);
    }

    #[test]
    fn test_distance_weights_exact_match() {
        let (x, y) = training();
        let mut knn = KNearestNeighbors::new(5, Weights::Distance);
        knn.fit(x.view(), &y, 2).unwrap();
        let proba = knn.predict_proba(array![[5.0, 5.0]].view()).unwrap();
        assert_eq!(proba.row(0).to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_too_many_neighbors() {
        let (x, y) = training();
        let mut knn = KNearestNeighbors::new(6, Weights::Uniform);
        assert!(knn.fit(x.view(), &y, 2).is_err());
    }
}
