//! CART decision tree classifier with Gini impurity.

use crate::algorithms::classical::{Classifier, check_fit_input};
use crate::error::MlError;
use ndarray::{Array2, ArrayView1, ArrayView2};

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Binary decision tree. Splits go left when `x[feature] <= threshold`.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    nodes: Vec<Node>,
    n_features: usize,
    n_classes: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

impl DecisionTree {
    pub fn new(max_depth: Option<usize>, min_samples_split: usize) -> Self {
        Self {
            max_depth,
            min_samples_split: min_samples_split.max(2),
            nodes: Vec::new(),
            n_features: 0,
            n_classes: 0,
        }
    }

    /// Number of nodes in the fitted tree.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn grow(
        &mut self,
        x: &ArrayView2<f64>,
        y: &[usize],
        n_classes: usize,
        samples: Vec<usize>,
        depth: usize,
    ) -> usize {
        let mut counts = vec![0usize; n_classes];
        for &i in &samples {
            counts[y[i]] += 1;
        }
        let total = samples.len();
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let depth_reached = self.max_depth.is_some_and(|d| depth >= d);

        let split = if pure || depth_reached || total < self.min_samples_split {
            None
        } else {
            best_split(x, y, n_classes, &samples)
        };

        let Some(split) = split else {
            let distribution = counts
                .iter()
                .map(|&c| c as f64 / total as f64)
                .collect();
            self.nodes.push(Node::Leaf { distribution });
            return self.nodes.len() - 1;
        };

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| x[[i, split.feature]] <= split.threshold);

        let id = self.nodes.len();
        self.nodes.push(Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
        });
        let left_id = self.grow(x, y, n_classes, left_samples, depth + 1);
        let right_id = self.grow(x, y, n_classes, right_samples, depth + 1);
        if let Node::Split { left, right, .. } = &mut self.nodes[id] {
            *left = left_id;
            *right = right_id;
        }
        id
    }

    fn leaf_for(&self, row: ArrayView1<f64>) -> &[f64] {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Lowest weighted child impurity over all features and midpoints. `None`
/// when every feature is constant over `samples`.
fn best_split(
    x: &ArrayView2<f64>,
    y: &[usize],
    n_classes: usize,
    samples: &[usize],
) -> Option<BestSplit> {
    let total = samples.len();
    let mut best: Option<BestSplit> = None;

    for feature in 0..x.ncols() {
        let mut sorted = samples.to_vec();
        sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let mut left = vec![0usize; n_classes];
        let mut right = vec![0usize; n_classes];
        for &i in &sorted {
            right[y[i]] += 1;
        }

        for pos in 0..total - 1 {
            let i = sorted[pos];
            left[y[i]] += 1;
            right[y[i]] -= 1;

            let here = x[[i, feature]];
            let next = x[[sorted[pos + 1], feature]];
            if next <= here {
                continue;
            }
            let n_left = pos + 1;
            let n_right = total - n_left;
            let impurity = (n_left as f64 * gini(&left, n_left)
                + n_right as f64 * gini(&right, n_right))
                / total as f64;
            if best.as_ref().is_none_or(|b| impurity < b.impurity - 1e-12) {
                let mut threshold = here + (next - here) / 2.0;
                if threshold >= next {
                    threshold = here;
                }
                best = Some(BestSplit {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
    }

    best
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<(), MlError> {
        check_fit_input(&x, y, n_classes)?;
        self.nodes.clear();
        self.n_features = x.ncols();
        self.n_classes = n_classes;
        self.grow(&x, y, n_classes, (0..x.nrows()).collect(), 0);
        tracing::trace!(nodes = self.nodes.len(), "Decision tree grown");
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, MlError> {
        if self.nodes.is_empty() {
            return Err(MlError::model("decision tree is not fitted"));
        }
        if x.ncols() != self.n_features {
            return Err(MlError::model(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        let mut out = Array2::zeros((x.nrows(), self.n_classes));
        for (r, row) in x.rows().into_iter().enumerate() {
            for (k, &p) in self.leaf_for(row).iter().enumerate() {
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

    #[test]
    fn test_tree_separates_threshold() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let mut tree = DecisionTree::new(None, 2);
        tree.fit(x.view(), &y, 2).unwrap();
        assert_eq!(tree.node_count(), 3);
        let pred = tree.predict(array![[2.5], [6.4], [6.6], [100.0]].view()).unwrap();
        assert_eq!(pred, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = [0, 1, 1, 0];
        let mut stump = DecisionTree::new(Some(1), 2);
        stump.fit(x.view(), &y, 2).unwrap();
        assert!(stump.node_count() <= 3);

        let mut full = DecisionTree::new(None, 2);
        full.fit(x.view(), &y, 2).unwrap();
        assert_eq!(full.predict(x.view()).unwrap(), vec![0, 1, 1, 0]);
    }

    #[test]
    fn test_proba_width_includes_absent_classes() {
        let x = array![[0.0], [1.0]];
        let mut tree = DecisionTree::new(None, 2);
        tree.fit(x.view(), &[0, 2], 3).unwrap();
        let proba = tree.predict_proba(x.view()).unwrap();
        assert_eq!(proba.ncols(), 3);
        assert_eq!(proba[[1, 2]], 1.0);
    }

    #[test]
    fn test_unfitted_tree_errors() {
        let tree = DecisionTree::new(None, 2);
        assert!(tree.predict_proba(array![[1.0]].view()).is_err());
    }
}
