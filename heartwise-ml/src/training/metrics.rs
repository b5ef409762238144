//! Classification metrics and text reports.

use crate::error::MlError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Precision, recall and F1 for one class, or an average over classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Classification metrics for one set of predictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    /// Classes seen in either the truth or the predictions, in label order.
    pub per_class: Vec<ClassMetrics>,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    /// Rows are true classes, columns predicted classes, over `per_class`.
    pub confusion_matrix: Vec<Vec<usize>>,
    pub auc_roc: Option<f64>,
}

/// Ratio with a zero denominator mapped to zero.
fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { num / den }
}

pub fn accuracy_score(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let hits = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    safe_div(hits as f64, y_true.len() as f64)
}

/// Per-class `(precision, recall, f1, support)` for classes `0..n_classes`.
fn per_class_scores(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Vec<(f64, f64, f64, usize)> {
    let mut tp = vec![0usize; n_classes];
    let mut predicted = vec![0usize; n_classes];
    let mut actual = vec![0usize; n_classes];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        actual[t] += 1;
        predicted[p] += 1;
        if t == p {
            tp[t] += 1;
        }
    }
    (0..n_classes)
        .map(|k| {
            let precision = safe_div(tp[k] as f64, predicted[k] as f64);
            let recall = safe_div(tp[k] as f64, actual[k] as f64);
            let f1 = safe_div(2.0 * precision * recall, precision + recall);
            (precision, recall, f1, actual[k])
        })
        .collect()
}

/// Support-weighted mean F1 over all classes.
pub fn f1_weighted(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> f64 {
    let scores = per_class_scores(y_true, y_pred, n_classes);
    let total: usize = scores.iter().map(|s| s.3).sum();
    safe_div(
        scores.iter().map(|s| s.2 * s.3 as f64).sum::<f64>(),
        total as f64,
    )
}

/// Count matrix over `classes`: `m[i][j]` counts truth `classes[i]`
/// predicted as `classes[j]`.
pub fn confusion_matrix(y_true: &[usize], y_pred: &[usize], classes: &[usize]) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0usize; classes.len()]; classes.len()];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        if let (Some(i), Some(j)) = (
            classes.iter().position(|&c| c == t),
            classes.iter().position(|&c| c == p),
        ) {
            matrix[i][j] += 1;
        }
    }
    matrix
}

/// Render a count matrix the way numpy prints integer arrays.
pub fn format_confusion_matrix(matrix: &[Vec<usize>]) -> String {
    let width = matrix
        .iter()
        .flatten()
        .map(|v| v.to_string().len())
        .max()
        .unwrap_or(1);
    let rows: Vec<String> = matrix
        .iter()
        .map(|row| {
            let cells: Vec<String> = row.iter().map(|v| format!("{v:>width$}")).collect();
            format!("[{}]", cells.join(" "))
        })
        .collect();
    format!("[{}]", rows.join("\n "))
}

/// Area under the ROC curve for a binary problem, with tied scores sharing
/// their average rank. `None` unless both classes are present.
pub fn binary_auc(positive: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = positive.iter().filter(|&&p| p).count();
    let n_neg = positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        let avg_rank = (start + end) as f64 / 2.0 + 1.0;
        rank_sum += order[start..=end]
            .iter()
            .filter(|&&i| positive[i])
            .count() as f64
            * avg_rank;
        start = end + 1;
    }
    let u = rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}

/// ROC AUC from class probabilities.
///
/// Two-class models score on the second column. Wider models use the
/// unweighted mean of one-vs-rest AUCs over the classes present in `y_true`.
pub fn roc_auc_score(y_true: &[usize], proba: &Array2<f64>) -> Result<f64, MlError> {
    if proba.nrows() != y_true.len() {
        return Err(MlError::evaluation(format!(
            "{} labels but {} probability rows",
            y_true.len(),
            proba.nrows()
        )));
    }
    let mut present: Vec<usize> = y_true.to_vec();
    present.sort_unstable();
    present.dedup();
    if present.len() < 2 {
        return Err(MlError::evaluation(
            "Only one class present in y_true. ROC AUC score is not defined in that case.",
        ));
    }

    if proba.ncols() == 2 {
        let positive: Vec<bool> = y_true.iter().map(|&c| c == 1).collect();
        let scores = proba.column(1).to_vec();
        return binary_auc(&positive, &scores)
            .ok_or_else(|| MlError::evaluation("ROC AUC needs both classes"));
    }

    let mut total = 0.0;
    for &class in &present {
        let positive: Vec<bool> = y_true.iter().map(|&c| c == class).collect();
        let scores = proba.column(class).to_vec();
        total += binary_auc(&positive, &scores)
            .ok_or_else(|| MlError::evaluation("ROC AUC needs both classes"))?;
    }
    Ok(total / present.len() as f64)
}

impl ClassificationMetrics {
    /// Compare predictions to the truth. `labels[k]` names class index `k`.
    pub fn compute(y_true: &[usize], y_pred: &[usize], labels: &[String]) -> Result<Self, MlError> {
        if y_true.len() != y_pred.len() {
            return Err(MlError::evaluation(format!(
                "{} true labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }
        if let Some(bad) = y_true.iter().chain(y_pred).find(|&&c| c >= labels.len()) {
            return Err(MlError::evaluation(format!("class index {bad} has no label")));
        }

        let scores = per_class_scores(y_true, y_pred, labels.len());
        let mut classes: Vec<usize> = y_true.iter().chain(y_pred).copied().collect();
        classes.sort_unstable();
        classes.dedup();

        let per_class: Vec<ClassMetrics> = classes
            .iter()
            .map(|&k| {
                let (precision, recall, f1_score, support) = scores[k];
                ClassMetrics {
                    label: labels[k].clone(),
                    precision,
                    recall,
                    f1_score,
                    support,
                }
            })
            .collect();

        let total = y_true.len();
        let n = per_class.len() as f64;
        let macro_avg = ClassMetrics {
            label: "macro avg".to_string(),
            precision: safe_div(per_class.iter().map(|m| m.precision).sum(), n),
            recall: safe_div(per_class.iter().map(|m| m.recall).sum(), n),
            f1_score: safe_div(per_class.iter().map(|m| m.f1_score).sum(), n),
            support: total,
        };
        let weighted = |f: fn(&ClassMetrics) -> f64| {
            safe_div(
                per_class.iter().map(|m| f(m) * m.support as f64).sum(),
                total as f64,
            )
        };
        let weighted_avg = ClassMetrics {
            label: "weighted avg".to_string(),
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1_score: weighted(|m| m.f1_score),
            support: total,
        };

        Ok(Self {
            accuracy: accuracy_score(y_true, y_pred),
            confusion_matrix: confusion_matrix(y_true, y_pred, &classes),
            per_class,
            macro_avg,
            weighted_avg,
            auc_roc: None,
        })
    }

    /// Text report: one row per class, then accuracy, macro and weighted
    /// averages, with `digits` decimals.
    pub fn report(&self, digits: usize) -> String {
        let heading = "weighted avg";
        let width = self
            .per_class
            .iter()
            .map(|m| m.label.len())
            .chain([heading.len(), digits])
            .max()
            .unwrap_or(heading.len());

        let mut out = format!("{:>width$} ", "");
        for h in ["precision", "recall", "f1-score", "support"] {
            out.push_str(&format!(" {h:>9}"));
        }
        out.push_str("\n\n");

        let row = |m: &ClassMetrics| {
            format!(
                "{:>width$}  {:>9.digits$} {:>9.digits$} {:>9.digits$} {:>9}\n",
                m.label, m.precision, m.recall, m.f1_score, m.support
            )
        };
        for m in &self.per_class {
            out.push_str(&row(m));
        }
        out.push('\n');
        out.push_str(&format!(
            "{:>width$}  {:>9} {:>9} {:>9.digits$} {:>9}\n",
            "accuracy", "", "", self.accuracy, self.weighted_avg.support
        ));
        out.push_str(&row(&self.macro_avg));
        out.push_str(&row(&self.weighted_avg));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use pretty_assertions::assert_eq;

    fn labels() -> Vec<String> {
        vec!["0".to_string(), "1".to_string()]
    }

    #[test]
    fn test_report_layout() {
        let y_true = [0, 0, 1, 1];
        let y_pred = [0, 1, 1, 1];
        let metrics = ClassificationMetrics::compute(&y_true, &y_pred, &labels()).unwrap();
        let expected = "              precision    recall  f1-score   support\n\
                        \n\
                        \x20          0       1.00      0.50      0.67         2\n\
                        \x20          1       0.67      1.00      0.80         2\n\
                        \n\
                        \x20   accuracy                           0.75         4\n\
                        \x20  macro avg       0.83      0.75      0.73         4\n\
                        weighted avg       0.83      0.75      0.73         4\n";
        assert_eq!(metrics.report(2), expected);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let metrics = ClassificationMetrics::compute(&[0, 0], &[1, 1], &labels()).unwrap();
        assert_eq!(metrics.per_class[1].precision, 0.0);
        assert_eq!(metrics.per_class[0].recall, 0.0);
        assert_eq!(metrics.accuracy, 0.0);
    }

    #[test]
    fn test_report_lists_only_observed_classes() {
        let names: Vec<String> = ["0", "1", "2"].iter().map(|s| s.to_string()).collect();
        let metrics = ClassificationMetrics::compute(&[0, 2], &[0, 2], &names).unwrap();
        let listed: Vec<&str> = metrics.per_class.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(listed, vec!["0", "2"]);
        assert_eq!(metrics.confusion_matrix, vec![vec![1, 0], vec![0, 1]]);
    }

    #[test]
    fn test_format_confusion_matrix() {
        assert_eq!(
            format_confusion_matrix(&[vec![50, 3], vec![4, 43]]),
            "[[50  3]\n [ 4 43]]"
        );
    }

    #[test]
    fn test_binary_auc_with_ties() {
        let positive = [false, false, true, true];
        assert_eq!(binary_auc(&positive, &[0.1, 0.4, 0.35, 0.8]), Some(0.75));
        assert_eq!(binary_auc(&positive, &[0.5, 0.5, 0.5, 0.5]), Some(0.5));
        assert_eq!(binary_auc(&[true, true], &[0.1, 0.2]), None);
    }

    #[test]
    fn test_roc_auc_multiclass_macro() {
        let proba = array![[0.8, 0.1, 0.1], [0.1, 0.8, 0.1], [0.1, 0.1, 0.8]];
        assert_eq!(roc_auc_score(&[0, 1, 2], &proba).unwrap(), 1.0);
        assert!(roc_auc_score(&[1, 1, 1], &proba).is_err());
    }

    #[test]
    fn test_f1_weighted() {
        let f1 = f1_weighted(&[0, 0, 1, 1], &[0, 1, 1, 1], 2);
        assert!((f1 - (0.5 * 2.0 / 3.0 + 0.5 * 0.8)).abs() < 1e-12);
    }
}
