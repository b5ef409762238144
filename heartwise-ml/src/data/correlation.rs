//! Association measures used by the correlation checks.
//!
//! Feature-label strength is a predictive power score: how much a one-feature
//! decision tree beats always guessing the most common class, by weighted F1
//! under cross-validation. Feature-feature strength picks the measure by the
//! column kinds: absolute Spearman rank correlation for two numeric columns,
//! Cramér's V for two categorical ones, and the correlation ratio for a mix.

use crate::algorithms::classical::Classifier;
use crate::algorithms::evaluation::CrossValidation;
use crate::algorithms::tree::DecisionTree;
use crate::data::table::{Cell, Table};
use crate::error::MlError;
use crate::training::metrics::f1_weighted;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;

/// Folds used for the predictive power score.
pub const PPS_FOLDS: usize = 4;

/// Numeric codes for a column. Text values are coded by sorted position
/// after the largest number, so mixed columns stay comparable.
pub fn encode_column(table: &Table, name: &str) -> Result<Vec<Option<f64>>, MlError> {
    let cells = table.column(name)?;
    let texts: Vec<String> = {
        let mut t: Vec<String> = cells
            .iter()
            .filter_map(|c| match c {
                Cell::Text(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        t.sort();
        t.dedup();
        t
    };
    let offset = cells
        .iter()
        .filter_map(|c| c.as_f64())
        .fold(0.0f64, f64::max)
        + 1.0;
    Ok(cells
        .iter()
        .map(|c| match c {
            Cell::Text(s) => texts
                .iter()
                .position(|t| t == s)
                .map(|p| offset + p as f64),
            other => other.as_f64(),
        })
        .collect())
}

/// Rows where both values are present.
fn complete_pairs(a: &[Option<f64>], b: &[Option<f64>]) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .zip(b)
        .filter_map(|(x, y)| x.zip(*y))
        .unzip()
}

/// Class index of every value, over the sorted distinct values.
fn class_codes(values: &[f64]) -> (Vec<usize>, usize) {
    let mut levels = values.to_vec();
    levels.sort_by(f64::total_cmp);
    levels.dedup();
    let codes = values
        .iter()
        .map(|v| levels.partition_point(|l| l < v))
        .collect();
    (codes, levels.len())
}

/// Predictive power score of `feature` for a categorical `target`, in `[0, 1]`.
///
/// Rows missing either value are dropped and the rest shuffled with `seed`.
/// A constant target, or too few rows to cross-validate, scores zero.
pub fn predictive_power_score(
    feature: &[Option<f64>],
    target: &[Option<f64>],
    seed: u64,
) -> Result<f64, MlError> {
    let (mut xs, mut ys) = complete_pairs(feature, target);
    let mut order: Vec<usize> = (0..xs.len()).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    xs = order.iter().map(|&i| xs[i]).collect();
    ys = order.iter().map(|&i| ys[i]).collect();

    let (y, n_classes) = class_codes(&ys);
    if n_classes < 2 || y.len() < PPS_FOLDS {
        return Ok(0.0);
    }

    let mut counts = vec![0usize; n_classes];
    for &c in &y {
        counts[c] += 1;
    }
    let most_common = counts
        .iter()
        .enumerate()
        .fold((0, 0), |best, (k, &c)| if c > best.1 { (k, c) } else { best })
        .0;
    let baseline = f1_weighted(&y, &vec![most_common; y.len()], n_classes);

    let stratified = CrossValidation::stratified(PPS_FOLDS);
    let folds = match stratified.split(&y) {
        Ok(folds) => folds,
        Err(_) => CrossValidation {
            stratified: false,
            ..stratified
        }
        .split(&y)?,
    };

    let x = Array2::from_shape_vec((xs.len(), 1), xs)?;
    let mut scores = Vec::with_capacity(folds.len());
    for fold in folds {
        let train_x = x.select(ndarray::Axis(0), &fold.train);
        let test_x = x.select(ndarray::Axis(0), &fold.test);
        let train_y: Vec<usize> = fold.train.iter().map(|&i| y[i]).collect();
        let test_y: Vec<usize> = fold.test.iter().map(|&i| y[i]).collect();
        let mut tree = DecisionTree::new(None, 2);
        tree.fit(train_x.view(), &train_y, n_classes)?;
        let predicted = tree.predict(test_x.view())?;
        scores.push(f1_weighted(&test_y, &predicted, n_classes));
    }
    let model_score = scores.iter().sum::<f64>() / scores.len() as f64;

    if model_score <= baseline || baseline >= 1.0 {
        return Ok(0.0);
    }
    Ok((model_score - baseline) / (1.0 - baseline))
}

/// Average ranks, ties sharing the mean of their positions (1-based).
fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut out = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &i in &order[start..=end] {
            out[i] = rank;
        }
        start = end + 1;
    }
    out
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    if a.len() < 2 {
        return 0.0;
    }
    let ma = a.iter().sum::<f64>() / n;
    let mb = b.iter().sum::<f64>() / n;
    let (mut cov, mut va, mut vb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    if va == 0.0 || vb == 0.0 {
        return 0.0;
    }
    cov / (va * vb).sqrt()
}

/// Spearman rank correlation over complete pairs. Constant columns give 0.
pub fn spearman(a: &[Option<f64>], b: &[Option<f64>]) -> f64 {
    let (xs, ys) = complete_pairs(a, b);
    pearson(&ranks(&xs), &ranks(&ys))
}

/// Cramér's V between two categorical columns, over complete pairs.
pub fn cramers_v(a: &[Option<f64>], b: &[Option<f64>]) -> f64 {
    let (xs, ys) = complete_pairs(a, b);
    let (ca, ka) = class_codes(&xs);
    let (cb, kb) = class_codes(&ys);
    let n = xs.len() as f64;
    if ka < 2 || kb < 2 {
        return 0.0;
    }
    let mut table = vec![vec![0.0; kb]; ka];
    for (&i, &j) in ca.iter().zip(&cb) {
        table[i][j] += 1.0;
    }
    let row_sums: Vec<f64> = table.iter().map(|r| r.iter().sum()).collect();
    let col_sums: Vec<f64> = (0..kb).map(|j| table.iter().map(|r| r[j]).sum()).collect();
    let mut chi2 = 0.0;
    for i in 0..ka {
        for j in 0..kb {
            let expected = row_sums[i] * col_sums[j] / n;
            if expected > 0.0 {
                chi2 += (table[i][j] - expected).powi(2) / expected;
            }
        }
    }
    (chi2 / (n * (ka.min(kb) - 1) as f64)).sqrt()
}

/// Correlation ratio (eta) of a numeric column given a categorical one.
pub fn correlation_ratio(categories: &[Option<f64>], values: &[Option<f64>]) -> f64 {
    let (cs, vs) = complete_pairs(categories, values);
    if vs.is_empty() {
        return 0.0;
    }
    let mean = vs.iter().sum::<f64>() / vs.len() as f64;
    let mut groups: BTreeMap<u64, (f64, usize)> = BTreeMap::new();
    for (c, v) in cs.iter().zip(&vs) {
        let entry = groups.entry(c.to_bits()).or_insert((0.0, 0));
        entry.0 += v;
        entry.1 += 1;
    }
    let between: f64 = groups
        .values()
        .map(|(sum, n)| {
            let m = sum / *n as f64;
            *n as f64 * (m - mean).powi(2)
        })
        .sum();
    let total: f64 = vs.iter().map(|v| (v - mean).powi(2)).sum();
    if total == 0.0 {
        return 0.0;
    }
    (between / total).sqrt()
}

/// Association strength of one feature pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    pub first: String,
    pub second: String,
    pub value: f64,
}

/// Association between every pair of `features`, each pair once.
pub fn feature_associations(
    table: &Table,
    features: &[String],
    categorical: &[String],
) -> Result<Vec<Association>, MlError> {
    let encoded = features
        .iter()
        .map(|f| encode_column(table, f))
        .collect::<Result<Vec<_>, _>>()?;
    let is_cat = |name: &String| categorical.contains(name) || table.is_categorical(name);

    let mut out = Vec::new();
    for i in 0..features.len() {
        for j in i + 1..features.len() {
            let value = match (is_cat(&features[i]), is_cat(&features[j])) {
                (false, false) => spearman(&encoded[i], &encoded[j]).abs(),
                (true, true) => cramers_v(&encoded[i], &encoded[j]),
                (true, false) => correlation_ratio(&encoded[i], &encoded[j]),
                (false, true) => correlation_ratio(&encoded[j], &encoded[i]),
            };
            out.push(Association {
                first: features[i].clone(),
                second: features[j].clone(),
                value,
            });
        }
    }
    Ok(out)
}
