//! Column-wise feature transforms.
//!
//! A [`ColumnTransformer`] routes columns into groups. Numeric columns are
//! median-imputed and standardized, categorical columns are mode-imputed and
//! one-hot encoded, binary columns are mode-imputed only, and every other
//! column is dropped. Output columns come in group order: numeric, one-hot,
//! binary.

use crate::config::{HandleUnknown, PreprocessConfig};
use crate::data::table::{Cell, Table};
use crate::error::MlError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Column routing. Fit it on training data to get a [`FittedTransformer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTransformer {
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
    pub binary: Vec<String>,
    pub drop: Vec<String>,
    pub handle_unknown: HandleUnknown,
}

impl From<&PreprocessConfig> for ColumnTransformer {
    fn from(config: &PreprocessConfig) -> Self {
        Self {
            numeric: config.numeric_features.clone(),
            categorical: config.categorical_features.clone(),
            binary: config.binary_features.clone(),
            drop: config.drop_features.clone(),
            handle_unknown: config.handle_unknown,
        }
    }
}

/// Learned statistics for one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub column: String,
    pub median: f64,
    pub mean: f64,
    /// Population standard deviation, or 1 for a constant column.
    pub scale: f64,
}

/// Learned levels for one categorical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalStats {
    pub column: String,
    pub fill: Cell,
    /// Sorted distinct levels seen in training, after imputation.
    pub levels: Vec<Cell>,
    /// Two-level columns keep only the second level's indicator.
    pub drop_first: bool,
}

impl CategoricalStats {
    fn encoded_levels(&self) -> &[Cell] {
        if self.drop_first {
            &self.levels[1..]
        } else {
            &self.levels
        }
    }
}

/// Learned fill value for one binary column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryStats {
    pub column: String,
    pub fill: f64,
}

/// A transformer with its statistics learned from training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTransformer {
    pub routing: ColumnTransformer,
    pub numeric: Vec<NumericStats>,
    pub categorical: Vec<CategoricalStats>,
    pub binary: Vec<BinaryStats>,
}

fn same_value(a: &Cell, b: &Cell) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Numeric column values for transformation; text is an error.
fn numeric_values(table: &Table, column: &str) -> Result<Vec<Option<f64>>, MlError> {
    table
        .numeric_column(column)
        .map_err(|e| MlError::preprocess(format!("column '{column}' must be numeric: {e}")))
}

fn median_of(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Most frequent non-null cell; ties go to the smallest value.
fn most_frequent(table: &Table, column: &str) -> Result<Cell, MlError> {
    let levels = table.levels(column)?;
    let cells = table.column(column)?;
    levels
        .into_iter()
        .map(|level| {
            let count = cells.iter().filter(|c| same_value(c, &level)).count();
            (level, count)
        })
        .fold(None, |best: Option<(Cell, usize)>, (level, count)| match best {
            Some((_, top)) if top >= count => best,
            _ => Some((level, count)),
        })
        .map(|(level, _)| level)
        .ok_or_else(|| MlError::preprocess(format!("column '{column}' has no observed values")))
}

/// Render a level the way it appears in an indicator column name.
fn level_name(level: &Cell) -> String {
    level.to_field()
}

impl ColumnTransformer {
    /// Every column named by more than one group.
    fn overlapping(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut repeated = BTreeSet::new();
        for name in self
            .numeric
            .iter()
            .chain(&self.categorical)
            .chain(&self.binary)
            .chain(&self.drop)
        {
            if !seen.insert(name) {
                repeated.insert(name.clone());
            }
        }
        repeated.into_iter().collect()
    }

    /// Learn imputation, scaling and encoding statistics from `table`.
    pub fn fit(&self, table: &Table) -> Result<FittedTransformer, MlError> {
        let repeated = self.overlapping();
        if !repeated.is_empty() {
            return Err(MlError::preprocess(format!(
                "columns assigned to more than one group: {repeated:?}"
            )));
        }
        for name in self.numeric.iter().chain(&self.categorical).chain(&self.binary) {
            if table.column_index(name).is_none() {
                return Err(MlError::preprocess(format!(
                    "column '{name}' not found in training data"
                )));
            }
        }

        let numeric = self
            .numeric
            .iter()
            .map(|column| {
                let values = numeric_values(table, column)?;
                let mut observed: Vec<f64> = values.iter().flatten().copied().collect();
                if observed.is_empty() {
                    return Err(MlError::preprocess(format!(
                        "column '{column}' has no observed values"
                    )));
                }
                let median = median_of(&mut observed);
                let imputed: Vec<f64> = values.iter().map(|v| v.unwrap_or(median)).collect();
                let n = imputed.len() as f64;
                let mean = imputed.iter().sum::<f64>() / n;
                let std = (imputed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
                Ok(NumericStats {
                    column: column.clone(),
                    median,
                    mean,
                    scale: if std > 0.0 { std } else { 1.0 },
                })
            })
            .collect::<Result<Vec<_>, MlError>>()?;

        let categorical = self
            .categorical
            .iter()
            .map(|column| {
                numeric_values(table, column)?;
                let fill = most_frequent(table, column)?;
                let levels = table.levels(column)?;
                Ok(CategoricalStats {
                    column: column.clone(),
                    drop_first: levels.len() == 2,
                    fill,
                    levels,
                })
            })
            .collect::<Result<Vec<_>, MlError>>()?;

        let binary = self
            .binary
            .iter()
            .map(|column| {
                numeric_values(table, column)?;
                let fill = most_frequent(table, column)?;
                Ok(BinaryStats {
                    column: column.clone(),
                    fill: fill.as_f64().unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, MlError>>()?;

        let fitted = FittedTransformer {
            routing: self.clone(),
            numeric,
            categorical,
            binary,
        };
        tracing::debug!(
            rows = table.row_count(),
            features_out = fitted.feature_names().len(),
            "Fitted column transformer"
        );
        Ok(fitted)
    }
}

impl FittedTransformer {
    /// Output column names, in output order.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.numeric.iter().map(|s| s.column.clone()).collect();
        for stats in &self.categorical {
            for level in stats.encoded_levels() {
                names.push(format!("{}_{}", stats.column, level_name(level)));
            }
        }
        names.extend(self.binary.iter().map(|s| s.column.clone()));
        names
    }

    /// Apply the learned statistics to `table`. Unknown categories either
    /// fail or encode as all zeros, per `handle_unknown`.
    pub fn transform(&self, table: &Table) -> Result<Array2<f64>, MlError> {
        let n = table.row_count();
        let width = self.feature_names().len();
        let mut out = Array2::zeros((n, width));
        let mut col = 0;

        for stats in &self.numeric {
            let values = numeric_values(table, &stats.column)?;
            for (r, v) in values.into_iter().enumerate() {
                out[[r, col]] = (v.unwrap_or(stats.median) - stats.mean) / stats.scale;
            }
            col += 1;
        }

        for stats in &self.categorical {
            numeric_values(table, &stats.column)?;
            let encoded = stats.encoded_levels();
            let cells = table.column(&stats.column)?;
            let mut unknown: Vec<String> = Vec::new();
            for (r, cell) in cells.into_iter().enumerate() {
                let value = if cell.is_null() { &stats.fill } else { cell };
                if !stats.levels.iter().any(|l| same_value(l, value)) {
                    unknown.push(value.to_field());
                    continue;
                }
                if let Some(k) = encoded.iter().position(|l| same_value(l, value)) {
                    out[[r, col + k]] = 1.0;
                }
            }
            if !unknown.is_empty() {
                unknown.sort();
                unknown.dedup();
                match self.routing.handle_unknown {
                    HandleUnknown::Error => {
                        return Err(MlError::preprocess(format!(
                            "Found unknown categories [{}] in column '{}' during transform",
                            unknown.join(", "),
                            stats.column
                        )));
                    }
                    HandleUnknown::Ignore => {
                        tracing::warn!(
                            column = %stats.column,
                            categories = ?unknown,
                            "Unknown categories encoded as all zeros"
                        );
                    }
                }
            }
            col += encoded.len();
        }

        for stats in &self.binary {
            let values = numeric_values(table, &stats.column)?;
            for (r, v) in values.into_iter().enumerate() {
                out[[r, col]] = v.unwrap_or(stats.fill);
            }
            col += 1;
        }

        Ok(out)
    }

    /// [`FittedTransformer::transform`] as a named float table.
    pub fn transform_table(&self, table: &Table) -> Result<Table, MlError> {
        let matrix = self.transform(table)?;
        let rows = matrix
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|&v| Cell::Float(v)).collect())
            .collect();
        Table::from_rows(self.feature_names(), rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn routing() -> ColumnTransformer {
        ColumnTransformer {
            numeric: vec!["age".into()],
            categorical: vec!["cp".into(), "restecg".into()],
            binary: vec!["sex".into()],
            drop: vec!["ca".into()],
            handle_unknown: HandleUnknown::Error,
        }
    }

    fn training() -> Table {
        Table::from_rows(
            vec!["age".into(), "cp".into(), "restecg".into(), "sex".into(), "ca".into()],
            vec![
                vec![Cell::Int(40), Cell::Int(1), Cell::Float(0.0), Cell::Int(1), Cell::Float(0.0)],
                vec![Cell::Int(50), Cell::Int(2), Cell::Float(1.0), Cell::Null, Cell::Null],
                vec![Cell::Null, Cell::Int(4), Cell::Float(0.0), Cell::Int(1), Cell::Float(2.0)],
                vec![Cell::Int(60), Cell::Null, Cell::Null, Cell::Int(0), Cell::Float(1.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_feature_names_follow_group_order() {
        let fitted = routing().fit(&training()).unwrap();
        assert_eq!(
            fitted.feature_names(),
            vec!["age", "cp_1", "cp_2", "cp_4", "restecg_1.0", "sex"]
        );
    }

    #[test]
    fn test_numeric_median_impute_then_standardize() {
        let fitted = routing().fit(&training()).unwrap();
        let stats = &fitted.numeric[0];
        assert_eq!(stats.median, 50.0);
        assert_eq!(stats.mean, 50.0);
        let expected_std = (200.0f64 / 4.0).sqrt();
        assert!((stats.scale - expected_std).abs() < 1e-12);
        let x = fitted.transform(&training()).unwrap();
        assert_eq!(x[[2, 0]], 0.0);
    }

    #[test]
    fn test_categorical_mode_ties_pick_smallest() {
        let fitted = routing().fit(&training()).unwrap();
        assert_eq!(fitted.categorical[0].fill, Cell::Int(1));
        let x = fitted.transform(&training()).unwrap();
        // Row 3 has no cp; imputed as 1.
        assert_eq!(x.row(3).iter().skip(1).take(3).copied().collect::<Vec<_>>(), vec![1.0, 0.0, 0.0]);
        // Binary restecg keeps only the second level.
        assert_eq!(x[[1, 4]], 1.0);
        assert_eq!(x[[0, 4]], 0.0);
    }

    #[test]
    fn test_binary_mode_impute() {
        let fitted = routing().fit(&training()).unwrap();
        let x = fitted.transform(&training()).unwrap();
        assert_eq!(x[[1, 5]], 1.0);
    }

    #[test]
    fn test_unknown_category() {
        let fitted = routing().fit(&training()).unwrap();
        let mut test = training();
        test.rows[0][1] = Cell::Int(3);
        assert!(matches!(fitted.transform(&test), Err(MlError::Preprocess(_))));

        let mut lenient = routing();
        lenient.handle_unknown = HandleUnknown::Ignore;
        let fitted = lenient.fit(&training()).unwrap();
        let x = fitted.transform(&test).unwrap();
        assert_eq!(x.row(0).iter().skip(1).take(3).copied().collect::<Vec<_>>(), vec![0.0; 3]);
    }

    #[test]
    fn test_text_feature_rejected() {
        let mut table = training();
        table.rows[0][0] = Cell::Text("forty".into());
        assert!(routing().fit(&table).is_err());
    }

    #[test]
    fn test_overlapping_groups_rejected() {
        let mut bad = routing();
        bad.binary.push("age".into());
        assert!(bad.fit(&training()).is_err());
    }
}
