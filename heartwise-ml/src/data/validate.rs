//! Data quality checks for the combined observation table.
//!
//! Most checks are soft: they report a pass or a warning and the run goes on.
//! The two correlation checks are hard and abort the run with
//! [`MlError::CorrelationThreshold`].

use crate::config::{DataConfig, ValidationConfig, ValueRule};
use crate::data::correlation::{encode_column, feature_associations, predictive_power_score};
use crate::data::schema::{ColumnSchema, infer_schema};
use crate::data::table::{Cell, Table};
use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;

/// How a check came out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    /// Informational only, never a problem.
    Info,
}

/// Result of one check, with the human-readable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: String,
    pub status: CheckStatus,
    pub message: String,
}

impl CheckOutcome {
    fn pass(check: &str, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            status: CheckStatus::Pass,
            message: message.into(),
        }
    }

    fn warn(check: &str, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            status: CheckStatus::Warn,
            message: message.into(),
        }
    }

    fn info(check: &str, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            status: CheckStatus::Info,
            message: message.into(),
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Every outcome of a completed validation run, in check order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub outcomes: Vec<CheckOutcome>,
}

impl ValidationReport {
    pub fn warnings(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == CheckStatus::Warn)
    }

    pub fn is_clean(&self) -> bool {
        self.warnings().next().is_none()
    }
}

/// Python-style list rendering, `['a', 'b']`.
fn quoted_list(items: &[String]) -> String {
    let inner: Vec<String> = items.iter().map(|s| format!("'{s}'")).collect();
    format!("[{}]", inner.join(", "))
}

/// Every source file must carry the `expected` extension.
pub fn check_file_format(paths: &[PathBuf], expected: &str) -> CheckOutcome {
    let offenders: Vec<&PathBuf> = paths
        .iter()
        .filter(|path| {
            path.extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default()
                != expected
        })
        .collect();
    if offenders.is_empty() {
        return CheckOutcome::pass("file_format", "File is in the expected format.");
    }
    for path in &offenders {
        tracing::warn!(path = %path.display(), expected, "Unexpected file extension");
    }
    CheckOutcome::warn(
        "file_format",
        format!("Warning: The file extension is not {expected}"),
    )
}

/// The header must hold exactly the `expected` names, in any order.
pub fn check_column_names(table: &Table, expected: &[String]) -> CheckOutcome {
    let mut found: Vec<&String> = table.columns.iter().collect();
    let mut wanted: Vec<&String> = expected.iter().collect();
    found.sort();
    wanted.sort();
    if found == wanted {
        CheckOutcome::pass("column_names", "Column names are correct.")
    } else {
        CheckOutcome::warn(
            "column_names",
            format!(
                "Warning: Column names do not match. Expected: {}, Found: {}",
                quoted_list(expected),
                quoted_list(&table.columns)
            ),
        )
    }
}

/// Fails with [`MlError::EmptyRows`] when any row has no values at all.
pub fn check_empty_obs(table: &Table) -> Result<CheckOutcome, MlError> {
    let empty = table
        .rows
        .iter()
        .filter(|row| row.iter().all(Cell::is_null))
        .count();
    if empty > 0 {
        let missing_cells = table.null_count();
        tracing::warn!(rows = empty, missing_cells, "Empty rows found");
        return Err(MlError::EmptyRows {
            rows: empty,
            missing_cells,
        });
    }
    Ok(CheckOutcome::pass("empty_obs", "No missing row found."))
}

/// One outcome per column: is its null fraction within `threshold`?
pub fn check_missingness(table: &Table, threshold: f64) -> Vec<CheckOutcome> {
    let rows = table.row_count();
    table
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let nulls = table.rows.iter().filter(|r| r[i].is_null()).count();
            let fraction = if rows == 0 { 0.0 } else { nulls as f64 / rows as f64 };
            if fraction > threshold {
                tracing::debug!(column = %name, fraction, threshold, "Column exceeds missingness threshold");
                CheckOutcome::warn(
                    "missingness",
                    format!("Warning: There're too many missing values in column '{name}'."),
                )
            } else {
                CheckOutcome::pass(
                    "missingness",
                    format!("Column '{name}' passed the test of missingness."),
                )
            }
        })
        .collect()
}

/// Every declared column must exist and hold values of its declared type.
pub fn check_column_types(table: &Table, schema: &[ColumnSchema]) -> CheckOutcome {
    let observed = infer_schema(table);
    let mut problems = Vec::new();
    for expected in schema {
        let Some(actual) = observed.get(&expected.name) else {
            problems.push(format!("column '{}' not in dataframe", expected.name));
            continue;
        };
        if !expected.dtype.accepts(actual.dtype) {
            problems.push(format!(
                "column '{}' expected series of type {}, got {}",
                expected.name, expected.dtype, actual.dtype
            ));
        }
        if !expected.nullable && actual.nullable {
            problems.push(format!(
                "non-nullable column '{}' contains null values",
                expected.name
            ));
        }
    }
    if problems.is_empty() {
        CheckOutcome::pass("column_types", "All columns have correct data types.")
    } else {
        CheckOutcome::warn(
            "column_types",
            format!("Warning: Validation failed: {}", problems.join("; ")),
        )
    }
}

/// Rows equal to some other row on every column, all occurrences listed.
pub fn duplicate_positions(table: &Table) -> Vec<usize> {
    let keys: Vec<String> = table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|c| match c {
                    Cell::Null => "\u{0}".to_string(),
                    other => other.as_f64().map_or_else(|| other.to_field(), |f| f.to_string()),
                })
                .collect::<Vec<_>>()
                .join("\u{1f}")
        })
        .collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for key in &keys {
        *counts.entry(key.as_str()).or_default() += 1;
    }
    keys.iter()
        .enumerate()
        .filter(|(_, k)| counts.get(k.as_str()).is_some_and(|&c| c > 1))
        .map(|(i, _)| i)
        .collect()
}

pub fn check_duplicate_obs(table: &Table) -> CheckOutcome {
    let positions = duplicate_positions(table);
    if positions.is_empty() {
        CheckOutcome::pass("duplicate_obs", "No duplicate rows found.")
    } else {
        tracing::warn!(rows = positions.len(), "Duplicate rows found");
        CheckOutcome::warn(
            "duplicate_obs",
            format!(
                "Warning: There're duplicate rows: \n{}.",
                table.render_rows(&positions)
            ),
        )
    }
}

/// Non-null values must satisfy the rule for their column.
pub fn check_value_ranges(table: &Table, rules: &BTreeMap<String, ValueRule>) -> CheckOutcome {
    let mut details = Vec::new();
    for (column, rule) in rules {
        let Ok(cells) = table.column(column) else {
            details.push(format!("column '{column}' not in dataframe"));
            continue;
        };
        let bad = cells
            .iter()
            .filter(|c| match c {
                Cell::Null => false,
                Cell::Text(_) => true,
                other => other.as_f64().is_some_and(|v| !rule.allows(v)),
            })
            .count();
        if bad > 0 {
            details.push(format!("column '{column}': {bad} value(s) outside the allowed values"));
        }
    }
    if details.is_empty() {
        CheckOutcome::pass("value_ranges", "No outlier or anomalous value found.")
    } else {
        CheckOutcome::warn(
            "value_ranges",
            format!(
                "Warning: There're outlier or anomalous values.\n{}",
                details.join("\n")
            ),
        )
    }
}

/// Class proportions of the label, most frequent first.
pub fn check_target_distribution(table: &Table, label: &str) -> Result<CheckOutcome, MlError> {
    let cells = table.column(label)?;
    let present: Vec<&Cell> = cells.into_iter().filter(|c| !c.is_null()).collect();
    let mut counts: Vec<(Cell, usize)> = table
        .levels(label)?
        .into_iter()
        .map(|level| {
            let n = present
                .iter()
                .filter(|c| match (c.as_f64(), level.as_f64()) {
                    (Some(a), Some(b)) => a == b,
                    _ => **c == &level,
                })
                .count();
            (level, n)
        })
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let total = present.len().max(1) as f64;
    let lines: Vec<String> = counts
        .iter()
        .map(|(level, n)| format!("{level}    {:.4}", *n as f64 / total))
        .collect();
    Ok(CheckOutcome::info(
        "target_distribution",
        format!("Class proportions:\n{}", lines.join("\n")),
    ))
}

/// Every feature's predictive power score for the label must stay below
/// `threshold`.
pub fn check_feature_label_correlation(
    table: &Table,
    label: &str,
    threshold: f64,
    seed: u64,
) -> Result<CheckOutcome, MlError> {
    let target = encode_column(table, label)?;
    let mut offenders = Vec::new();
    for feature in table.columns.iter().filter(|c| c.as_str() != label) {
        let score = predictive_power_score(&encode_column(table, feature)?, &target, seed)?;
        tracing::debug!(feature = %feature, pps = score, "Feature-label predictive power");
        if score >= threshold {
            offenders.push((feature.clone(), score));
        }
    }
    if !offenders.is_empty() {
        return Err(MlError::CorrelationThreshold {
            message: "The correlation between target and features variables exceeds the threshold."
                .to_string(),
            offenders,
        });
    }
    Ok(CheckOutcome::pass(
        "feature_label_correlation",
        format!("Feature-label predictive power is below {threshold} for every feature."),
    ))
}

/// Every feature pair's association must stay below `threshold`.
pub fn check_feature_feature_correlation(
    table: &Table,
    label: &str,
    categorical: &[String],
    threshold: f64,
) -> Result<CheckOutcome, MlError> {
    let features: Vec<String> = table
        .columns
        .iter()
        .filter(|c| c.as_str() != label)
        .cloned()
        .collect();
    let offenders: Vec<(String, f64)> = feature_associations(table, &features, categorical)?
        .into_iter()
        .inspect(|a| {
            tracing::trace!(first = %a.first, second = %a.second, value = a.value, "Feature association");
        })
        .filter(|a| a.value >= threshold)
        .map(|a| (format!("{}-{}", a.first, a.second), a.value))
        .collect();
    if !offenders.is_empty() {
        return Err(MlError::CorrelationThreshold {
            message: "The correlation between features variables exceeds the threshold."
                .to_string(),
            offenders,
        });
    }
    Ok(CheckOutcome::pass(
        "feature_feature_correlation",
        format!("Feature-feature association is below {threshold} for every pair."),
    ))
}

fn log_fatal(e: &MlError) {
    if let MlError::CorrelationThreshold { offenders, .. } = e {
        tracing::error!(?offenders, "{e}");
    }
}

/// Run every check against `table` in order, writing each message to `out`.
///
/// Soft failures, including empty rows, become warnings. A correlation check
/// over its threshold stops the run and is returned as the error.
pub fn run_validation(
    table: &Table,
    sources: &[PathBuf],
    data: &DataConfig,
    config: &ValidationConfig,
    out: &mut dyn Write,
) -> Result<ValidationReport, MlError> {
    let mut report = ValidationReport::default();
    let mut emit = |outcome: CheckOutcome, report: &mut ValidationReport| -> Result<(), MlError> {
        writeln!(out, "{outcome}")?;
        report.outcomes.push(outcome);
        Ok(())
    };

    emit(check_file_format(sources, &config.expected_extension), &mut report)?;
    emit(check_column_names(table, &data.columns), &mut report)?;
    let empty = match check_empty_obs(table) {
        Ok(outcome) => outcome,
        Err(MlError::EmptyRows { missing_cells, .. }) => CheckOutcome::warn(
            "empty_obs",
            format!("Warning: There are {missing_cells} missing values in dataset."),
        ),
        Err(e) => return Err(e),
    };
    emit(empty, &mut report)?;
    for outcome in check_missingness(table, config.missingness_threshold) {
        emit(outcome, &mut report)?;
    }
    emit(check_column_types(table, &config.schema), &mut report)?;
    emit(check_duplicate_obs(table), &mut report)?;
    emit(check_value_ranges(table, &config.value_rules), &mut report)?;
    let distribution = check_target_distribution(table, &data.label)
        .unwrap_or_else(|e| CheckOutcome::warn("target_distribution", format!("Warning: {e}")));
    emit(distribution, &mut report)?;

    let label_check = check_feature_label_correlation(
        table,
        &data.label,
        config.feature_label_threshold,
        config.seed,
    )
    .inspect_err(log_fatal)?;
    emit(label_check, &mut report)?;
    let feature_check = check_feature_feature_correlation(
        table,
        &data.label,
        &config.categorical_features,
        config.feature_feature_threshold,
    )
    .inspect_err(log_fatal)?;
    emit(feature_check, &mut report)?;

    tracing::info!(
        checks = report.outcomes.len(),
        warnings = report.warnings().count(),
        "Validation finished"
    );
    Ok(report)
}
