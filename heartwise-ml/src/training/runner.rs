//! Model search, test-set evaluation and report output.

use crate::algorithms::ModelFamily;
use crate::config::{Scoring, TrainingConfig};
use crate::data::table::Table;
use crate::error::MlError;
use crate::features::transforms::ColumnTransformer;
use crate::persistence::{atomic_write, atomic_write_json};
use crate::training::metrics::{ClassificationMetrics, format_confusion_matrix, roc_auc_score};
use crate::training::pipeline::LabelEncoding;
use crate::training::search::{RandomizedSearch, SearchOutcome};
use crate::training::sweep::{HyperparamSweep, ParamSet, format_params};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

pub const RESULTS_FILE: &str = "model_evaluation_results.txt";
pub const SUMMARY_FILE: &str = "search_summary.json";

const RULE: &str = "----------------------------------------";

/// Search and test results for one family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub family: ModelFamily,
    pub best_params: ParamSet,
    pub best_cv_score: f64,
    pub test_metrics: ClassificationMetrics,
    pub sweep: HyperparamSweep,
}

/// Everything one training run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub created_at: DateTime<Utc>,
    pub seed: u64,
    pub scoring: Scoring,
    pub classes: Vec<String>,
    pub models: Vec<ModelSummary>,
}

/// Tune every model family on the training data, evaluate each winner on the
/// test data and write the reports into `output_dir`.
///
/// Progress lines go to `out`. `transformer`, when given, is refit inside
/// every cross-validation fold; without it the feature tables must already
/// be numeric.
#[allow(clippy::too_many_arguments)]
pub fn models_fit_and_result_output(
    transformer: Option<&ColumnTransformer>,
    x_train: &Table,
    y_train: &Table,
    x_test: &Table,
    y_test: &Table,
    output_dir: &Path,
    config: &TrainingConfig,
    out: &mut dyn Write,
) -> Result<TrainingSummary, MlError> {
    if !output_dir.is_dir() {
        return Err(MlError::FileNotFound(output_dir.to_path_buf()));
    }
    let encoding = LabelEncoding::fit(&[y_train, y_test])?;
    let train_labels = encoding.encode(y_train)?;
    let test_labels = encoding.encode(y_test)?;
    let names = encoding.names();
    tracing::info!(
        train_rows = x_train.row_count(),
        test_rows = x_test.row_count(),
        classes = names.len(),
        "Starting model search"
    );

    let mut log = String::new();
    let mut searched: Vec<SearchOutcome> = Vec::new();
    for family in ModelFamily::ALL {
        let line = format!("Tuning hyperparameters for {family} using RandomizedSearchCV...");
        writeln!(out, "{line}")?;
        log.push_str(&line);
        log.push('\n');

        let outcome = RandomizedSearch::new(family, config).fit(
            transformer,
            x_train,
            &train_labels,
            encoding.n_classes(),
        )?;

        let line = format!(
            "Best parameters for {family}: {}",
            format_params(&outcome.best_params)
        );
        writeln!(out, "{line}\n{RULE}")?;
        log.push_str(&format!("{line}\n{RULE}\n"));
        searched.push(outcome);
    }

    let mut models = Vec::with_capacity(searched.len());
    for outcome in searched {
        let family = outcome.sweep.family;
        let line = format!("Evaluating {family} on test set...");
        writeln!(out, "{line}")?;

        let predicted = outcome.best_pipeline.predict(x_test)?;
        let mut metrics = ClassificationMetrics::compute(&test_labels, &predicted, &names)?;
        metrics.auc_roc = outcome
            .best_pipeline
            .predict_proba(x_test)
            .and_then(|proba| roc_auc_score(&test_labels, &proba))
            .inspect_err(|e| tracing::debug!(%family, error = %e, "Test AUC unavailable"))
            .ok();

        let report = metrics.report(2);
        writeln!(out, "Classification Report:\n{report}")?;
        atomic_write(&output_dir.join(family.report_file_name()), report.as_bytes())?;

        log.push_str(&format!(
            "{line}\nClassification Report:\n{report}\nConfusion Matrix:\n{}\n{RULE}\n",
            format_confusion_matrix(&metrics.confusion_matrix)
        ));
        tracing::info!(%family, accuracy = metrics.accuracy, "Evaluated on test set");

        models.push(ModelSummary {
            family,
            best_params: outcome.best_params,
            best_cv_score: outcome.best_score,
            test_metrics: metrics,
            sweep: outcome.sweep,
        });
    }

    atomic_write(&output_dir.join(RESULTS_FILE), log.as_bytes())?;
    let summary = TrainingSummary {
        created_at: Utc::now(),
        seed: config.seed,
        scoring: config.scoring,
        classes: names,
        models,
    };
    atomic_write_json(&output_dir.join(SUMMARY_FILE), &summary)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::Cell;
    use tempfile::TempDir;

    /// Three well-separated classes on two numeric features.
    fn three_class(n: usize, shift: usize) -> (Table, Table) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..n {
            let class = (i + shift) % 3;
            let jitter = ((i * 31) % 7) as f64 / 7.0;
            x.push(vec![
                Cell::Float(class as f64 * 5.0 + jitter),
                Cell::Float(jitter - class as f64 * 5.0),
            ]);
            y.push(vec![Cell::Int(class as i64)]);
        }
        (
            Table::from_rows(vec!["f1".into(), "f2".into()], x).unwrap(),
            Table::from_rows(vec!["label".into()], y).unwrap(),
        )
    }

    fn fast_config() -> TrainingConfig {
        TrainingConfig {
            n_iter: 2,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_writes_reports_for_every_family() {
        let dir = TempDir::new().unwrap();
        let (x_train, y_train) = three_class(60, 0);
        let (x_test, y_test) = three_class(15, 1);
        let mut out = Vec::new();
        let summary = models_fit_and_result_output(
            None,
            &x_train,
            &y_train,
            &x_test,
            &y_test,
            dir.path(),
            &fast_config(),
            &mut out,
        )
        .unwrap();

        for family in ModelFamily::ALL {
            let text = std::fs::read_to_string(dir.path().join(family.report_file_name())).unwrap();
            for word in ["precision", "recall", "f1-score"] {
                assert!(text.contains(word), "{family} report lacks {word}");
            }
        }
        assert!(dir.path().join("classification_report_K-Nearest_Neighbors.txt").exists());
        assert_eq!(summary.models.len(), 4);
        assert_eq!(summary.classes, vec!["0", "1", "2"]);

        let results = std::fs::read_to_string(dir.path().join(RESULTS_FILE)).unwrap();
        assert!(results.contains("Confusion Matrix:"));
        assert!(results.contains("Best parameters for Decision Tree: {"));
        assert!(dir.path().join(SUMMARY_FILE).exists());
    }

    #[test]
    fn test_progress_lines() {
        let dir = TempDir::new().unwrap();
        let (x_train, y_train) = three_class(45, 0);
        let (x_test, y_test) = three_class(9, 2);
        let mut out = Vec::new();
        models_fit_and_result_output(
            None,
            &x_train,
            &y_train,
            &x_test,
            &y_test,
            dir.path(),
            &fast_config(),
            &mut out,
        )
        .unwrap();
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Tuning hyperparameters for Logistic Regression using RandomizedSearchCV..."));
        assert!(printed.contains("Best parameters for Support Vector Machine: {'C': "));
        assert!(printed.contains("Evaluating K-Nearest Neighbors on test set..."));
        let tuning = printed.find("Tuning hyperparameters for K-Nearest").unwrap();
        let evaluating = printed.find("Evaluating Logistic Regression").unwrap();
        assert!(tuning < evaluating);
    }

    #[test]
    fn test_missing_output_dir() {
        let (x, y) = three_class(30, 0);
        let err = models_fit_and_result_output(
            None,
            &x,
            &y,
            &x,
            &y,
            Path::new("/nonexistent/results"),
            &fast_config(),
            &mut std::io::sink(),
        )
        .unwrap_err();
        assert!(matches!(err, MlError::FileNotFound(_)));
    }
}
