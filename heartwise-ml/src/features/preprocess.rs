//! Fit the column transformer on the training split and persist the
//! transformed tables next to the raw feature/label splits.

use crate::config::PreprocessConfig;
use crate::data::split::{TEST_FILE, TRAIN_FILE};
use crate::data::table::Table;
use crate::error::MlError;
use crate::features::transforms::{ColumnTransformer, FittedTransformer};
use crate::persistence::{atomic_write_json, hash_file, load_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const PREPROCESSOR_FILE: &str = "preprocessor.json";
pub const PROCESSED_X_TRAIN_FILE: &str = "processed_X_train.csv";
pub const PROCESSED_X_TEST_FILE: &str = "processed_X_test.csv";
pub const X_TRAIN_FILE: &str = "x_train.csv";
pub const X_TEST_FILE: &str = "x_test.csv";
pub const Y_TRAIN_FILE: &str = "y_train.csv";
pub const Y_TEST_FILE: &str = "y_test.csv";

/// The persisted transformer with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessorArtifact {
    pub created_at: DateTime<Utc>,
    /// SHA-256 of the training file the transformer was fit on.
    pub train_sha256: String,
    pub feature_names: Vec<String>,
    pub transformer: FittedTransformer,
}

impl PreprocessorArtifact {
    pub fn load(path: &Path) -> Result<Self, MlError> {
        load_json(path)
    }
}

/// Tables produced by [`preprocess`].
#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    pub artifact: PreprocessorArtifact,
    pub x_train: Table,
    pub x_test: Table,
    pub y_train: Table,
    pub y_test: Table,
    pub processed_train: Table,
    pub processed_test: Table,
}

/// Split a table into its feature columns and its one-column label table.
pub fn split_features_label(table: &Table, label: &str) -> Result<(Table, Table), MlError> {
    let features = table.drop_columns(&[label.to_string()])?;
    let target = table.select(&[label.to_string()])?;
    Ok((features, target))
}

/// Read `train_df.csv`/`test_df.csv` from `data_folder`, fit the transformer
/// on the training features only and write every artifact into
/// `output_folder`.
pub fn preprocess(
    data_folder: &Path,
    output_folder: &Path,
    config: &PreprocessConfig,
    label: &str,
    missing_markers: &[String],
) -> Result<PreprocessOutput, MlError> {
    let train_path = data_folder.join(TRAIN_FILE);
    let train = Table::read_csv(&train_path, missing_markers)?;
    let test = Table::read_csv(&data_folder.join(TEST_FILE), missing_markers)?;

    let (x_train, y_train) = split_features_label(&train, label)?;
    let (x_test, y_test) = split_features_label(&test, label)?;

    let transformer = ColumnTransformer::from(config).fit(&x_train)?;
    let processed_train = transformer.transform_table(&x_train)?;
    let processed_test = transformer.transform_table(&x_test)?;

    std::fs::create_dir_all(output_folder)?;
    let artifact = PreprocessorArtifact {
        created_at: Utc::now(),
        train_sha256: hash_file(&train_path)?,
        feature_names: transformer.feature_names(),
        transformer,
    };
    atomic_write_json(&output_folder.join(PREPROCESSOR_FILE), &artifact)?;
    for (name, table) in [
        (PROCESSED_X_TRAIN_FILE, &processed_train),
        (PROCESSED_X_TEST_FILE, &processed_test),
        (X_TRAIN_FILE, &x_train),
        (X_TEST_FILE, &x_test),
        (Y_TRAIN_FILE, &y_train),
        (Y_TEST_FILE, &y_test),
    ] {
        table.write_csv(&output_folder.join(name))?;
    }

    tracing::info!(
        train_rows = x_train.row_count(),
        test_rows = x_test.row_count(),
        features_out = artifact.feature_names.len(),
        dir = %output_folder.display(),
        "Preprocessing complete"
    );
    Ok(PreprocessOutput {
        artifact,
        x_train,
        x_test,
        y_train,
        y_test,
        processed_train,
        processed_test,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::Cell;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_split(dir: &Path) {
        let columns: Vec<String> = ["age", "cp", "sex", "ca", "label"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let row = |age: f64, cp: i64, sex: i64, label: i64| {
            vec![Cell::Float(age), Cell::Int(cp), Cell::Int(sex), Cell::Null, Cell::Int(label)]
        };
        let train = Table::from_rows(
            columns.clone(),
            vec![row(40.0, 1, 0, 0), row(50.0, 2, 1, 1), row(60.0, 4, 1, 2), row(55.0, 2, 0, 0)],
        )
        .unwrap();
        let test = Table::from_rows(columns, vec![row(45.0, 4, 1, 1), row(65.0, 1, 0, 0)]).unwrap();
        train.write_csv(&dir.join(TRAIN_FILE)).unwrap();
        test.write_csv(&dir.join(TEST_FILE)).unwrap();
    }

    fn small_config() -> PreprocessConfig {
        PreprocessConfig {
            numeric_features: vec!["age".into()],
            categorical_features: vec!["cp".into()],
            binary_features: vec!["sex".into()],
            drop_features: vec!["ca".into()],
            ..PreprocessConfig::default()
        }
    }

    #[test]
    fn test_preprocess_writes_all_artifacts() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_split(data.path());
        let output = preprocess(data.path(), out.path(), &small_config(), "label", &[]).unwrap();

        for name in [
            PREPROCESSOR_FILE,
            PROCESSED_X_TRAIN_FILE,
            PROCESSED_X_TEST_FILE,
            X_TRAIN_FILE,
            X_TEST_FILE,
            Y_TRAIN_FILE,
            Y_TEST_FILE,
        ] {
            assert!(out.path().join(name).exists(), "{name} missing");
        }
        assert_eq!(output.artifact.feature_names, vec!["age", "cp_1", "cp_2", "cp_4", "sex"]);
        assert_eq!(output.processed_train.columns, output.processed_test.columns);
        assert_eq!(output.y_train.columns, vec!["label"]);
        assert!(output.x_train.column_index("label").is_none());
    }

    #[test]
    fn test_artifact_round_trips_and_matches_transform() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_split(data.path());
        let output = preprocess(data.path(), out.path(), &small_config(), "label", &[]).unwrap();
        let loaded = PreprocessorArtifact::load(&out.path().join(PREPROCESSOR_FILE)).unwrap();
        assert_eq!(loaded.feature_names, output.artifact.feature_names);
        assert_eq!(loaded.train_sha256, output.artifact.train_sha256);
        assert_eq!(loaded.train_sha256.len(), 64);
        let reloaded = loaded.transformer.transform(&output.x_test).unwrap();
        let expected = output.artifact.transformer.transform(&output.x_test).unwrap();
        assert!(reloaded.iter().zip(expected.iter()).all(|(a, b)| (a - b).abs() < 1e-9));
    }

    #[test]
    fn test_missing_label_column() {
        let table = Table::from_rows(vec!["age".into()], vec![vec![Cell::Int(1)]]).unwrap();
        assert!(split_features_label(&table, "label").is_err());
    }

    #[test]
    fn test_missing_split_file() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let err = preprocess(data.path(), out.path(), &small_config(), "label", &[]).unwrap_err();
        assert!(matches!(err, MlError::FileNotFound(_)));
    }
}
