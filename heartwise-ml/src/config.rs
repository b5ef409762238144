//! Pipeline configuration.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment. Every stage receives the section it
//! needs explicitly; nothing reads process-wide constants.

use crate::data::schema::{ColumnSchema, ColumnType};
use crate::error::MlError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the workspace-level configuration file.
pub const WORKSPACE_CONFIG_FILE: &str = "heartwise.toml";

/// Top-level configuration for the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

/// File locations used by the full pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Raw per-site files, combined in this order.
    #[serde(default = "default_source_files")]
    pub source_files: Vec<PathBuf>,
    /// Combined (and later cleaned, in place) table.
    #[serde(default = "default_combined_file")]
    pub combined_file: PathBuf,
    /// Folder holding `train_df.csv` / `test_df.csv`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Folder for the transformer artifact and transformed tables.
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,
    /// Folder for classification reports.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_files: default_source_files(),
            combined_file: default_combined_file(),
            data_dir: default_data_dir(),
            processed_dir: default_processed_dir(),
            results_dir: default_results_dir(),
        }
    }
}

fn default_source_files() -> Vec<PathBuf> {
    ["hungarian", "switzerland", "cleveland", "va"]
        .iter()
        .map(|site| PathBuf::from(format!("data/processed.{site}.data")))
        .collect()
}

fn default_combined_file() -> PathBuf {
    PathBuf::from("data/combined_df.csv")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from("data/processed")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

/// Observation table layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Canonical column names, in file order.
    #[serde(default = "default_columns")]
    pub columns: Vec<String>,
    /// Tokens read as missing values.
    #[serde(default = "default_missing_markers")]
    pub missing_markers: Vec<String>,
    /// Target column.
    #[serde(default = "default_label")]
    pub label: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            missing_markers: default_missing_markers(),
            label: default_label(),
        }
    }
}

pub fn default_columns() -> Vec<String> {
    [
        "age", "sex", "cp", "trestbps", "chol", "fbs", "restecg", "thalach", "exang", "oldpeak",
        "slope", "ca", "thal", "label",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

fn default_missing_markers() -> Vec<String> {
    vec!["?".to_string()]
}

fn default_label() -> String {
    "label".to_string()
}

/// A permitted-values rule for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueRule {
    /// Inclusive numeric range.
    Range { min: f64, max: f64 },
    /// Fixed set of numeric codes.
    OneOf { values: Vec<f64> },
}

impl ValueRule {
    pub fn allows(&self, value: f64) -> bool {
        match self {
            ValueRule::Range { min, max } => value >= *min && value <= *max,
            ValueRule::OneOf { values } => values.iter().any(|v| *v == value),
        }
    }
}

/// Data validation thresholds and expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Extension every source file must carry.
    #[serde(default = "default_extension")]
    pub expected_extension: String,
    /// Maximum tolerated null fraction per column.
    #[serde(default = "default_missingness_threshold")]
    pub missingness_threshold: f64,
    /// Feature-label predictive power score at or above which the run aborts.
    #[serde(default = "default_correlation_threshold")]
    pub feature_label_threshold: f64,
    /// Feature-feature association at or above which the run aborts.
    #[serde(default = "default_correlation_threshold")]
    pub feature_feature_threshold: f64,
    /// Features treated as categorical by the correlation checks.
    #[serde(default = "default_validation_categorical")]
    pub categorical_features: Vec<String>,
    /// Expected primitive type per column.
    #[serde(default = "default_schema")]
    pub schema: Vec<ColumnSchema>,
    /// Permitted values per column.
    #[serde(default = "default_value_rules")]
    pub value_rules: BTreeMap<String, ValueRule>,
    /// Seed for the predictive-power-score folds.
    #[serde(default = "default_validation_seed")]
    pub seed: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            expected_extension: default_extension(),
            missingness_threshold: default_missingness_threshold(),
            feature_label_threshold: default_correlation_threshold(),
            feature_feature_threshold: default_correlation_threshold(),
            categorical_features: default_validation_categorical(),
            schema: default_schema(),
            value_rules: default_value_rules(),
            seed: default_validation_seed(),
        }
    }
}

fn default_extension() -> String {
    ".data".to_string()
}

fn default_missingness_threshold() -> f64 {
    0.05
}

fn default_correlation_threshold() -> f64 {
    0.9
}

fn default_validation_seed() -> u64 {
    42
}

fn default_validation_categorical() -> Vec<String> {
    ["sex", "cp", "fbs", "restecg", "exang", "slope", "ca", "thal"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_schema() -> Vec<ColumnSchema> {
    default_columns()
        .into_iter()
        .map(|name| {
            let dtype = if name == "label" {
                ColumnType::Integer
            } else {
                ColumnType::Float
            };
            ColumnSchema {
                name,
                dtype,
                nullable: true,
            }
        })
        .collect()
}

fn default_value_rules() -> BTreeMap<String, ValueRule> {
    let range = |min: f64, max: f64| ValueRule::Range { min, max };
    let one_of = |values: &[f64]| ValueRule::OneOf {
        values: values.to_vec(),
    };
    BTreeMap::from([
        ("age".to_string(), range(0.0, 120.0)),
        ("sex".to_string(), one_of(&[0.0, 1.0])),
        ("cp".to_string(), one_of(&[1.0, 2.0, 3.0, 4.0])),
        ("trestbps".to_string(), range(20.0, 220.0)),
        ("chol".to_string(), range(50.0, 800.0)),
        ("fbs".to_string(), one_of(&[0.0, 1.0])),
        ("restecg".to_string(), one_of(&[0.0, 1.0, 2.0])),
        ("thalach".to_string(), range(50.0, 240.0)),
        ("exang".to_string(), one_of(&[0.0, 1.0])),
        ("oldpeak".to_string(), range(0.0, 7.0)),
        ("slope".to_string(), one_of(&[1.0, 2.0, 3.0])),
        ("ca".to_string(), range(0.0, 4.0)),
        ("thal".to_string(), one_of(&[3.0, 6.0, 7.0])),
        ("label".to_string(), range(0.0, 4.0)),
    ])
}

/// Dataset-specific clean-up steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// Row positions of known duplicates, dropped before casting.
    #[serde(default = "default_duplicate_rows")]
    pub duplicate_rows: Vec<usize>,
    /// Columns cast to floating point.
    #[serde(default = "default_float_columns")]
    pub float_columns: Vec<String>,
    /// Columns cast to categorical as-is.
    #[serde(default = "default_categorical_columns")]
    pub categorical_columns: Vec<String>,
    /// Columns coerced to numeric (invalid tokens become null) before the
    /// categorical cast, so `1` and `1.0` form one level.
    #[serde(default = "default_coerced_categorical_columns")]
    pub coerced_categorical_columns: Vec<String>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            duplicate_rows: default_duplicate_rows(),
            float_columns: default_float_columns(),
            categorical_columns: default_categorical_columns(),
            coerced_categorical_columns: default_coerced_categorical_columns(),
        }
    }
}

fn default_duplicate_rows() -> Vec<usize> {
    vec![102, 187]
}

fn default_float_columns() -> Vec<String> {
    to_strings(&["trestbps", "chol", "thalach", "oldpeak"])
}

fn default_categorical_columns() -> Vec<String> {
    to_strings(&["label", "sex", "cp"])
}

fn default_coerced_categorical_columns() -> Vec<String> {
    to_strings(&["exang", "thal", "fbs", "ca", "slope", "restecg"])
}

/// Train/test split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_split_seed")]
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            seed: default_split_seed(),
        }
    }
}

fn default_test_size() -> f64 {
    0.3
}

fn default_split_seed() -> u64 {
    123
}

/// What to do with a category first seen at transform time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleUnknown {
    #[default]
    Error,
    Ignore,
}

/// Column routing for the preprocessing transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Median-imputed, standardized.
    #[serde(default = "default_numeric_features")]
    pub numeric_features: Vec<String>,
    /// Mode-imputed, one-hot encoded.
    #[serde(default = "default_categorical_features")]
    pub categorical_features: Vec<String>,
    /// Mode-imputed only.
    #[serde(default = "default_binary_features")]
    pub binary_features: Vec<String>,
    /// Excluded entirely.
    #[serde(default = "default_drop_features")]
    pub drop_features: Vec<String>,
    #[serde(default)]
    pub handle_unknown: HandleUnknown,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            numeric_features: default_numeric_features(),
            categorical_features: default_categorical_features(),
            binary_features: default_binary_features(),
            drop_features: default_drop_features(),
            handle_unknown: HandleUnknown::default(),
        }
    }
}

fn default_numeric_features() -> Vec<String> {
    to_strings(&["age", "trestbps", "chol", "thalach", "oldpeak"])
}

fn default_categorical_features() -> Vec<String> {
    to_strings(&["cp", "restecg"])
}

fn default_binary_features() -> Vec<String> {
    to_strings(&["sex", "exang", "fbs"])
}

fn default_drop_features() -> Vec<String> {
    to_strings(&["thal", "ca", "slope"])
}

/// Cross-validation metric used to rank search candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    #[default]
    Accuracy,
    RocAuc,
}

impl std::str::FromStr for Scoring {
    type Err = MlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accuracy" => Ok(Scoring::Accuracy),
            "roc_auc" => Ok(Scoring::RocAuc),
            other => Err(MlError::config(format!("unknown scoring '{other}'"))),
        }
    }
}

/// Randomized hyperparameter search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Seed for candidate sampling.
    #[serde(default = "default_training_seed")]
    pub seed: u64,
    /// Sampled configurations per model family.
    #[serde(default = "default_n_iter")]
    pub n_iter: usize,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    #[serde(default)]
    pub scoring: Scoring,
    /// Iteration cap for the logistic regression optimizer.
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: default_training_seed(),
            n_iter: default_n_iter(),
            cv_folds: default_cv_folds(),
            scoring: Scoring::default(),
            max_iter: default_max_iter(),
        }
    }
}

fn default_training_seed() -> u64 {
    999
}

fn default_n_iter() -> usize {
    10
}

fn default_cv_folds() -> usize {
    5
}

fn default_max_iter() -> usize {
    1000
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `HEARTWISE_`, `__` for nesting)
/// 2. Explicit config file, or `heartwise.toml` in the workspace
/// 3. User config (`~/.config/heartwise/config.toml`)
/// 4. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<PipelineConfig, MlError> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("org", "heartwise", "heartwise") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(MlError::FileNotFound(path.to_path_buf()));
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            if let Some(ws) = workspace {
                let ws_config = ws.join(WORKSPACE_CONFIG_FILE);
                if ws_config.exists() {
                    figment = figment.merge(Toml::file(&ws_config));
                }
            }
        }
    }

    // HEARTWISE_TRAINING__SEED, HEARTWISE_SPLIT__TEST_SIZE, etc.
    figment = figment.merge(Env::prefixed("HEARTWISE_").split("__"));

    figment
        .extract()
        .map_err(|e| MlError::config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_cover_every_column() {
        let config = PipelineConfig::default();
        assert_eq!(config.data.columns.len(), 14);
        assert_eq!(config.validation.schema.len(), 14);
        for col in &config.data.columns {
            assert!(
                config.validation.value_rules.contains_key(col),
                "missing value rule for {col}"
            );
        }
    }

    #[test]
    fn test_preprocess_groups_are_disjoint() {
        let p = PreprocessConfig::default();
        let mut all: Vec<&String> = p
            .numeric_features
            .iter()
            .chain(&p.categorical_features)
            .chain(&p.binary_features)
            .chain(&p.drop_features)
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
        assert_eq!(total, 13);
    }

    #[test]
    fn test_value_rule_allows() {
        let sex = ValueRule::OneOf {
            values: vec![0.0, 1.0],
        };
        assert!(sex.allows(1.0));
        assert!(!sex.allows(2.0));
        let age = ValueRule::Range {
            min: 0.0,
            max: 120.0,
        };
        assert!(age.allows(120.0));
        assert!(!age.allows(-1.0));
    }

    #[test]
    fn test_load_config_from_workspace_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(WORKSPACE_CONFIG_FILE),
            "[training]\nn_iter = 3\nscoring = \"roc_auc\"\n\n[split]\ntest_size = 0.25\n",
        )
        .unwrap();
        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.training.n_iter, 3);
        assert_eq!(config.training.scoring, Scoring::RocAuc);
        assert_eq!(config.split.test_size, 0.25);
        assert_eq!(config.training.cv_folds, 5);
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let err = load_config(None, Some(Path::new("/nonexistent/heartwise.toml"))).unwrap_err();
        assert!(matches!(err, MlError::FileNotFound(_)));
    }

    #[test]
    fn test_scoring_from_str() {
        assert_eq!("accuracy".parse::<Scoring>().unwrap(), Scoring::Accuracy);
        assert_eq!("roc_auc".parse::<Scoring>().unwrap(), Scoring::RocAuc);
        assert!("f1".parse::<Scoring>().is_err());
    }
}
