//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use anyhow::Context;
use heartwise_ml::config::{PipelineConfig, WORKSPACE_CONFIG_FILE};
use heartwise_ml::data::{clean_csv, combine_to_csv, run_validation, split_to_files};
use heartwise_ml::features::preprocess::{
    PreprocessorArtifact, X_TEST_FILE, X_TRAIN_FILE, Y_TEST_FILE, Y_TRAIN_FILE,
};
use heartwise_ml::features::{ColumnTransformer, preprocess};
use heartwise_ml::{Table, load_config, models_fit_and_result_output};
use std::path::{Path, PathBuf};

/// Handle a CLI subcommand.
pub fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    if let Commands::Config {
        action: ConfigAction::Init,
    } = command
    {
        return init_config(workspace);
    }

    let config = load_config(Some(workspace), config_path)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let paths = Paths::new(workspace, &config);

    match command {
        Commands::Combine { input, output } => {
            let input = or_default(input, &paths.sources);
            let output = output.unwrap_or_else(|| paths.combined.clone());
            let table = combine_to_csv(
                &input,
                &config.data.columns,
                &config.data.missing_markers,
                &output,
            )?;
            println!(
                "Combined {} rows from {} files into {}",
                table.row_count(),
                input.len(),
                output.display()
            );
            Ok(())
        }
        Commands::Validate { input, source } => {
            let input = input.unwrap_or_else(|| paths.combined.clone());
            let source = or_default(source, &paths.sources);
            validate(&input, &source, &config)
        }
        Commands::Clean { path } => {
            let path = path.unwrap_or_else(|| paths.combined.clone());
            let cleaned = clean_csv(&path, &config.cleaning, &config.data.missing_markers)?;
            println!("Cleaned {} rows in {}", cleaned.row_count(), path.display());
            Ok(())
        }
        Commands::Split {
            input,
            output_folder,
            test_size,
            seed,
        } => {
            let input = input.unwrap_or_else(|| paths.combined.clone());
            let output_folder = output_folder.unwrap_or_else(|| paths.data_dir.clone());
            let mut split = config.split.clone();
            if let Some(test_size) = test_size {
                split.test_size = test_size;
            }
            if let Some(seed) = seed {
                split.seed = seed;
            }
            let table = Table::read_csv(&input, &config.data.missing_markers)?;
            std::fs::create_dir_all(&output_folder)?;
            let (train, test) = split_to_files(&table, &output_folder, &split)?;
            println!(
                "Split {} rows into {} train / {} test in {}",
                table.row_count(),
                train.row_count(),
                test.row_count(),
                output_folder.display()
            );
            Ok(())
        }
        Commands::Preprocess {
            data_folder,
            output_folder,
        } => {
            let data_folder = data_folder.unwrap_or_else(|| paths.data_dir.clone());
            let output_folder = output_folder.unwrap_or_else(|| paths.processed.clone());
            run_preprocess(&data_folder, &output_folder, &config)?;
            Ok(())
        }
        Commands::Train {
            x_train,
            y_train,
            x_test,
            y_test,
            preprocessor,
            output_dir,
            seed,
            scoring,
        } => {
            let mut training = config.training.clone();
            if let Some(seed) = seed {
                training.seed = seed;
            }
            if let Some(scoring) = scoring {
                training.scoring = scoring.parse()?;
            }
            let transformer = preprocessor
                .map(|p| {
                    PreprocessorArtifact::load(&p)
                        .with_context(|| format!("loading preprocessor {}", p.display()))
                })
                .transpose()?
                .map(|artifact| artifact.transformer.routing);
            let inputs = TrainInputs::read(&x_train, &y_train, &x_test, &y_test, &config)?;
            let output_dir = output_dir.unwrap_or_else(|| paths.results.clone());
            train(
                transformer.as_ref(),
                &inputs,
                &output_dir,
                &PipelineConfig { training, ..config },
            )
        }
        Commands::Run => run_all(&paths, &config),
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let toml_str = toml::to_string_pretty(&config)?;
                println!("{}", toml_str);
                Ok(())
            }
            ConfigAction::Init => init_config(workspace),
        },
    }
}

/// Configured paths resolved against the workspace.
struct Paths {
    sources: Vec<PathBuf>,
    combined: PathBuf,
    data_dir: PathBuf,
    processed: PathBuf,
    results: PathBuf,
}

impl Paths {
    fn new(workspace: &Path, config: &PipelineConfig) -> Self {
        let resolve = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                workspace.join(p)
            }
        };
        Self {
            sources: config.paths.source_files.iter().map(resolve).collect(),
            combined: resolve(&config.paths.combined_file),
            data_dir: resolve(&config.paths.data_dir),
            processed: resolve(&config.paths.processed_dir),
            results: resolve(&config.paths.results_dir),
        }
    }
}

fn or_default(given: Vec<PathBuf>, default: &[PathBuf]) -> Vec<PathBuf> {
    if given.is_empty() {
        default.to_vec()
    } else {
        given
    }
}

fn init_config(workspace: &Path) -> anyhow::Result<()> {
    let config_path = workspace.join(WORKSPACE_CONFIG_FILE);
    if config_path.exists() {
        println!(
            "Configuration file already exists at: {}",
            config_path.display()
        );
        return Ok(());
    }
    let toml_str = toml::to_string_pretty(&PipelineConfig::default())?;
    std::fs::write(&config_path, &toml_str)?;
    println!(
        "Created default configuration at: {}",
        config_path.display()
    );
    Ok(())
}

fn validate(input: &Path, sources: &[PathBuf], config: &PipelineConfig) -> anyhow::Result<()> {
    let table = Table::read_csv(input, &config.data.missing_markers)?;
    let mut stdout = std::io::stdout().lock();
    let report = run_validation(
        &table,
        sources,
        &config.data,
        &config.validation,
        &mut stdout,
    )?;
    let warnings = report.warnings().count();
    if warnings > 0 {
        tracing::warn!(warnings, "Validation finished with warnings");
    }
    Ok(())
}

fn run_preprocess(
    data_folder: &Path,
    output_folder: &Path,
    config: &PipelineConfig,
) -> anyhow::Result<PreprocessorArtifact> {
    let output = preprocess(
        data_folder,
        output_folder,
        &config.preprocess,
        &config.data.label,
        &config.data.missing_markers,
    )?;
    println!(
        "Preprocessing complete. Files saved in {}.",
        output_folder.display()
    );
    Ok(output.artifact)
}

/// Raw feature and label tables for training.
struct TrainInputs {
    x_train: Table,
    y_train: Table,
    x_test: Table,
    y_test: Table,
}

impl TrainInputs {
    fn read(
        x_train: &Path,
        y_train: &Path,
        x_test: &Path,
        y_test: &Path,
        config: &PipelineConfig,
    ) -> anyhow::Result<Self> {
        let read = |p: &Path| {
            Table::read_csv(p, &config.data.missing_markers)
                .with_context(|| format!("reading {}", p.display()))
        };
        Ok(Self {
            x_train: read(x_train)?,
            y_train: read(y_train)?,
            x_test: read(x_test)?,
            y_test: read(y_test)?,
        })
    }
}

fn train(
    transformer: Option<&ColumnTransformer>,
    inputs: &TrainInputs,
    output_dir: &Path,
    config: &PipelineConfig,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(output_dir)?;
    let mut stdout = std::io::stdout().lock();
    let summary = models_fit_and_result_output(
        transformer,
        &inputs.x_train,
        &inputs.y_train,
        &inputs.x_test,
        &inputs.y_test,
        output_dir,
        &config.training,
        &mut stdout,
    )?;
    tracing::info!(
        models = summary.models.len(),
        dir = %output_dir.display(),
        "Training reports written"
    );
    Ok(())
}

fn run_all(paths: &Paths, config: &PipelineConfig) -> anyhow::Result<()> {
    let markers = &config.data.missing_markers;

    let combined = combine_to_csv(&paths.sources, &config.data.columns, markers, &paths.combined)?;
    validate(&paths.combined, &paths.sources, config)?;
    tracing::debug!(rows = combined.row_count(), "Validated combined data");

    let cleaned = clean_csv(&paths.combined, &config.cleaning, markers)?;
    std::fs::create_dir_all(&paths.data_dir)?;
    split_to_files(&cleaned, &paths.data_dir, &config.split)?;

    let artifact = run_preprocess(&paths.data_dir, &paths.processed, config)?;
    let inputs = TrainInputs::read(
        &paths.processed.join(X_TRAIN_FILE),
        &paths.processed.join(Y_TRAIN_FILE),
        &paths.processed.join(X_TEST_FILE),
        &paths.processed.join(Y_TEST_FILE),
        config,
    )?;
    train(
        Some(&artifact.transformer.routing),
        &inputs,
        &paths.results,
        config,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_paths_resolve_against_workspace() {
        let config = PipelineConfig::default();
        let paths = Paths::new(Path::new("/work"), &config);
        assert_eq!(paths.combined, PathBuf::from("/work/data/combined_df.csv"));
        assert_eq!(paths.sources.len(), 4);
        assert!(paths.sources.iter().all(|p| p.starts_with("/work/data")));
    }

    #[test]
    fn test_explicit_inputs_override_defaults() {
        let given = vec![PathBuf::from("a.data")];
        assert_eq!(or_default(given.clone(), &[PathBuf::from("b.data")]), given);
        assert_eq!(
            or_default(Vec::new(), &[PathBuf::from("b.data")]),
            vec![PathBuf::from("b.data")]
        );
    }

    #[test]
    fn test_config_init_writes_loadable_file() {
        let dir = tempfile::TempDir::new().unwrap();
        init_config(dir.path()).unwrap();
        let loaded = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(loaded.training.n_iter, 10);
        assert_eq!(loaded.split.seed, 123);
    }
}
