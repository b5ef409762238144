//! heartwise CLI — run the heart-disease pipeline stage by stage or end to end.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// heartwise: combine, validate, clean, preprocess and model heart-disease data
#[derive(Parser, Debug)]
#[command(name = "heartwise", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `heartwise.toml`)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Combine the raw per-site files into one CSV
    Combine {
        /// Raw files, in order (defaults to the configured sources)
        #[arg(short, long, num_args = 1..)]
        input: Vec<PathBuf>,
        /// Output CSV path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the data validation checks on a combined CSV
    Validate {
        /// Combined CSV to validate
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Source files for the file-format check
        #[arg(short, long, num_args = 1..)]
        source: Vec<PathBuf>,
    },
    /// Clean and cast a combined CSV in place
    Clean {
        /// CSV file to overwrite
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
    /// Split a CSV into train_df.csv and test_df.csv
    Split {
        #[arg(short, long)]
        input: Option<PathBuf>,
        #[arg(short, long)]
        output_folder: Option<PathBuf>,
        /// Fraction of rows held out for testing
        #[arg(long)]
        test_size: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Fit the preprocessor and write transformed tables
    Preprocess {
        /// Folder holding train_df.csv and test_df.csv
        #[arg(short, long)]
        data_folder: Option<PathBuf>,
        #[arg(short, long)]
        output_folder: Option<PathBuf>,
    },
    /// Tune, fit and evaluate the four model families
    Train {
        #[arg(long)]
        x_train: PathBuf,
        #[arg(long)]
        y_train: PathBuf,
        #[arg(long)]
        x_test: PathBuf,
        #[arg(long)]
        y_test: PathBuf,
        /// Fitted preprocessor artifact; its column routing is refit per fold
        #[arg(long)]
        preprocessor: Option<PathBuf>,
        /// Folder for the classification reports
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Seed for candidate sampling
        #[arg(long)]
        seed: Option<u64>,
        /// Search metric: accuracy or roc_auc
        #[arg(long)]
        scoring: Option<String>,
    },
    /// Run every stage from the configuration
    Run,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default heartwise.toml in the workspace
    Init,
    /// Show the effective configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("org", "heartwise", "heartwise")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "heartwise.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref())
}
