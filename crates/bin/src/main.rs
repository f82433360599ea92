//! Plume CLI binary.
//!
//! Trains the forecasting pipeline from a configuration file and inspects
//! the experiment log.

use clap::{Parser, Subcommand};
use plume::{TrainingRun, load_dataset};
use plume_tracking::{
    ConfigDocument, ExperimentLog, ExperimentTracker, ReportFormat, RunOverrides, render_run,
    render_runs,
};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plume")]
#[command(about = "Plume: lagged-feature emissions forecasting", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train, evaluate and record one run
    Train {
        /// Configuration file
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,

        /// First year of the test partition
        #[arg(long)]
        start_year: Option<i32>,

        /// Lags per tracked field
        #[arg(long)]
        n_lags: Option<usize>,

        /// Field to predict
        #[arg(long)]
        target: Option<String>,

        /// Number of trees
        #[arg(long)]
        n_estimators: Option<usize>,

        /// Maximum tree depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Summary format (text, markdown, json or csv)
        #[arg(long, default_value = "text")]
        format: ReportFormat,
    },

    /// List recorded runs, newest first
    Runs {
        /// Configuration file
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,

        /// Show at most this many runs
        #[arg(long)]
        limit: Option<usize>,

        /// Output format (text, markdown, json or csv)
        #[arg(long, default_value = "text")]
        format: ReportFormat,
    },

    /// Show one recorded run
    Show {
        /// Run identifier
        run_id: String,

        /// Configuration file
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,

        /// Output format (text, markdown, json or csv)
        #[arg(long, default_value = "text")]
        format: ReportFormat,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Train {
            config,
            start_year,
            n_lags,
            target,
            n_estimators,
            max_depth,
            format,
        } => {
            let overrides = RunOverrides {
                start_year,
                n_lags,
                target,
                n_estimators,
                max_depth,
            };
            train(&config, &overrides, format)?;
        }
        Commands::Runs {
            config,
            limit,
            format,
        } => {
            let log = open_log(&config)?;
            let runs = log.list_runs(limit)?;
            if runs.is_empty() && format == ReportFormat::Text {
                println!("No runs recorded yet.");
            } else {
                print!("{}", terminated(render_runs(&runs, format)?));
            }
        }
        Commands::Show {
            run_id,
            config,
            format,
        } => {
            let log = open_log(&config)?;
            let record = log.require_run(&run_id)?;
            print!("{}", terminated(render_run(&record, format)?));
        }
    }

    Ok(())
}

fn train(
    config_path: &Path,
    overrides: &RunOverrides,
    format: ReportFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut document = ConfigDocument::load(config_path)?;
    let config = document.run_config()?.with_overrides(overrides);
    if !overrides.is_empty() {
        tracing::info!(?overrides, "command-line overrides applied");
    }

    let tracker = ExperimentTracker::new(ExperimentLog::open(config.experiment_log_path()?)?);
    let dataset = load_dataset(&config)?;
    let record = TrainingRun::new(config, dataset, &tracker)?.execute(&mut document)?;

    println!("{}", record.metrics());
    print!("{}", terminated(render_run(&record, format)?));
    Ok(())
}

fn open_log(config_path: &Path) -> Result<ExperimentLog, Box<dyn std::error::Error>> {
    let config = ConfigDocument::load(config_path)?.run_config()?;
    Ok(ExperimentLog::open(config.experiment_log_path()?)?)
}

fn terminated(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}
