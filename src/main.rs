use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod config;
mod dataset;
mod error;
mod export;
mod machine;
mod models;
mod output;
mod runner;
mod store;

use crate::config::Config;
use crate::dataset::BatchPool;
use crate::export::CsvResultExporter;
use crate::machine::EvaluationMachine;
use crate::output::OutputFormat;
use crate::runner::Runner;
use crate::store::JsonProgressStore;

/// MOS survey - rate synthesized speech for naturalness, intelligibility and similarity
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    config: Option<PathBuf>,

    /// Tester id to register with instead of prompting
    #[arg(short, long)]
    tester: Option<String>,

    /// Directory of batch CSV files (overrides the config file)
    #[arg(long)]
    dataset_dir: Option<PathBuf>,

    /// Directory for progress records (overrides the config file)
    #[arg(long)]
    progress_dir: Option<PathBuf>,

    /// Directory for result tables (overrides the config file)
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Output format: plain or json
    #[arg(short, long, default_value = "plain")]
    output: OutputFormat,

    /// Verbose output - log every navigation step
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(err) = run(args).await {
        error!(error = %err, "survey failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(dir) = args.dataset_dir {
        config.dataset_dir = dir;
    }
    if let Some(dir) = args.progress_dir {
        config.progress_dir = dir;
    }
    if let Some(dir) = args.results_dir {
        config.results_dir = dir;
    }

    let pool = BatchPool::load(&config.dataset_dir, config.audio_root.as_deref())
        .context("Failed to load evaluation batches")?;
    let store = JsonProgressStore::new(&config.progress_dir)?;
    let exporter = CsvResultExporter::new(&config.results_dir)?;

    let runner = Runner::new(EvaluationMachine::new(pool, store, exporter), args.output);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    runner.run(stdin, &mut stdout, args.tester).await?;

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
