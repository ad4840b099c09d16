use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use labrun::config::load_run_config;
use labrun::dataset::snapshot::list_snapshots;
use labrun::pipeline::{predict_with_artifact, prepare_snapshot, run_from_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "labrun",
    version,
    about = "Reproducible feature extraction, splitting and model runs for classification experiments"
)]
pub struct Cli {
    /// Directory for log files. Defaults to the platform data directory.
    #[arg(long, global = true, env = "LABRUN_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the whole pipeline described by a configuration file
    Run {
        /// Path to the JSON run configuration
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Extract, process, split and persist a snapshot without training
    Prepare {
        /// Path to the JSON run configuration
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Classify a feature table with a persisted model
    Predict {
        /// Model artifact directory (holds artifact.json)
        #[arg(short, long)]
        model: PathBuf,

        /// Feature table to classify (CSV, Parquet, JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the predictions. Printed when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the snapshots under a feature root, oldest first
    Snapshots {
        /// Feature root directory
        #[arg(short, long)]
        root: PathBuf,
    },
}

pub fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run { config } => handle_run(&config),
        Commands::Prepare { config } => handle_prepare(&config),
        Commands::Predict {
            model,
            input,
            output,
        } => handle_predict(model, input, output),
        Commands::Snapshots { root } => handle_snapshots(root),
    }
}

fn handle_run(config_path: &std::path::Path) -> Result<()> {
    let config = load_run_config(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let outcome = run_from_config(&config).context("Run failed")?;

    println!("Snapshot: {}", outcome.snapshot_dir.display());
    println!("Model: {}", outcome.model_dir.display());
    if let Some(predictions) = &outcome.predictions {
        for (row, p) in predictions.iter().enumerate() {
            println!("  sample {row}: {}", p.class);
        }
    }
    println!("Final accuracy is {}", outcome.accuracy);
    Ok(())
}

fn handle_prepare(config_path: &std::path::Path) -> Result<()> {
    let config = load_run_config(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let snapshot = prepare_snapshot(&config).context("Preparing snapshot failed")?;
    println!("{}", snapshot.display());
    Ok(())
}

fn handle_predict(model: PathBuf, input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let predictions = predict_with_artifact(&model, &input, output.as_deref())
        .with_context(|| format!("Failed to predict {}", input.display()))?;

    match output {
        Some(path) => println!(
            "Wrote {} predictions to {}",
            predictions.len(),
            path.display()
        ),
        None => {
            for (row, p) in predictions.iter().enumerate() {
                let confidence = p.probabilities.get(p.code as usize).copied().unwrap_or(0.0);
                println!("{row}\t{}\t{confidence:.4}", p.class);
            }
        }
    }
    Ok(())
}

fn handle_snapshots(root: PathBuf) -> Result<()> {
    for dir in list_snapshots(&root)? {
        if let Some(name) = dir.file_name() {
            println!("{}", name.to_string_lossy());
        }
    }
    Ok(())
}
