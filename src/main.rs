use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use taxi_outliers::config::AppConfig;
use taxi_outliers::logging::init_logger;
use taxi_outliers::{
    detect_outliers, ingest_upload, LocalStorage, OutlierEngine, Partitioner, StorageGateway,
    WriteMode,
};

#[derive(Parser)]
#[command(name = "taxi-outliers")]
#[command(about = "Top-decile outlier detection for taxi trip datasets", long_about = None)]
struct Cli {
    /// Log progress at info level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition distance-sorted parquet files into storage
    Ingest {
        /// Parquet file or glob pattern (e.g. "data/*.parquet")
        #[arg(short, long)]
        input: String,

        /// Dataset id; defaults to the file name. Only valid with a single input
        #[arg(long)]
        dataset_id: Option<String>,

        /// Path to YAML configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override storage.root
        #[arg(long)]
        storage_root: Option<PathBuf>,

        /// Override partitioning.num_partitions
        #[arg(short = 'n', long)]
        partitions: Option<usize>,

        /// Rewrite partitions even if the dataset already exists
        #[arg(long)]
        overwrite: bool,
    },
    /// Report the top outliers of an ingested dataset
    Detect {
        /// Dataset id used at ingest time
        #[arg(short, long)]
        dataset_id: String,

        /// Path to YAML configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override storage.root
        #[arg(long)]
        storage_root: Option<PathBuf>,

        /// Also write the result JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        /// Path to YAML configuration
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show version information
    Version,
}

fn load_config(path: Option<&Path>, storage_root: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(path)?;
    if let Some(root) = storage_root {
        config.storage.root = root;
    }
    config.validate()?;
    Ok(config)
}

fn expand_inputs(input: &str) -> anyhow::Result<Vec<PathBuf>> {
    let paths = glob::glob(input)
        .with_context(|| format!("Invalid input pattern: {}", input))?
        .collect::<Result<Vec<_>, _>>()?;

    if paths.is_empty() {
        anyhow::bail!("No files match {}", input);
    }
    Ok(paths)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match cli.command {
        Commands::Ingest {
            input,
            dataset_id,
            config,
            storage_root,
            partitions,
            overwrite,
        } => {
            let mut config = load_config(config.as_deref(), storage_root)?;
            if let Some(n) = partitions {
                config.partitioning.num_partitions = n;
            }
            if overwrite {
                config.partitioning.mode = WriteMode::Overwrite;
            }
            config.validate()?;

            let inputs = expand_inputs(&input)?;
            if dataset_id.is_some() && inputs.len() > 1 {
                anyhow::bail!("--dataset-id requires a single input, {} matched", inputs.len());
            }

            let storage: Arc<dyn StorageGateway> = Arc::new(LocalStorage::new(&config.storage.root));

            for path in inputs {
                let filename = match &dataset_id {
                    Some(id) => id.clone(),
                    None => path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .with_context(|| format!("No file name in {:?}", path))?
                        .to_string(),
                };

                let contents = std::fs::read(&path)
                    .with_context(|| format!("Failed to read {:?}", path))?;

                let pb = ProgressBar::new(config.partitioning.num_partitions as u64);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} partitions")
                        .context("Invalid progress template")?,
                );
                let partitioner =
                    Partitioner::new(storage.clone(), config.partitioning).with_progress(pb);

                let metadata = ingest_upload(&partitioner, &filename, Bytes::from(contents))
                    .with_context(|| format!("Error processing file: {}", filename))?;

                if metadata.already_exists {
                    eprintln!("⊘ Skipped upload for {} (already exists)", filename);
                } else {
                    eprintln!("✓ Uploaded {} partitions for {}", metadata.num_partitions, filename);
                }
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            }
        }
        Commands::Detect {
            dataset_id,
            config,
            storage_root,
            output,
        } => {
            let config = load_config(config.as_deref(), storage_root)?;
            let storage: Arc<dyn StorageGateway> = Arc::new(LocalStorage::new(&config.storage.root));
            let engine = OutlierEngine::new(storage);

            let result = detect_outliers(&engine, &dataset_id)
                .with_context(|| format!("Error detecting outliers: {}", dataset_id))?;

            if let Some(path) = output {
                taxi_outliers::runtime::write_json_to_file(&result, &path)?;
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Validate { config } => {
            let _config = AppConfig::from_yaml_file(&config)?;
            println!("✓ Configuration is valid");
        }
        Commands::Version => {
            println!("taxi-outliers version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
