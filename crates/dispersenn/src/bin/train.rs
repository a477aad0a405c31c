//! `train` binary: entry point for dispersenn training.
//!
//! # Usage
//!
//! ```bash
//! cargo run --features tch-backend --bin train -- --config config.json --data-dir out/
//! cargo run --features tch-backend --bin train -- --dry-run --gpu 0
//! ```
//!
//! `--data-dir` is the output directory of the `preprocess` binary; the
//! checkpoint, `config.json` and logs go to `out_dir`.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use dispersenn::config::TrainingConfig;
use dispersenn::dataset::{
    train_val_split, MapDataset, PreprocessedDataset, SubsetDataset, SyntheticConfig, SyntheticMapDataset,
};
use dispersenn::genotype::Phase;
use dispersenn::model::{select_device, DispersalModel};
use dispersenn::trainer::Trainer;

/// Command-line arguments for the training binary.
#[derive(Parser, Debug)]
#[command(name = "train", version, about = "dispersenn training pipeline", long_about = None)]
struct Args {
    /// Path to a JSON configuration file.
    ///
    /// If not provided, the default `TrainingConfig` is used.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Preprocessed corpus directory. Defaults to the configured output
    /// directory.
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Override the output directory from the config.
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// CUDA device index (overrides config `gpu_index`).
    #[arg(long, value_name = "INDEX")]
    gpu: Option<usize>,

    /// Override the random seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Override the maximum number of epochs.
    #[arg(long)]
    max_epochs: Option<usize>,

    /// Override the batch size.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override the learning rate.
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Use the deterministic synthetic dataset instead of real data.
    ///
    /// This is intended for pipeline smoke-tests only, not production training.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Number of synthetic samples when `--dry-run` is active.
    #[arg(long, default_value_t = 10)]
    dry_run_samples: usize,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    info!("dispersenn training v{}", dispersenn::VERSION);

    let mut config = match args.config.as_deref() {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            match TrainingConfig::from_json(path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    error!("Failed to load configuration: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => {
            info!("No configuration file provided, using defaults");
            TrainingConfig::default()
        }
    };

    if let Some(dir) = args.out_dir {
        config.out_dir = dir;
    }
    if let Some(gpu) = args.gpu {
        config.gpu_index = Some(gpu);
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(epochs) = args.max_epochs {
        config.max_epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(lr) = args.learning_rate {
        config.learning_rate = lr;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {e}");
        std::process::exit(1);
    }

    info!("Configuration validated successfully");
    info!("  n            : {}", config.n);
    info!("  SNPs         : {}", config.num_snps);
    info!("  pairs        : {}", config.pairs);
    info!("  stages       : {}", config.upsample);
    info!("  batch size   : {}", config.batch_size);
    info!("  learning rate: {}", config.learning_rate);
    info!("  max epochs   : {}", config.max_epochs);

    if args.dry_run {
        info!("DRY RUN: using synthetic dataset ({} samples)", args.dry_run_samples);
        let syn_cfg = SyntheticConfig { n: config.n, num_snps: config.num_snps, size_out: config.size_out };
        let dataset = SyntheticMapDataset::new(args.dry_run_samples, syn_cfg);
        run_trainer(config, &dataset);
    } else {
        let data_dir = args.data_dir.unwrap_or_else(|| config.out_dir.clone());
        let phase = match Phase::try_from(config.phase) {
            Ok(p) => p,
            Err(e) => {
                error!("{e}");
                std::process::exit(1);
            }
        };
        let dataset = match PreprocessedDataset::discover(&data_dir, config.seed, phase) {
            Ok(ds) => ds,
            Err(e) => {
                error!("Failed to load dataset: {e}");
                error!("Run the preprocess binary first to populate {}", data_dir.display());
                std::process::exit(1);
            }
        };
        if dataset.is_empty() {
            error!("Dataset is empty, no samples were found in {}", data_dir.display());
            std::process::exit(1);
        }
        run_trainer(config, &dataset);
    }
}

/// Split `dataset`, build the model and run the training loop.
fn run_trainer(config: TrainingConfig, dataset: &dyn MapDataset) {
    info!("Dataset: {} ({} samples)", dataset.name(), dataset.len());

    let (train_idx, val_idx) = match train_val_split(
        dataset.len(),
        config.validation_split,
        config.batch_size,
        config.num_samples,
        config.seed,
    ) {
        Ok(split) => split,
        Err(e) => {
            error!("Cannot split dataset: {e}");
            std::process::exit(1);
        }
    };
    let train = SubsetDataset::new(dataset, train_idx, "train");
    let val = SubsetDataset::new(dataset, val_idx, "validation");

    let device = select_device(&config);
    let model = match DispersalModel::new(&config, device) {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to build model: {e}");
            std::process::exit(1);
        }
    };

    let mut trainer = Trainer::new(model);
    match trainer.run(&train, &val) {
        Ok(summary) => {
            info!(
                "Training finished after {} epochs; best val loss {:.6} at epoch {}",
                summary.epochs_run, summary.best_val_loss, summary.best_epoch
            );
            if let Some(m) = &summary.best_metrics {
                info!("Best validation metrics: {}", m.summary());
            }
            info!("Checkpoint: {}", summary.checkpoint.display());
        }
        Err(e) => {
            error!("Training failed: {e}");
            std::process::exit(1);
        }
    }
}
