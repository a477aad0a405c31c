//! `predict` binary: render predictions of a trained checkpoint.
//!
//! # Usage
//!
//! ```bash
//! cargo run --features tch-backend --bin predict -- --out-dir out/ --num-pred 20 --text
//! ```
//!
//! The configuration is read from `<out-dir>/config.json` (written by
//! `train`) unless `--config` is given, so the pair combinations and
//! resolution schedule match the checkpoint.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use dispersenn::config::TrainingConfig;
use dispersenn::dataset::{MapDataset, PreprocessedDataset};
use dispersenn::genotype::Phase;
use dispersenn::model::select_device;
use dispersenn::predict::Predictor;

/// Command-line arguments for the prediction binary.
#[derive(Parser, Debug)]
#[command(name = "predict", version, about = "dispersenn prediction", long_about = None)]
struct Args {
    /// Training output directory holding `config.json`, `mean_sd.npy` and
    /// the checkpoint.
    #[arg(long, value_name = "DIR", default_value = "out")]
    out_dir: PathBuf,

    /// Explicit configuration file instead of `<out-dir>/config.json`.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Preprocessed corpus to predict. Defaults to `--out-dir`.
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Number of examples to predict; all when omitted.
    #[arg(long)]
    num_pred: Option<usize>,

    /// Also write the tab-separated prediction record.
    #[arg(long, default_value_t = false)]
    text: bool,

    /// CUDA device index.
    #[arg(long, value_name = "INDEX")]
    gpu: Option<usize>,

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

    info!("dispersenn prediction v{}", dispersenn::VERSION);

    let config_path = args.config.unwrap_or_else(|| args.out_dir.join("config.json"));
    info!("Loading configuration from {}", config_path.display());
    let mut config = match TrainingConfig::from_json(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    config.out_dir = args.out_dir;
    if let Some(gpu) = args.gpu {
        config.gpu_index = Some(gpu);
    }

    let phase = match Phase::try_from(config.phase) {
        Ok(p) => p,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    let data_dir = args.data_dir.unwrap_or_else(|| config.out_dir.clone());
    let dataset = match PreprocessedDataset::discover(&data_dir, config.seed, phase) {
        Ok(ds) => ds,
        Err(e) => {
            error!("Failed to load dataset: {e}");
            std::process::exit(1);
        }
    };
    info!("Dataset: {} ({} samples)", dataset.name(), dataset.len());

    let predictor = match Predictor::from_out_dir(&config, select_device(&config)) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to load trained model: {e}");
            std::process::exit(1);
        }
    };

    match predictor.predict_dataset(&dataset, args.num_pred, args.text) {
        Ok(summary) => {
            info!("Predicted {} examples into {}", summary.predicted, summary.output_dir.display());
            if let Some(path) = &summary.text_path {
                info!("Prediction record: {}", path.display());
            }
        }
        Err(e) => {
            error!("Prediction failed: {e}");
            std::process::exit(1);
        }
    }
}
