//! `preprocess` binary: build the NPY training corpus.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin preprocess -- \
//!     --target-list maps.txt --vcf-list vcfs.txt --locs-list locs.txt --out-dir out/
//! ```
//!
//! The three lists are newline-separated paths; line `i` of each describes
//! example `i`. Existing statistics and per-example files are reused.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use dispersenn::config::TrainingConfig;
use dispersenn::genotype::{Phase, Polarization};
use dispersenn::preprocess::{preprocess, read_list, VcfSampler};

/// Command-line arguments for the preprocessing binary.
#[derive(Parser, Debug)]
#[command(name = "preprocess", version, about = "dispersenn corpus preprocessing", long_about = None)]
struct Args {
    /// Path to a JSON configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// List of target PNG paths.
    #[arg(long, value_name = "FILE")]
    target_list: PathBuf,

    /// List of VCF paths, parallel to the targets.
    #[arg(long, value_name = "FILE")]
    vcf_list: PathBuf,

    /// List of `.locs` paths, parallel to the targets.
    #[arg(long, value_name = "FILE")]
    locs_list: PathBuf,

    /// Override the output directory from the config.
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Override the random seed.
    #[arg(long)]
    seed: Option<u64>,

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

    info!("dispersenn preprocessing v{}", dispersenn::VERSION);

    let mut config = match args.config.as_deref() {
        Some(path) => match TrainingConfig::from_json(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("Failed to load configuration: {e}");
                std::process::exit(1);
            }
        },
        None => TrainingConfig::default(),
    };
    if let Some(dir) = args.out_dir {
        config.out_dir = dir;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {e}");
        std::process::exit(1);
    }

    let lists = (read_list(&args.target_list), read_list(&args.vcf_list), read_list(&args.locs_list));
    let (maps, vcfs, locs) = match lists {
        (Ok(m), Ok(v), Ok(l)) => (m, v, l),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
            error!("Failed to read input list: {e}");
            std::process::exit(1);
        }
    };
    if vcfs.len() != locs.len() {
        error!("{} VCF paths but {} location paths", vcfs.len(), locs.len());
        std::process::exit(1);
    }

    let phase = match Phase::try_from(config.phase) {
        Ok(p) => p,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    let polarization = match Polarization::try_from(config.polarize) {
        Ok(p) => p,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    let sampler = VcfSampler::new(
        vcfs.into_iter().zip(locs).collect(),
        config.n,
        config.num_snps,
        phase,
        polarization,
    );

    match preprocess(&config, &maps, &sampler) {
        Ok(summary) => {
            info!(
                "Preprocessed {} examples ({} inputs, {} targets written; statistics {})",
                maps.len(),
                summary.inputs_written,
                summary.targets_written,
                if summary.stats_reused { "reused" } else { "computed" }
            );
        }
        Err(e) => {
            error!("Preprocessing failed: {e}");
            std::process::exit(1);
        }
    }
}
