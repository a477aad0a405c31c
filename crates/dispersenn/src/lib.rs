//! # dispersenn
//!
//! Predicts a two-channel raster (dispersal intensity and population
//! density) over a square map from the genotypes and sampling locations of a
//! sample of individuals. It includes configuration management, VCF and
//! location readers, raster target preparation, topology planning, the
//! learned feature extractor and upsampling pyramid, the training loop, and
//! an isolation-by-distance (IBD) baseline estimator.
//!
//! ## Architecture
//!
//! ```text
//! TrainingConfig ──► ModelPlan ──► DispersalModel (tch-backend)
//!       │               │             ├─ FeatureExtractor
//!       │               │             └─ PyramidNet
//!       │               ├─ PairCombinations
//!       │               ├─ ExtractorPlan
//!       │               └─ ResolutionSchedule ──► PyramidPlan
//!       │
//!       ├──► preprocess ──► PreprocessedDataset ──► DataLoader ──► Trainer
//!       │        │                                                 │
//!       │     raster (coarsen, NormStats)                      Predictor
//!       │
//!       └──► vcf ──► GenotypeMatrix + LocationMatrix ──► IbdEstimator
//! ```
//!
//! Everything except `extractor`, `pyramid`, `model`, `losses`, `trainer`
//! and `predict` builds without libtorch. Enable the `tch-backend` feature
//! for those.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dispersenn::config::TrainingConfig;
//! use dispersenn::dataset::{MapDataset, SyntheticConfig, SyntheticMapDataset};
//! use dispersenn::plan::ModelPlan;
//!
//! // Build config and derive the topology
//! let config = TrainingConfig::default();
//! let plan = ModelPlan::from_config(&config).expect("config is valid");
//! println!("feature rows: {}", plan.combinations.len());
//!
//! // Create a synthetic dataset (deterministic)
//! let dataset = SyntheticMapDataset::new(16, SyntheticConfig::default());
//! let sample = dataset.get(0).unwrap();
//! println!("genotype shape: {:?}", sample.genotypes.shape());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod callbacks;
pub mod channels;
pub mod combinations;
pub mod config;
pub mod dataset;
pub mod error;
pub mod genotype;
pub mod ibd;
pub mod metrics;
pub mod plan;
pub mod preprocess;
pub mod raster;
pub mod schedule;
pub mod vcf;

#[cfg(feature = "tch-backend")]
pub mod extractor;
#[cfg(feature = "tch-backend")]
pub mod losses;
#[cfg(feature = "tch-backend")]
pub mod model;
#[cfg(feature = "tch-backend")]
pub mod predict;
#[cfg(feature = "tch-backend")]
pub mod pyramid;
#[cfg(feature = "tch-backend")]
pub mod trainer;

// Convenient re-exports at the crate root.
pub use channels::{Channel, ChannelPair};
pub use config::TrainingConfig;
pub use dataset::{DataLoader, MapDataset, MapSample, PreprocessedDataset, SyntheticConfig, SyntheticMapDataset};
pub use error::{ConfigError, DatasetError, IbdError, TrainError, TrainResult};
pub use genotype::{DistanceMetric, GenotypeMatrix, LocationMatrix, Phase, Polarization};
pub use ibd::{IbdEstimator, IbdResult, ReplicateEstimate};
pub use plan::ModelPlan;
pub use raster::NormStats;
pub use schedule::ResolutionSchedule;

#[cfg(feature = "tch-backend")]
pub use model::DispersalModel;
#[cfg(feature = "tch-backend")]
pub use trainer::Trainer;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
