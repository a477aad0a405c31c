//! Configuration for dispersenn model construction, training and prediction.
//!
//! [`TrainingConfig`] is the single source of truth for the scalar parameters
//! from which the whole network topology is derived (`n`, `num_snps`, `pairs`,
//! `upsample`, …), for the raster target geometry, and for the optimiser. It
//! is serializable via [`serde`] so a training run can persist it next to its
//! checkpoint and a later prediction run can rebuild the identical pair
//! combinations and resolution schedule from the same seed.
//!
//! # Example
//!
//! ```rust
//! use dispersenn::config::TrainingConfig;
//!
//! let cfg = TrainingConfig::default();
//! cfg.validate().expect("default config is valid");
//!
//! assert_eq!(cfg.pairs, 45);
//! assert_eq!(cfg.upsample, 6);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Smallest intermediate map size. Four location scalars per pair make 5 the
/// theoretical minimum.
pub const MIN_TENSOR: usize = 10;

/// Side length of the predicted maps.
pub const SIZE_OUT: usize = 500;

// ---------------------------------------------------------------------------
// TrainingConfig
// ---------------------------------------------------------------------------

/// Complete configuration for a dispersenn run.
///
/// Defaults mirror the command-line defaults of the reference pipeline. Use
/// [`TrainingConfig::default()`] as a starting point and override fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    // -----------------------------------------------------------------------
    // Genotype input
    // -----------------------------------------------------------------------
    /// Sample size (individuals per example). Default: **10**.
    pub n: usize,

    /// SNPs per example; rows are subsampled to exactly this count.
    /// Default: **5000**.
    pub num_snps: usize,

    /// 1 for unknown phase (dosages), 2 for known phase (haplotypes).
    /// Default: **1**.
    pub phase: u8,

    /// 2 for major/minor polarisation, 1 for ancestral/derived. Passed through
    /// to genotype samplers. Default: **2**.
    pub polarize: u8,

    // -----------------------------------------------------------------------
    // Topology
    // -----------------------------------------------------------------------
    /// Individuals per pair combination. Default: **2**.
    pub combination_size: usize,

    /// Number of combinations subsampled once per model build. Default: **45**.
    pub pairs: usize,

    /// Number of pyramid stages, including the base map and the output map.
    /// Must be at least 2. Default: **6**.
    pub upsample: usize,

    /// Smallest intermediate map size. Default: **10**.
    pub min_tensor: usize,

    /// Output map side length. Default: **500**.
    pub size_out: usize,

    /// Request the auxiliary per-pixel classification head. Not defined for
    /// two-channel targets. Default: **false**.
    pub segment: bool,

    // -----------------------------------------------------------------------
    // Targets
    // -----------------------------------------------------------------------
    /// Side length of the coarse averaging grid. Must divide `size_out`.
    /// Default: **50**.
    pub grid_coarseness: usize,

    // -----------------------------------------------------------------------
    // Optimisation
    // -----------------------------------------------------------------------
    /// Mini-batch size. Default: **1**.
    pub batch_size: usize,

    /// Adam learning rate. Default: **1e-3**.
    pub learning_rate: f64,

    /// Maximum number of epochs. Default: **1000**.
    pub max_epochs: usize,

    /// Epochs without validation improvement before stopping. The learning
    /// rate is halved after `patience / 10` stale epochs. Default: **100**.
    pub patience: usize,

    /// Fraction of examples held out for validation, in `(0, 1)`.
    /// Default: **0.2**.
    pub validation_split: f64,

    /// Repeated samples drawn from each simulation. Default: **1**.
    pub num_samples: usize,

    /// Replicate SNP draws per empirical dataset. Default: **1**.
    pub num_reps: usize,

    // -----------------------------------------------------------------------
    // Paths
    // -----------------------------------------------------------------------
    /// Output directory for checkpoints, statistics and predictions.
    pub out_dir: PathBuf,

    // -----------------------------------------------------------------------
    // Device
    // -----------------------------------------------------------------------
    /// CUDA device index, or `None` for CPU. Default: **None**.
    pub gpu_index: Option<usize>,

    /// Intra-op threads for libtorch. Default: **1**.
    pub threads: usize,

    // -----------------------------------------------------------------------
    // Reproducibility
    // -----------------------------------------------------------------------
    /// Seed for pair combinations, data splits, SNP subsampling and weight
    /// initialisation. Default: **42**.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            // Genotype input
            n: 10,
            num_snps: 5000,
            phase: 1,
            polarize: 2,
            // Topology
            combination_size: 2,
            pairs: 45,
            upsample: 6,
            min_tensor: MIN_TENSOR,
            size_out: SIZE_OUT,
            segment: false,
            // Targets
            grid_coarseness: 50,
            // Optimisation
            batch_size: 1,
            learning_rate: 1e-3,
            max_epochs: 1000,
            patience: 100,
            validation_split: 0.2,
            num_samples: 1,
            num_reps: 1,
            // Paths
            out_dir: PathBuf::from("out"),
            // Device
            gpu_index: None,
            threads: 1,
            // Reproducibility
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Load a [`TrainingConfig`] from a JSON file at `path` and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be opened,
    /// [`ConfigError::ParseError`] if the JSON is malformed, and any
    /// validation error.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: TrainingConfig = serde_json::from_str(&contents).map_err(|source| {
            ConfigError::ParseError { path: path.to_path_buf(), source }
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize this configuration to pretty-printed JSON and write it to
    /// `path`, creating parent directories if necessary.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileRead {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| {
            ConfigError::ParseError { path: path.to_path_buf(), source }
        })?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Replication factor from the coarse target grid to the output map.
    pub fn upscale_factor(&self) -> usize {
        self.size_out / self.grid_coarseness.max(1)
    }

    /// Path of the persisted configuration inside `out_dir`.
    pub fn config_path(&self) -> PathBuf {
        self.out_dir.join("config.json")
    }

    /// Path of the persisted normalization statistics inside `out_dir`.
    pub fn stats_path(&self) -> PathBuf {
        self.out_dir.join("mean_sd.npy")
    }

    /// Path of the best-model checkpoint inside `out_dir`.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.out_dir.join(format!("pwConv_{}_model.ot", self.seed))
    }

    /// Validate all scalar fields and return the first problem found.
    ///
    /// Topology-level checks that need arithmetic over several fields (enough
    /// combinations, a strictly increasing schedule, supported stage
    /// branches) are performed by the planners in [`crate::plan`],
    /// [`crate::schedule`] and [`crate::combinations`], which `validate`
    /// does not duplicate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n == 0 {
            return Err(ConfigError::invalid_value("n", "must be > 0"));
        }
        if self.num_snps == 0 {
            return Err(ConfigError::invalid_value("num_snps", "must be > 0"));
        }
        if !matches!(self.phase, 1 | 2) {
            return Err(ConfigError::invalid_value("phase", "must be 1 or 2"));
        }
        if !matches!(self.polarize, 1 | 2) {
            return Err(ConfigError::invalid_value("polarize", "must be 1 or 2"));
        }

        if self.combination_size == 0 {
            return Err(ConfigError::invalid_value("combination_size", "must be > 0"));
        }
        if self.combination_size > self.n {
            return Err(ConfigError::invalid_value(
                "combination_size",
                format!("must be <= n ({})", self.n),
            ));
        }
        if self.pairs == 0 {
            return Err(ConfigError::invalid_value("pairs", "must be > 0"));
        }
        if self.upsample < 2 {
            return Err(ConfigError::invalid_value(
                "upsample",
                "must be >= 2 (base map and output map)",
            ));
        }
        if self.min_tensor == 0 || self.min_tensor >= self.size_out {
            return Err(ConfigError::invalid_value(
                "min_tensor",
                format!("must be in [1, size_out={})", self.size_out),
            ));
        }
        if self.segment {
            return Err(ConfigError::unsupported(
                "segment: classification output is undefined for two-channel targets",
            ));
        }

        if self.grid_coarseness == 0 {
            return Err(ConfigError::invalid_value("grid_coarseness", "must be > 0"));
        }
        if self.size_out % self.grid_coarseness != 0 {
            return Err(ConfigError::invalid_value(
                "grid_coarseness",
                format!("must divide size_out={}", self.size_out),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::invalid_value("batch_size", "must be > 0"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ConfigError::invalid_value("learning_rate", "must be > 0.0"));
        }
        if self.max_epochs == 0 {
            return Err(ConfigError::invalid_value("max_epochs", "must be > 0"));
        }
        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return Err(ConfigError::invalid_value(
                "validation_split",
                "must be in (0.0, 1.0)",
            ));
        }
        if self.num_samples == 0 {
            return Err(ConfigError::invalid_value("num_samples", "must be > 0"));
        }
        if self.num_reps == 0 {
            return Err(ConfigError::invalid_value("num_reps", "must be > 0"));
        }
        if self.threads == 0 {
            return Err(ConfigError::invalid_value("threads", "must be > 0"));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid() {
        TrainingConfig::default().validate().expect("default config should be valid");
    }

    #[test]
    fn json_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");

        let mut original = TrainingConfig::default();
        original.seed = 12345;
        original.gpu_index = Some(1);
        original.to_json(&path).expect("serialization should succeed");

        let loaded = TrainingConfig::from_json(&path).expect("deserialization should succeed");
        assert_eq!(loaded, original);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{ "n": 20, "pairs": 10 }"#).unwrap();

        let cfg = TrainingConfig::from_json(&path).unwrap();
        assert_eq!(cfg.n, 20);
        assert_eq!(cfg.pairs, 10);
        assert_eq!(cfg.upsample, 6);
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            TrainingConfig::from_json(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn single_stage_pyramid_is_invalid() {
        let mut cfg = TrainingConfig::default();
        cfg.upsample = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_phase_is_invalid() {
        let mut cfg = TrainingConfig::default();
        cfg.phase = 3;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn segment_is_unsupported() {
        let mut cfg = TrainingConfig::default();
        cfg.segment = true;
        assert!(matches!(cfg.validate(), Err(ConfigError::Unsupported(_))));
    }

    #[test]
    fn coarseness_must_divide_output() {
        let mut cfg = TrainingConfig::default();
        cfg.grid_coarseness = 48;
        assert!(cfg.validate().is_err());
        cfg.grid_coarseness = 100;
        cfg.validate().unwrap();
        assert_eq!(cfg.upscale_factor(), 5);
    }

    #[test]
    fn combination_larger_than_sample_is_invalid() {
        let mut cfg = TrainingConfig::default();
        cfg.combination_size = cfg.n + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn derived_paths_use_seed() {
        let mut cfg = TrainingConfig::default();
        cfg.seed = 7;
        cfg.out_dir = PathBuf::from("runs/a");
        assert_eq!(cfg.checkpoint_path(), PathBuf::from("runs/a/pwConv_7_model.ot"));
        assert_eq!(cfg.stats_path(), PathBuf::from("runs/a/mean_sd.npy"));
    }
}
