//! Integration tests for [`dispersenn::config`].
//!
//! All tests are deterministic and use only fixed values, the
//! `TrainingConfig::default()` constructor, and temporary directories.

use dispersenn::config::TrainingConfig;
use dispersenn::error::ConfigError;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Default config invariants
// ---------------------------------------------------------------------------

/// The default configuration must pass its own validation.
#[test]
fn default_config_is_valid() {
    TrainingConfig::default()
        .validate()
        .expect("default TrainingConfig must be valid");
}

/// Defaults follow the reference command line.
#[test]
fn default_config_values() {
    let cfg = TrainingConfig::default();
    assert_eq!(cfg.n, 10);
    assert_eq!(cfg.num_snps, 5000);
    assert_eq!(cfg.phase, 1);
    assert_eq!(cfg.combination_size, 2);
    assert_eq!(cfg.pairs, 45);
    assert_eq!(cfg.upsample, 6);
    assert_eq!(cfg.grid_coarseness, 50);
    assert_eq!(cfg.min_tensor, 10);
    assert_eq!(cfg.size_out, 500);
    assert_eq!(cfg.batch_size, 1);
    assert_eq!(cfg.max_epochs, 1000);
    assert_eq!(cfg.patience, 100);
    assert_eq!(cfg.seed, 42);
    assert!(!cfg.segment);
}

/// Derived factor between coarse grid and output map.
#[test]
fn upscale_factor_is_size_over_coarseness() {
    let cfg = TrainingConfig::default();
    assert_eq!(cfg.upscale_factor(), 10);
}

// ---------------------------------------------------------------------------
// JSON persistence
// ---------------------------------------------------------------------------

/// A saved config reloads identically, including the seed.
#[test]
fn json_round_trip_preserves_every_field() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("config.json");

    let original = TrainingConfig {
        n: 24,
        pairs: 100,
        phase: 2,
        seed: 7,
        gpu_index: Some(1),
        learning_rate: 5e-4,
        ..TrainingConfig::default()
    };
    original.to_json(&path).expect("to_json");
    let loaded = TrainingConfig::from_json(&path).expect("from_json");
    assert_eq!(loaded, original);
}

/// Missing files surface as `FileRead`.
#[test]
fn missing_file_is_file_read_error() {
    let r = TrainingConfig::from_json(std::path::Path::new("/nonexistent/dispersenn.json"));
    assert!(matches!(r, Err(ConfigError::FileRead { .. })), "got {r:?}");
}

// ---------------------------------------------------------------------------
// Validation failures
// ---------------------------------------------------------------------------

#[test]
fn zero_batch_size_is_invalid() {
    let cfg = TrainingConfig { batch_size: 0, ..TrainingConfig::default() };
    assert!(matches!(cfg.validate(), Err(ConfigError::InvalidValue { field: "batch_size", .. })));
}

#[test]
fn validation_split_bounds() {
    for split in [0.0, 1.0, -0.1, 1.5] {
        let cfg = TrainingConfig { validation_split: split, ..TrainingConfig::default() };
        assert!(cfg.validate().is_err(), "split {split} must be rejected");
    }
}

#[test]
fn min_tensor_must_be_below_size_out() {
    let cfg = TrainingConfig { min_tensor: 500, ..TrainingConfig::default() };
    assert!(matches!(cfg.validate(), Err(ConfigError::InvalidValue { field: "min_tensor", .. })));
}

#[test]
fn segment_is_unsupported() {
    let cfg = TrainingConfig { segment: true, ..TrainingConfig::default() };
    assert!(matches!(cfg.validate(), Err(ConfigError::Unsupported(_))));
}
