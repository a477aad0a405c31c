//! Dataset abstractions and concrete implementations for dispersenn training.
//!
//! This module defines the [`MapDataset`] trait plus two implementations:
//!
//! - [`PreprocessedDataset`]: reads the NPY corpus written by the
//!   preprocessing step.
//! - [`SyntheticMapDataset`]: deterministic genotypes, locations and smooth
//!   target maps computed from the sample index alone; used for tests and
//!   `--dry-run` smoke checks.
//!
//! A [`DataLoader`] wraps any [`MapDataset`] and yields batches in a
//! deterministic (seeded) order. [`train_val_split`] partitions sample
//! indices and [`SubsetDataset`] exposes one side of the split.
//!
//! # Directory layout expected by `PreprocessedDataset`
//!
//! ```text
//! <out>/
//!   mean_sd.npy                    # [2, 2] f64 normalization statistics
//!   Genos/<seed>/<i>.genos.npy     # [num_snps, n·phase] u8
//!   Locs/<seed>/<i>.locs.npy       # [2, n] f64
//!   Maps/<seed>/<i>.target.npy     # [size_out, size_out, 2] f32, normalized
//! ```
//!
//! # Example – synthetic dataset
//!
//! ```rust
//! use dispersenn::dataset::{MapDataset, SyntheticConfig, SyntheticMapDataset};
//!
//! let ds = SyntheticMapDataset::new(8, SyntheticConfig::default());
//! assert_eq!(ds.len(), 8);
//! let sample = ds.get(0).unwrap();
//! assert_eq!(sample.genotypes.shape(), &[1000, 10]);
//! ```

use ndarray::{Array2, Array3, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::channels::ChannelPair;
use crate::error::{ConfigError, DatasetError};
use crate::genotype::{GenotypeMatrix, Phase};
use crate::raster;

// ---------------------------------------------------------------------------
// MapSample
// ---------------------------------------------------------------------------

/// One training example: genotypes and locations of a sample plus the
/// normalized target maps.
#[derive(Debug, Clone)]
pub struct MapSample {
    /// Sample identifier, used in prediction file names.
    pub id: String,

    /// Per-individual dosages. Shape: `[num_snps, n]`.
    pub genotypes: Array2<f32>,

    /// Sampling coordinates. Shape: `[2, n]`.
    pub locations: Array2<f32>,

    /// Normalized target maps. Shape: `[size_out, size_out]` per channel.
    pub target: ChannelPair<Array2<f32>>,
}

// ---------------------------------------------------------------------------
// MapDataset trait
// ---------------------------------------------------------------------------

/// Common interface for all dispersenn datasets.
///
/// Implementations must be `Send + Sync` so they can be shared across
/// data-loading threads without additional synchronisation.
pub trait MapDataset: Send + Sync {
    /// Total number of samples in this dataset.
    fn len(&self) -> usize;

    /// Load the sample at position `idx`.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::IndexOutOfBounds`] when `idx >= self.len()` and
    /// dataset-specific errors for IO or format problems.
    fn get(&self, idx: usize) -> Result<MapSample, DatasetError>;

    /// Returns `true` when the dataset contains no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable name for logging and progress display.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Samples stacked along a leading batch axis.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Sample identifiers in batch order.
    pub ids: Vec<String>,
    /// `[B, num_snps, n]`.
    pub genotypes: Array3<f32>,
    /// `[B, 2, n]`.
    pub locations: Array3<f32>,
    /// `[B, size_out, size_out]` per channel.
    pub targets: ChannelPair<Array3<f32>>,
}

impl Batch {
    /// Stack `samples`, which must share shapes.
    pub fn collate(samples: &[MapSample]) -> Result<Batch, DatasetError> {
        if samples.is_empty() {
            return Err(DatasetError::format("cannot collate an empty batch"));
        }
        let genotypes = stack_views(samples.iter().map(|s| s.genotypes.view()).collect(), "genotype")?;
        let locations = stack_views(samples.iter().map(|s| s.locations.view()).collect(), "location")?;
        let targets = ChannelPair::from_fn(|c| c).try_map(|_, c| {
            stack_views(samples.iter().map(|s| s.target.get(c).view()).collect(), c.name())
        })?;
        Ok(Batch {
            ids: samples.iter().map(|s| s.id.clone()).collect(),
            genotypes,
            locations,
            targets,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// `true` for an empty batch.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn stack_views(views: Vec<ArrayView2<'_, f32>>, what: &str) -> Result<Array3<f32>, DatasetError> {
    ndarray::stack(Axis(0), &views)
        .map_err(|e| DatasetError::format(format!("inconsistent {what} shapes in batch: {e}")))
}

// ---------------------------------------------------------------------------
// DataLoader
// ---------------------------------------------------------------------------

/// Batched, optionally-shuffled iterator over a [`MapDataset`].
///
/// The shuffle order is fully deterministic: given the same `seed`, epoch
/// and dataset length the iteration order is always identical.
pub struct DataLoader<'a> {
    dataset: &'a dyn MapDataset,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
}

impl<'a> DataLoader<'a> {
    /// Create a new `DataLoader`.
    ///
    /// # Parameters
    ///
    /// - `dataset`    – the underlying dataset.
    /// - `batch_size` – number of samples per batch. The last batch may be
    ///   smaller if the dataset length is not a multiple of `batch_size`.
    /// - `shuffle`    – if `true`, samples are shuffled deterministically
    ///   from `seed` and the epoch number.
    /// - `seed`       – fixed seed for the shuffle RNG.
    pub fn new(dataset: &'a dyn MapDataset, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        DataLoader { dataset, batch_size: batch_size.max(1), shuffle, seed }
    }

    /// Number of complete (or partial) batches yielded per epoch.
    pub fn num_batches(&self) -> usize {
        (self.dataset.len() + self.batch_size - 1) / self.batch_size
    }

    /// Iterate the first epoch.
    pub fn iter(&self) -> DataLoaderIter<'_> {
        self.iter_epoch(0)
    }

    /// Iterate epoch `epoch`; each epoch has its own shuffle.
    ///
    /// A failed sample load ends the batch with an error instead of being
    /// skipped.
    pub fn iter_epoch(&self, epoch: usize) -> DataLoaderIter<'_> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(epoch_seed(self.seed, epoch));
            indices.shuffle(&mut rng);
        }
        DataLoaderIter { dataset: self.dataset, indices, batch_size: self.batch_size, cursor: 0 }
    }
}

/// Iterator returned by [`DataLoader::iter_epoch`].
pub struct DataLoaderIter<'a> {
    dataset: &'a dyn MapDataset,
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<'a> Iterator for DataLoaderIter<'a> {
    type Item = Result<Vec<MapSample>, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.indices.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.cursor..end];
        self.cursor = end;
        Some(batch_indices.iter().map(|&idx| self.dataset.get(idx)).collect())
    }
}

/// Seed for epoch `epoch`; epoch 0 uses `seed` itself.
fn epoch_seed(seed: u64, epoch: usize) -> u64 {
    seed ^ (epoch as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

// ---------------------------------------------------------------------------
// Train / validation split
// ---------------------------------------------------------------------------

/// Shuffle `0..len` with `seed` and hold out `ceil(len · validation_split)`
/// indices for validation.
///
/// Both sides, multiplied by `num_samples`, must be divisible by
/// `batch_size`.
pub fn train_val_split(
    len: usize,
    validation_split: f64,
    batch_size: usize,
    num_samples: usize,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), ConfigError> {
    if !(validation_split > 0.0 && validation_split < 1.0) {
        return Err(ConfigError::invalid_value("validation_split", "must be in (0.0, 1.0)"));
    }
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let num_val = ((len as f64) * validation_split).ceil() as usize;
    let train = indices.split_off(num_val.min(len));
    let val = indices;

    for (set, part) in [("training", &train), ("validation", &val)] {
        let examples = part.len() * num_samples;
        if examples == 0 || examples % batch_size != 0 {
            return Err(ConfigError::SplitNotDivisible { set, len: examples, batch_size });
        }
    }
    debug!(train = train.len(), val = val.len(), "train/validation split");
    Ok((train, val))
}

/// View of a dataset restricted to `indices`.
pub struct SubsetDataset<'a> {
    inner: &'a dyn MapDataset,
    indices: Vec<usize>,
    name: String,
}

impl<'a> SubsetDataset<'a> {
    /// Restrict `inner` to `indices`, in that order.
    pub fn new(inner: &'a dyn MapDataset, indices: Vec<usize>, label: &str) -> Self {
        let name = format!("{} [{label}]", inner.name());
        SubsetDataset { inner, indices, name }
    }
}

impl MapDataset for SubsetDataset<'_> {
    fn len(&self) -> usize {
        self.indices.len()
    }

    fn get(&self, idx: usize) -> Result<MapSample, DatasetError> {
        let inner = *self
            .indices
            .get(idx)
            .ok_or(DatasetError::IndexOutOfBounds { idx, len: self.indices.len() })?;
        self.inner.get(inner)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// PreprocessedDataset
// ---------------------------------------------------------------------------

/// Paths of the three preprocessed files for sample `id`.
pub fn preprocessed_paths(root: &Path, seed: u64, id: usize) -> (PathBuf, PathBuf, PathBuf) {
    let seed = seed.to_string();
    (
        root.join("Genos").join(&seed).join(format!("{id}.genos.npy")),
        root.join("Locs").join(&seed).join(format!("{id}.locs.npy")),
        root.join("Maps").join(&seed).join(format!("{id}.target.npy")),
    )
}

/// NPY corpus written by [`crate::preprocess`].
#[derive(Debug, Clone)]
pub struct PreprocessedDataset {
    root: PathBuf,
    seed: u64,
    phase: Phase,
    ids: Vec<usize>,
}

impl PreprocessedDataset {
    /// Scan `root` for samples that have all three files under `seed`.
    ///
    /// Samples are ordered by numeric id.
    pub fn discover(root: &Path, seed: u64, phase: Phase) -> Result<Self, DatasetError> {
        let maps_dir = root.join("Maps").join(seed.to_string());
        if !maps_dir.is_dir() {
            return Err(DatasetError::not_found(&maps_dir, "no preprocessed target maps"));
        }

        let mut ids = BTreeSet::new();
        let entries = std::fs::read_dir(&maps_dir).map_err(|e| DatasetError::io_error(&maps_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| DatasetError::io_error(&maps_dir, e))?;
            let file_name = entry.file_name();
            let Some(id) = file_name
                .to_str()
                .and_then(|n| n.strip_suffix(".target.npy"))
                .and_then(|n| n.parse::<usize>().ok())
            else {
                continue;
            };
            let (genos, locs, _) = preprocessed_paths(root, seed, id);
            if genos.is_file() && locs.is_file() {
                ids.insert(id);
            } else {
                debug!(id, "skipping sample with missing inputs");
            }
        }

        info!(root = %root.display(), seed, samples = ids.len(), "discovered preprocessed corpus");
        Ok(PreprocessedDataset { root: root.to_path_buf(), seed, phase, ids: ids.into_iter().collect() })
    }

    /// Numeric ids in index order.
    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    /// Corpus root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl MapDataset for PreprocessedDataset {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn get(&self, idx: usize) -> Result<MapSample, DatasetError> {
        let id = *self.ids.get(idx).ok_or(DatasetError::IndexOutOfBounds { idx, len: self.ids.len() })?;
        let (genos_path, locs_path, map_path) = preprocessed_paths(&self.root, self.seed, id);

        let raw: Array2<u8> = ndarray_npy::read_npy(&genos_path)
            .map_err(|e| DatasetError::npy(&genos_path, e.to_string()))?;
        let genotypes = GenotypeMatrix::new(raw, self.phase)?.to_model_input();
        let locs: Array2<f64> = ndarray_npy::read_npy(&locs_path)
            .map_err(|e| DatasetError::npy(&locs_path, e.to_string()))?;
        if locs.nrows() != 2 || locs.ncols() != genotypes.ncols() {
            return Err(DatasetError::npy(
                &locs_path,
                format!("expected [2, {}] locations, got {:?}", genotypes.ncols(), locs.shape()),
            ));
        }
        let target = raster::load_target(&map_path)?;

        Ok(MapSample { id: id.to_string(), genotypes, locations: locs.mapv(|v| v as f32), target })
    }

    fn name(&self) -> &str {
        "PreprocessedDataset"
    }
}

// ---------------------------------------------------------------------------
// SyntheticMapDataset
// ---------------------------------------------------------------------------

/// Configuration for [`SyntheticMapDataset`].
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Individuals per sample. Default: **10**.
    pub n: usize,
    /// SNPs per sample. Default: **1000**.
    pub num_snps: usize,
    /// Target side length. Default: **500**.
    pub size_out: usize,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        SyntheticConfig { n: 10, num_snps: 1000, size_out: 500 }
    }
}

/// Fully-deterministic dataset.
///
/// ## Genotype model
///
/// ```text
/// g = (idx + 7·snp + 3·i) mod 3
/// ```
///
/// ## Location model
///
/// Individual `i` of sample `idx` sits at `(i + 0.1·idx, 2·i + 1)`.
///
/// ## Target model
///
/// ```text
/// dispersal = 0.5·sin(2π·(r / size + 0.01·idx))
/// density   = 0.5·cos(2π·(c / size + 0.01·idx))
/// ```
pub struct SyntheticMapDataset {
    num_samples: usize,
    config: SyntheticConfig,
}

impl SyntheticMapDataset {
    /// Create a dataset with `num_samples` entries.
    pub fn new(num_samples: usize, config: SyntheticConfig) -> Self {
        SyntheticMapDataset { num_samples, config }
    }
}

impl MapDataset for SyntheticMapDataset {
    fn len(&self) -> usize {
        self.num_samples
    }

    fn get(&self, idx: usize) -> Result<MapSample, DatasetError> {
        if idx >= self.num_samples {
            return Err(DatasetError::IndexOutOfBounds { idx, len: self.num_samples });
        }
        let cfg = &self.config;
        let genotypes =
            Array2::from_shape_fn((cfg.num_snps, cfg.n), |(s, i)| ((idx + 7 * s + 3 * i) % 3) as f32);
        let locations = Array2::from_shape_fn((2, cfg.n), |(row, i)| match row {
            0 => i as f32 + 0.1 * idx as f32,
            _ => 2.0 * i as f32 + 1.0,
        });
        let size = cfg.size_out as f32;
        let tau = std::f32::consts::TAU;
        let shift = 0.01 * idx as f32;
        let target = ChannelPair::new(
            Array2::from_shape_fn((cfg.size_out, cfg.size_out), |(r, _)| {
                0.5 * (tau * (r as f32 / size + shift)).sin()
            }),
            Array2::from_shape_fn((cfg.size_out, cfg.size_out), |(_, c)| {
                0.5 * (tau * (c as f32 / size + shift)).cos()
            }),
        );
        Ok(MapSample { id: idx.to_string(), genotypes, locations, target })
    }

    fn name(&self) -> &str {
        "SyntheticMapDataset"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
