//! Corpus preprocessing: normalization statistics plus per-example NPY files.
//!
//! ```text
//! target PNGs ──read_map──► StatsAccumulator ──► mean_sd.npy / mean_sd.json
//!      │
//!      └──► normalize ──► Maps/<seed>/<i>.target.npy
//! GenotypeSampler ──► Genos/<seed>/<i>.genos.npy, Locs/<seed>/<i>.locs.npy
//! ```
//!
//! Existing statistics are reused and existing per-example files are left
//! untouched, so an interrupted run can be resumed.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::TrainingConfig;
use crate::dataset::preprocessed_paths;
use crate::error::{DatasetError, TrainError, TrainResult};
use crate::genotype::{GenotypeMatrix, LocationMatrix, Phase, Polarization};
use crate::raster::{self, NormStats, StatsAccumulator};
use crate::vcf;

// ---------------------------------------------------------------------------
// GenotypeSampler
// ---------------------------------------------------------------------------

/// Source of genotype/location samples, one per corpus example.
///
/// Simulation back ends (tree sequences with recapitation and mutation)
/// implement this trait outside the crate; [`VcfSampler`] covers empirical
/// data.
pub trait GenotypeSampler {
    /// Number of examples the sampler can produce.
    fn len(&self) -> usize;

    /// `true` when there is nothing to sample.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Draw genotypes and locations for example `idx`.
    fn sample(&self, idx: usize, rng: &mut StdRng) -> Result<(GenotypeMatrix, LocationMatrix), DatasetError>;
}

/// Samples from paired VCF and `.locs` files.
#[derive(Debug, Clone)]
pub struct VcfSampler {
    inputs: Vec<(PathBuf, PathBuf)>,
    n: usize,
    num_snps: usize,
    phase: Phase,
    polarization: Polarization,
}

impl VcfSampler {
    /// One example per `(vcf, locs)` pair.
    pub fn new(
        inputs: Vec<(PathBuf, PathBuf)>,
        n: usize,
        num_snps: usize,
        phase: Phase,
        polarization: Polarization,
    ) -> Self {
        VcfSampler { inputs, n, num_snps, phase, polarization }
    }
}

impl GenotypeSampler for VcfSampler {
    fn len(&self) -> usize {
        self.inputs.len()
    }

    fn sample(&self, idx: usize, rng: &mut StdRng) -> Result<(GenotypeMatrix, LocationMatrix), DatasetError> {
        let (vcf_path, locs_path) = self
            .inputs
            .get(idx)
            .ok_or(DatasetError::IndexOutOfBounds { idx, len: self.inputs.len() })?;
        let genos = vcf::read_genotypes_path(
            vcf_path,
            Some(self.n),
            self.num_snps,
            self.phase,
            self.polarization,
            rng,
        )?;
        let locs = vcf::read_locations_path(locs_path, self.n)?;
        Ok((genos, locs))
    }
}

/// Read a newline-separated list of paths, skipping blank lines.
pub fn read_list(path: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let text = std::fs::read_to_string(path).map_err(|e| DatasetError::io_error(path, e))?;
    Ok(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(PathBuf::from).collect())
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// What a preprocessing run did.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessSummary {
    /// Statistics used for normalization.
    pub stats: NormStats,
    /// Whether the statistics were loaded rather than computed.
    pub stats_reused: bool,
    /// Examples whose genotype and location files were written.
    pub inputs_written: usize,
    /// Examples whose target file was written.
    pub targets_written: usize,
}

/// Load `mean_sd.npy` from `out_dir` if present, otherwise compute it over
/// `maps` and write both the NPY and a JSON copy.
pub fn load_or_compute_stats(config: &TrainingConfig, maps: &[PathBuf]) -> TrainResult<(NormStats, bool)> {
    let path = config.stats_path();
    if path.is_file() {
        let stats = NormStats::load_npy(&path)?;
        info!(path = %path.display(), "reusing normalization statistics");
        return Ok((stats, true));
    }

    let mut acc = StatsAccumulator::default();
    for map in maps {
        acc.push(&raster::read_map(map, config.grid_coarseness, config.size_out)?);
    }
    let stats = acc.finish()?;
    std::fs::create_dir_all(&config.out_dir).map_err(|e| TrainError::write(&config.out_dir, e))?;
    stats.save_npy(&path)?;
    stats.save_json(&path.with_extension("json"))?;
    info!(
        maps = maps.len(),
        dispersal_mean = stats.channels.dispersal.mean,
        dispersal_sd = stats.channels.dispersal.sd,
        density_mean = stats.channels.density.mean,
        density_sd = stats.channels.density.sd,
        "computed normalization statistics"
    );
    Ok((stats, false))
}

/// Write the preprocessed corpus for `maps` under `config.out_dir`.
///
/// Example `i` draws from `sampler` with an RNG seeded by `seed + i`, so
/// skipping already-written examples does not change the others.
pub fn preprocess(
    config: &TrainingConfig,
    maps: &[PathBuf],
    sampler: &dyn GenotypeSampler,
) -> TrainResult<PreprocessSummary> {
    if sampler.len() != maps.len() {
        return Err(DatasetError::format(format!(
            "{} target maps but {} genotype inputs",
            maps.len(),
            sampler.len()
        ))
        .into());
    }
    let (stats, stats_reused) = load_or_compute_stats(config, maps)?;

    let seed_dir = config.seed.to_string();
    for sub in ["Maps", "Genos", "Locs"] {
        let dir = config.out_dir.join(sub).join(&seed_dir);
        std::fs::create_dir_all(&dir).map_err(|e| TrainError::write(&dir, e))?;
    }

    let mut inputs_written = 0;
    let mut targets_written = 0;
    for (i, map) in maps.iter().enumerate() {
        let (genos_path, locs_path, map_path) = preprocessed_paths(&config.out_dir, config.seed, i);

        if !genos_path.is_file() || !locs_path.is_file() {
            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(i as u64));
            let (genos, locs) = sampler.sample(i, &mut rng)?;
            ndarray_npy::write_npy(&genos_path, &genos.into_inner())
                .map_err(|e| DatasetError::npy(&genos_path, e.to_string()))?;
            ndarray_npy::write_npy(&locs_path, &locs.view().to_owned())
                .map_err(|e| DatasetError::npy(&locs_path, e.to_string()))?;
            inputs_written += 1;
        }

        if !map_path.is_file() {
            let target = raster::read_map(map, config.grid_coarseness, config.size_out)?;
            raster::save_target(&map_path, &stats.normalize(&target)?)?;
            targets_written += 1;
        }
        debug!(example = i, "preprocessed");
    }

    info!(examples = maps.len(), inputs_written, targets_written, "preprocessing complete");
    Ok(PreprocessSummary { stats, stats_reused, inputs_written, targets_written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn read_list_skips_blank_lines() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("list.txt");
        std::fs::write(&path, "a.png\n\n  b.png  \n").unwrap();
        assert_eq!(read_list(&path).unwrap(), vec![PathBuf::from("a.png"), PathBuf::from("b.png")]);
    }

    #[test]
    fn vcf_sampler_out_of_range() {
        let sampler = VcfSampler::new(vec![], 4, 10, Phase::Unphased, Polarization::MajorMinor);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(sampler.is_empty());
        assert!(matches!(sampler.sample(0, &mut rng), Err(DatasetError::IndexOutOfBounds { .. })));
    }
}
