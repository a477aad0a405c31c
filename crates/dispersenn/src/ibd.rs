//! Isolation-by-distance: Rousset's `a` regressed on log distance.
//!
//! For each pair of individuals `(i, j)` and each locus, with haplotype
//! alleles `X_i1, X_i2, X_j1, X_j2` and within-individual means `X̄_i, X̄_j`:
//!
//! ```text
//! SSw  = (X_i1 − X̄_i)² + (X_i2 − X̄_i)² + (X_j1 − X̄_j)² + (X_j2 − X̄_j)²
//! SSb  = (X̄_i − X̄..)² + (X̄_j − X̄..)²
//! D    = Σ_loci Σ_pairs SSw / (2P)
//! a_ij = Σ_loci (2·SSb − SSw) / 4 / D
//! ```
//!
//! `a` is then fitted against `ln d_ij` by ordinary least squares; the
//! neighbourhood size is `Nw = 1 / slope`.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::config::TrainingConfig;
use crate::error::{IbdError, TrainResult};
use crate::genotype::{DistanceMetric, GenotypeMatrix, LocationMatrix, Phase, Polarization};
use crate::vcf;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Ordinary least-squares fit `y = intercept + slope · x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineFit {
    /// Slope.
    pub slope: f64,
    /// Intercept.
    pub intercept: f64,
    /// Squared Pearson correlation.
    pub r2: f64,
}

/// Output of [`IbdEstimator::estimate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IbdResult {
    /// Individuals used after trimming padding.
    pub n: usize,
    /// `ln d_ij` per pair, pairs in `(0,1), (0,2), …, (n−2, n−1)` order.
    pub log_distances: Vec<f64>,
    /// Rousset's `a_ij` per pair, same order.
    pub similarities: Vec<f64>,
    /// Regression of similarity on log distance.
    pub fit: LineFit,
    /// Neighbourhood size `1 / slope`.
    pub nw: f64,
}

// ---------------------------------------------------------------------------
// IbdEstimator
// ---------------------------------------------------------------------------

/// Isolation-by-distance estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct IbdEstimator {
    metric: DistanceMetric,
}

impl IbdEstimator {
    /// Estimator measuring distances with `metric`.
    pub fn new(metric: DistanceMetric) -> Self {
        IbdEstimator { metric }
    }

    /// Distance metric in use.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Estimate `Nw`, slope and r² from genotypes and locations.
    ///
    /// Trailing all-zero genotype columns are treated as padding. Unphased
    /// heterozygotes are split into two haplotypes at random using `rng`.
    pub fn estimate(
        &self,
        genotypes: &GenotypeMatrix,
        locations: &LocationMatrix,
        rng: &mut StdRng,
    ) -> Result<IbdResult, IbdError> {
        let n = genotypes.effective_individuals();
        if n < 2 {
            return Err(IbdError::TooFewIndividuals { found: n });
        }
        if locations.n() < n {
            return Err(IbdError::SampleMismatch { genotypes: n, locations: locations.n() });
        }

        let haps = haplotypes(genotypes, n, rng)?;
        let similarities = rousset_a(&haps, n)?;

        let mut log_distances = Vec::with_capacity(similarities.len());
        for i in 0..n {
            for j in (i + 1)..n {
                let d = self.metric.distance(locations.point(i), locations.point(j));
                if !(d > 0.0) {
                    return Err(IbdError::ZeroDistance { i, j });
                }
                log_distances.push(d.ln());
            }
        }

        let fit = least_squares(&log_distances, &similarities)?;
        if fit.slope == 0.0 {
            return Err(IbdError::ZeroSlope);
        }
        let nw = 1.0 / fit.slope;
        info!(n, r2 = fit.r2, slope = fit.slope, nw, "isolation by distance");

        Ok(IbdResult { n, log_distances, similarities, fit, nw })
    }
}

// ---------------------------------------------------------------------------
// Replicates
// ---------------------------------------------------------------------------

/// One SNP draw of [`estimate_replicates`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicateEstimate {
    /// Zero-based replicate index.
    pub rep: usize,
    /// Estimate for this draw.
    pub result: IbdResult,
    /// Largest pairwise distance among the individuals used.
    pub sampling_width: f64,
}

/// Estimate IBD `config.num_reps` times on a VCF and its locations file.
///
/// Each replicate draws `config.num_snps` sites afresh, read with
/// `config.phase` and `config.polarize`. One generator seeded from
/// `config.seed` drives every draw, so the sequence of replicates is
/// reproducible while the replicates differ from one another.
pub fn estimate_replicates(
    vcf_path: &Path,
    locs_path: &Path,
    n: Option<usize>,
    config: &TrainingConfig,
    metric: DistanceMetric,
) -> TrainResult<Vec<ReplicateEstimate>> {
    let phase = Phase::try_from(config.phase)?;
    let polarization = Polarization::try_from(config.polarize)?;
    let estimator = IbdEstimator::new(metric);
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut reps = Vec::with_capacity(config.num_reps);
    for rep in 0..config.num_reps {
        let genos =
            vcf::read_genotypes_path(vcf_path, n, config.num_snps, phase, polarization, &mut rng)?;
        let locs = vcf::read_locations_path(locs_path, genos.n())?;
        let result = estimator.estimate(&genos, &locs, &mut rng)?;
        let sampling_width = locs.sampling_width(result.n, metric);
        reps.push(ReplicateEstimate { rep, result, sampling_width });
    }
    Ok(reps)
}

/// `num_snps × 2n` haplotype alleles as `f64`.
fn haplotypes(genotypes: &GenotypeMatrix, n: usize, rng: &mut StdRng) -> Result<Array2<f64>, IbdError> {
    let g = genotypes.view();
    let snps = g.nrows();
    let mut haps = Array2::<f64>::zeros((snps, 2 * n));
    match genotypes.phase() {
        Phase::Phased => {
            for s in 0..snps {
                for c in 0..2 * n {
                    let v = g[[s, c]];
                    if v > 1 {
                        return Err(IbdError::InvalidDosage { value: v, snp: s, individual: c / 2 });
                    }
                    haps[[s, c]] = f64::from(v);
                }
            }
        }
        Phase::Unphased => {
            // Individual-major so heterozygote draws match a column-wise pass.
            for i in 0..n {
                for s in 0..snps {
                    let (h1, h2) = match g[[s, i]] {
                        0 => (0.0, 0.0),
                        2 => (1.0, 1.0),
                        1 if rng.gen::<bool>() => (1.0, 0.0),
                        1 => (0.0, 1.0),
                        value => return Err(IbdError::InvalidDosage { value, snp: s, individual: i }),
                    };
                    haps[[s, 2 * i]] = h1;
                    haps[[s, 2 * i + 1]] = h2;
                }
            }
        }
    }
    Ok(haps)
}

/// Rousset's `a` for every pair, in upper-triangle order.
fn rousset_a(haps: &Array2<f64>, n: usize) -> Result<Vec<f64>, IbdError> {
    // Per individual and locus: mean allele and within-individual sum of
    // squares, which equals (h1 − h2)² / 2.
    let means: Vec<Array1<f64>> = (0..n)
        .map(|i| (&haps.column(2 * i) + &haps.column(2 * i + 1)) / 2.0)
        .collect();
    let within: Vec<Array1<f64>> = (0..n)
        .map(|i| (&haps.column(2 * i) - &haps.column(2 * i + 1)).mapv(|d| d * d / 2.0))
        .collect();

    let num_pairs = (n * (n - 1) / 2) as f64;
    let mut denominator = 0.0;
    let mut numerators = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            let ssw = &within[i] + &within[j];
            denominator += ssw.sum();
            // With X̄.. the pair mean, SSb reduces to (X̄_i − X̄_j)² / 2.
            let diff = &means[i] - &means[j];
            let two_ssb = diff.mapv(|d| d * d);
            numerators.push((two_ssb - ssw).sum() / 4.0);
        }
    }
    denominator /= 2.0 * num_pairs;
    if denominator == 0.0 {
        return Err(IbdError::ZeroDenominator);
    }
    Ok(numerators.into_iter().map(|num| num / denominator).collect())
}

/// Fit `y = intercept + slope · x` by least squares.
///
/// # Errors
///
/// [`IbdError::ZeroVariance`] when either input is constant.
pub fn least_squares(x: &[f64], y: &[f64]) -> Result<LineFit, IbdError> {
    let len = x.len().min(y.len()) as f64;
    let mx = x.iter().sum::<f64>() / len;
    let my = y.iter().sum::<f64>() / len;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        sxx += (xi - mx) * (xi - mx);
        syy += (yi - my) * (yi - my);
        sxy += (xi - mx) * (yi - my);
    }
    if !(sxx > 0.0) {
        return Err(IbdError::ZeroVariance { quantity: "log distance" });
    }
    if !(syy > 0.0) {
        return Err(IbdError::ZeroVariance { quantity: "genetic similarity" });
    }
    let slope = sxy / sxx;
    Ok(LineFit { slope, intercept: my - slope * mx, r2: sxy * sxy / (sxx * syy) })
}
