//! Integration tests for [`dispersenn::ibd`].
//!
//! The line dataset places six individuals on a line and gives each a
//! deterministic ancestry proportion that grows with position, so genetic
//! differentiation increases with distance. The triangle dataset is small
//! enough that every pairwise `a` is known in closed form.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use dispersenn::config::TrainingConfig;
use dispersenn::error::{IbdError, TrainError};
use dispersenn::genotype::{DistanceMetric, GenotypeMatrix, LocationMatrix, Phase};
use dispersenn::ibd::{estimate_replicates, least_squares, IbdEstimator};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt::Write as _;
use std::path::PathBuf;
use tempfile::TempDir;

const N: usize = 6;
const LOCI: usize = 60;

/// Haplotype `a` crosses locus thresholds in order, haplotype `b` in a
/// permuted order, which keeps every interior individual heterozygous
/// somewhere.
fn planted_genotypes() -> GenotypeMatrix {
    let data = Array2::from_shape_fn((LOCI, 2 * N), |(s, c)| {
        let p = (c / 2) as f64 / (N - 1) as f64;
        let locus = if c % 2 == 0 { s } else { (s * 7) % LOCI };
        u8::from(p > (locus as f64 + 0.5) / LOCI as f64)
    });
    GenotypeMatrix::new(data, Phase::Phased).unwrap()
}

fn line_locations() -> LocationMatrix {
    let points: Vec<(f64, f64)> = (0..N).map(|i| (i as f64, 0.0)).collect();
    LocationMatrix::from_points(&points, N).unwrap()
}

/// Three individuals, phased.
///
/// Loci 0..3: individual `k` alone is heterozygous at locus `k`, so every
/// pair has within sum of squares 1 and `D = 3 / (2 · 3) = 1/2`; each pair
/// picks up `(2 · ¼ − 1) / 4 = −1/8` from these loci.
///
/// The remaining `derived` loci: individual 2 is homozygous derived and the
/// others ancestral, adding `¼` to pairs (0,2) and (1,2) only.
///
/// Hence `a_01 = −1/4` and `a_02 = a_12 = derived/2 − 1/4`.
fn triangle_genotypes(derived: usize) -> GenotypeMatrix {
    let data = Array2::from_shape_fn((3 + derived, 6), |(s, c)| {
        let individual = c / 2;
        let het = s < 3 && s == individual && c % 2 == 1;
        let hom = s >= 3 && individual == 2;
        u8::from(het || hom)
    });
    GenotypeMatrix::new(data, Phase::Phased).unwrap()
}

/// `d_01 = 1`, `d_02 = d_12 = e`, so `ln d` is 0, 1, 1.
fn triangle_locations() -> LocationMatrix {
    let e = std::f64::consts::E;
    let apex = (0.5, (e * e - 0.25).sqrt());
    LocationMatrix::from_points(&[(0.0, 0.0), (1.0, 0.0), apex], 3).unwrap()
}

/// Similarity is affine in log distance with slope `derived / 2`.
#[test]
fn triangle_recovers_planted_slope() {
    let est = IbdEstimator::new(DistanceMetric::Euclidean);
    for (derived, slope) in [(1, 0.5), (3, 1.5)] {
        let res = est
            .estimate(&triangle_genotypes(derived), &triangle_locations(), &mut StdRng::seed_from_u64(0))
            .unwrap();

        assert_eq!(res.n, 3);
        for (got, want) in res.log_distances.iter().zip([0.0, 1.0, 1.0]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
        }
        let high = slope - 0.25;
        for (got, want) in res.similarities.iter().zip([-0.25, high, high]) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
        assert_relative_eq!(res.fit.slope, slope, epsilon = 1e-12);
        assert_relative_eq!(res.fit.intercept, -0.25, epsilon = 1e-12);
        assert_relative_eq!(res.fit.r2, 1.0, epsilon = 1e-12);
        assert_relative_eq!(res.nw, 1.0 / slope, epsilon = 1e-12);
    }
}

/// Differentiation grows with log distance on the line.
#[test]
fn line_differentiation_grows_with_distance() {
    let res = IbdEstimator::new(DistanceMetric::Euclidean)
        .estimate(&planted_genotypes(), &line_locations(), &mut StdRng::seed_from_u64(1))
        .unwrap();

    assert_eq!(res.n, N);
    assert_eq!(res.similarities.len(), N * (N - 1) / 2);
    assert!(res.fit.slope > 0.0, "slope = {}", res.fit.slope);
    assert!((0.0..=1.0).contains(&res.fit.r2));
    assert_abs_diff_eq!(res.nw, 1.0 / res.fit.slope, epsilon = 1e-12);
}

/// Phased input never consumes randomness, so any seed gives the same fit.
#[test]
fn phased_estimate_is_seed_independent() {
    let est = IbdEstimator::new(DistanceMetric::Euclidean);
    let a = est.estimate(&planted_genotypes(), &line_locations(), &mut StdRng::seed_from_u64(1)).unwrap();
    let b = est.estimate(&planted_genotypes(), &line_locations(), &mut StdRng::seed_from_u64(99)).unwrap();
    assert_eq!(a, b);
}

/// Unphased heterozygote splitting is reproducible for a fixed seed.
#[test]
fn unphased_estimate_is_seeded() {
    let phased = planted_genotypes();
    let g = phased.view();
    let dosage = Array2::from_shape_fn((LOCI, N), |(s, i)| g[[s, 2 * i]] + g[[s, 2 * i + 1]]);
    let unphased = GenotypeMatrix::new(dosage, Phase::Unphased).unwrap();

    let est = IbdEstimator::new(DistanceMetric::Euclidean);
    let a = est.estimate(&unphased, &line_locations(), &mut StdRng::seed_from_u64(5)).unwrap();
    let b = est.estimate(&unphased, &line_locations(), &mut StdRng::seed_from_u64(5)).unwrap();
    assert_eq!(a, b);
    assert!((0.0..=1.0).contains(&a.fit.r2));
}

/// Dosages outside {0, 1, 2} are reported with their position.
#[test]
fn invalid_dosage_is_reported() {
    let mut data = Array2::<u8>::ones((3, 3));
    data[[1, 2]] = 3;
    let g = GenotypeMatrix::new(data, Phase::Unphased).unwrap();
    let locs = LocationMatrix::from_points(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)], 3).unwrap();
    let err = IbdEstimator::new(DistanceMetric::Euclidean)
        .estimate(&g, &locs, &mut StdRng::seed_from_u64(0))
        .unwrap_err();
    assert!(matches!(err, IbdError::InvalidDosage { value: 3, snp: 1, individual: 2 }), "{err:?}");
}

/// Fewer location columns than genotyped individuals is a mismatch.
#[test]
fn missing_locations_are_a_mismatch() {
    let locs = LocationMatrix::from_points(&[(0.0, 0.0), (1.0, 0.0)], 2).unwrap();
    let err = IbdEstimator::default()
        .estimate(&planted_genotypes(), &locs, &mut StdRng::seed_from_u64(0))
        .unwrap_err();
    assert!(matches!(err, IbdError::SampleMismatch { genotypes: 6, locations: 2 }));
}

#[test]
fn least_squares_r2_of_noisy_line() {
    let x = [0.0, 1.0, 2.0, 3.0];
    let y = [0.1, 0.9, 2.1, 2.9];
    let fit = least_squares(&x, &y).unwrap();
    assert!(fit.slope > 0.9 && fit.slope < 1.0);
    assert!(fit.r2 > 0.95 && fit.r2 < 1.0);
}

// ---------------------------------------------------------------------------
// Replicates from files
// ---------------------------------------------------------------------------

/// Write the line dataset as a phased VCF plus a locations file.
fn write_line_inputs(dir: &TempDir) -> (PathBuf, PathBuf) {
    let g = planted_genotypes();
    let g = g.view();
    let mut text = String::from("##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT");
    for i in 0..N {
        write!(text, "\ti{i}").unwrap();
    }
    text.push('\n');
    for s in 0..LOCI {
        write!(text, "1\t{}\t.\tA\tG\t.\tPASS\t.\tGT", s + 1).unwrap();
        for i in 0..N {
            write!(text, "\t{}|{}", g[[s, 2 * i]], g[[s, 2 * i + 1]]).unwrap();
        }
        text.push('\n');
    }
    let vcf = dir.path().join("line.vcf");
    std::fs::write(&vcf, text).unwrap();

    let locs = dir.path().join("line.locs");
    let lines: String = (0..N).map(|i| format!("{i} 0\n")).collect();
    std::fs::write(&locs, lines).unwrap();
    (vcf, locs)
}

fn replicate_config(num_reps: usize) -> TrainingConfig {
    TrainingConfig { num_snps: 40, phase: 2, polarize: 1, num_reps, seed: 11, ..TrainingConfig::default() }
}

#[test]
fn replicates_follow_num_reps() {
    let dir = TempDir::new().unwrap();
    let (vcf, locs) = write_line_inputs(&dir);

    let reps = estimate_replicates(&vcf, &locs, None, &replicate_config(3), DistanceMetric::Euclidean).unwrap();
    assert_eq!(reps.len(), 3);
    for (k, r) in reps.iter().enumerate() {
        assert_eq!(r.rep, k);
        assert_eq!(r.result.n, N);
        assert_abs_diff_eq!(r.sampling_width, 5.0, epsilon = 1e-12);
    }

    let again = estimate_replicates(&vcf, &locs, None, &replicate_config(3), DistanceMetric::Euclidean).unwrap();
    assert_eq!(reps, again);

    let one = estimate_replicates(&vcf, &locs, None, &replicate_config(1), DistanceMetric::Euclidean).unwrap();
    assert_eq!(one[0], reps[0]);
}

#[test]
fn replicates_reject_bad_polarize() {
    let dir = TempDir::new().unwrap();
    let (vcf, locs) = write_line_inputs(&dir);
    let config = TrainingConfig { polarize: 0, ..replicate_config(1) };
    let err = estimate_replicates(&vcf, &locs, None, &config, DistanceMetric::Euclidean).unwrap_err();
    assert!(matches!(err, TrainError::Dataset(_)), "{err:?}");
}
