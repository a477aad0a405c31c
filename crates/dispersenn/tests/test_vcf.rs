//! Integration tests for [`dispersenn::vcf`] on files written to a
//! temporary directory.

use dispersenn::error::DatasetError;
use dispersenn::genotype::{DistanceMetric, GenotypeMatrix, Phase, Polarization};
use dispersenn::vcf::{read_genotypes_path, read_locations_path};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// VCF with `samples` columns and `snps` rows; sample `i` at SNP `s` is
/// `0|1` when `(i + s)` is odd and `1|1` otherwise.
fn write_vcf(dir: &TempDir, samples: usize, snps: usize) -> PathBuf {
    let mut text = String::from("##fileformat=VCFv4.2\n##source=test\n");
    text.push_str("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT");
    for i in 0..samples {
        write!(text, "\ti{i}").unwrap();
    }
    text.push('\n');
    for s in 0..snps {
        write!(text, "1\t{}\t.\tA\tG\t.\tPASS\t.\tGT", s + 1).unwrap();
        for i in 0..samples {
            text.push_str(if (i + s) % 2 == 1 { "\t0|1" } else { "\t1|1" });
        }
        text.push('\n');
    }
    let path = dir.path().join("sample.vcf");
    std::fs::write(&path, text).unwrap();
    path
}

fn read(
    path: &Path,
    n: Option<usize>,
    num_snps: usize,
    phase: Phase,
    seed: u64,
) -> Result<GenotypeMatrix, DatasetError> {
    let mut rng = StdRng::seed_from_u64(seed);
    read_genotypes_path(path, n, num_snps, phase, Polarization::AncestralDerived, &mut rng)
}

#[test]
fn header_determines_sample_count() {
    let dir = TempDir::new().unwrap();
    let path = write_vcf(&dir, 4, 30);
    let g = read(&path, None, 10, Phase::Unphased, 0).unwrap();
    assert_eq!(g.n(), 4);
    assert_eq!(g.num_snps(), 10);
    assert!(g.view().iter().all(|&v| v == 1 || v == 2));
}

#[test]
fn major_minor_flips_sites_dominated_by_alt() {
    let dir = TempDir::new().unwrap();
    let path = write_vcf(&dir, 4, 20);
    let g = read_genotypes_path(
        &path,
        None,
        20,
        Phase::Unphased,
        Polarization::MajorMinor,
        &mut StdRng::seed_from_u64(0),
    )
    .unwrap();
    for row in g.view().rows() {
        let mut sorted = row.to_vec();
        sorted.sort();
        assert_eq!(sorted, vec![0, 0, 1, 1]);
    }
}

#[test]
fn extra_samples_are_truncated() {
    let dir = TempDir::new().unwrap();
    let path = write_vcf(&dir, 6, 20);
    let g = read(&path, Some(3), 20, Phase::Phased, 0).unwrap();
    assert_eq!(g.n(), 3);
    assert_eq!(g.view().ncols(), 6);
}

#[test]
fn snp_subsample_is_seeded() {
    let dir = TempDir::new().unwrap();
    let path = write_vcf(&dir, 4, 200);
    let draw = |seed| read(&path, None, 50, Phase::Unphased, seed).unwrap();
    assert_eq!(draw(3), draw(3));
}

#[test]
fn missing_vcf_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = read(&dir.path().join("absent.vcf"), None, 1, Phase::Unphased, 0).unwrap_err();
    assert!(matches!(err, DatasetError::IoError { .. }), "{err:?}");
}

#[test]
fn vcf_without_samples_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_vcf(&dir, 0, 5);
    let err = read(&path, None, 5, Phase::Unphased, 0).unwrap_err();
    assert!(matches!(err, DatasetError::NotEnoughSamples { .. }), "{err:?}");
}

#[test]
fn locations_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sample.locs");
    std::fs::write(&path, "0 0\n3 4\n").unwrap();

    let locs = read_locations_path(&path, 3).unwrap();
    assert_eq!(locs.n(), 3);
    assert_eq!(locs.point(1), (3.0, 4.0));
    assert_eq!(locs.sampling_width(2, DistanceMetric::Euclidean), 5.0);
}

#[test]
fn more_locations_than_individuals_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sample.locs");
    std::fs::write(&path, "0 0\n1 1\n2 2\n").unwrap();
    assert!(matches!(
        read_locations_path(&path, 2),
        Err(DatasetError::NotEnoughSamples { found: 2, required: 3 })
    ));
}

#[test]
fn non_numeric_location_reports_line() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sample.locs");
    std::fs::write(&path, "0 0\nnorth 1\n").unwrap();
    assert!(matches!(read_locations_path(&path, 2), Err(DatasetError::LocsFormat { line: 2, .. })));
}
