//! Readers for VCF genotypes and whitespace-separated sampling locations.
//!
//! Only the genotype columns of a VCF are interpreted. Inputs are expected
//! to be biallelic with alleles coded 0/1 and no missing calls.
//!
//! ```text
//! ##fileformat=VCFv4.2              skipped
//! #CHROM POS ID REF ALT QUAL FILTER INFO FORMAT s0 s1 …
//! 1      100 .  A   T   .    PASS   .    GT     0/1 1|1 …
//! ```

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::index;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::DatasetError;
use crate::genotype::{GenotypeMatrix, LocationMatrix, Phase, Polarization};

/// Fixed VCF columns preceding the first sample.
const FIXED_COLUMNS: usize = 9;

/// Parse genotypes from a VCF stream.
///
/// `n` defaults to the number of samples in the `#CHROM` header. Rows with
/// fewer samples than `n` are padded with zeros; extra samples are dropped.
/// Each site is recoded by `polarization` over the samples present. Exactly
/// `num_snps` rows are kept, drawn without replacement from `rng` and left in
/// the order drawn.
///
/// # Errors
///
/// [`DatasetError::VcfFormat`] for unparseable genotype fields,
/// [`DatasetError::NotEnoughSnps`] and [`DatasetError::NotEnoughSamples`]
/// when the file is too small.
pub fn read_genotypes<R: BufRead>(
    reader: R,
    n: Option<usize>,
    num_snps: usize,
    phase: Phase,
    polarization: Polarization,
    rng: &mut StdRng,
) -> Result<GenotypeMatrix, DatasetError> {
    let per = phase.columns();
    let mut n = n;
    let mut rows: Vec<Vec<u8>> = Vec::new();
    let mut widest = 0usize;
    let mut truncated = false;

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = lineno + 1;
        if line.starts_with("##") || line.trim().is_empty() {
            continue;
        }
        if line.starts_with('#') {
            let samples = line.split('\t').count().saturating_sub(FIXED_COLUMNS);
            if n.is_none() {
                n = Some(samples);
            }
            debug!(samples, "VCF header");
            continue;
        }

        let n = n.ok_or_else(|| DatasetError::vcf(lineno, "data line before #CHROM header"))?;
        let mut genos = Vec::with_capacity(n * per);
        for field in line.split('\t').skip(FIXED_COLUMNS) {
            let gt = field.split(':').next().unwrap_or_default();
            let mut alleles = gt.split(|c| c == '/' || c == '|');
            let (a, b) = match (alleles.next(), alleles.next(), alleles.next()) {
                (Some(a), Some(b), None) => (parse_allele(a, lineno)?, parse_allele(b, lineno)?),
                _ => {
                    return Err(DatasetError::vcf(lineno, format!("expected diploid genotype, got `{gt}`")))
                }
            };
            match phase {
                Phase::Unphased => genos.push(a + b),
                Phase::Phased => {
                    genos.push(a);
                    genos.push(b);
                }
            }
        }
        widest = widest.max(genos.len());
        if genos.len() > n * per {
            genos.truncate(n * per);
            truncated = true;
        }
        polarization.apply(&mut genos, phase);
        genos.resize(n * per, 0);
        rows.push(genos);
    }

    let n = n.unwrap_or(0);
    if truncated {
        warn!(kept = n, "VCF has more samples than requested; extra samples ignored");
    }
    if rows.len() < num_snps {
        return Err(DatasetError::NotEnoughSnps { found: rows.len(), required: num_snps });
    }
    if n == 0 || widest == 0 {
        return Err(DatasetError::NotEnoughSamples { found: widest, required: (n * per).max(1) });
    }

    let chosen = index::sample(rng, rows.len(), num_snps);
    let mut data = Array2::<u8>::zeros((num_snps, n * per));
    for (r, src) in chosen.into_iter().enumerate() {
        for (c, &v) in rows[src].iter().enumerate() {
            data[[r, c]] = v;
        }
    }
    debug!(rows = rows.len(), kept = num_snps, n, "parsed VCF genotypes");
    GenotypeMatrix::new(data, phase)
}

/// [`read_genotypes`] on a file path.
pub fn read_genotypes_path(
    path: &Path,
    n: Option<usize>,
    num_snps: usize,
    phase: Phase,
    polarization: Polarization,
    rng: &mut StdRng,
) -> Result<GenotypeMatrix, DatasetError> {
    let file = File::open(path).map_err(|e| DatasetError::io_error(path, e))?;
    read_genotypes(BufReader::new(file), n, num_snps, phase, polarization, rng)
}

fn parse_allele(s: &str, line: usize) -> Result<u8, DatasetError> {
    match s.trim() {
        "0" => Ok(0),
        "1" => Ok(1),
        other => Err(DatasetError::vcf(line, format!("allele `{other}` is not 0 or 1"))),
    }
}

/// Parse `lat lon` (or projected `x y`) lines, zero-padding to `n` columns.
pub fn read_locations<R: BufRead>(reader: R, n: usize) -> Result<LocationMatrix, DatasetError> {
    let mut points = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let coord = |s: &str| {
            s.parse::<f64>().map_err(|e| DatasetError::LocsFormat {
                line: lineno + 1,
                message: format!("`{s}`: {e}"),
            })
        };
        match fields.as_slice() {
            &[x, y] => points.push((coord(x)?, coord(y)?)),
            _ => {
                return Err(DatasetError::LocsFormat {
                    line: lineno + 1,
                    message: format!("expected 2 columns, got {}", fields.len()),
                })
            }
        }
    }
    LocationMatrix::from_points(&points, n)
}

/// [`read_locations`] on a file path.
pub fn read_locations_path(path: &Path, n: usize) -> Result<LocationMatrix, DatasetError> {
    let file = File::open(path).map_err(|e| DatasetError::io_error(path, e))?;
    read_locations(BufReader::new(file), n)
}
