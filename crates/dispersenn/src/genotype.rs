//! Genotype and location matrices.
//!
//! A [`GenotypeMatrix`] holds `num_snps × (n · phase)` allele counts; a
//! [`LocationMatrix`] holds the matching `2 × n` sampling coordinates. Both
//! allow trailing zero columns for individuals absent from a sample.

use geo::{GeodesicDistance, Point};
use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, IbdError};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Whether haplotype phase is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Unknown phase: one column per individual holding a dosage in {0,1,2}.
    Unphased,
    /// Known phase: two columns per individual holding alleles in {0,1}.
    Phased,
}

impl Phase {
    /// Columns per individual.
    pub fn columns(self) -> usize {
        match self {
            Phase::Unphased => 1,
            Phase::Phased => 2,
        }
    }

    /// Largest legal entry.
    fn max_value(self) -> u8 {
        match self {
            Phase::Unphased => 2,
            Phase::Phased => 1,
        }
    }
}

impl TryFrom<u8> for Phase {
    type Error = DatasetError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Phase::Unphased),
            2 => Ok(Phase::Phased),
            other => Err(DatasetError::format(format!("phase must be 1 or 2, got {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Polarization
// ---------------------------------------------------------------------------

/// How alleles are coded 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarization {
    /// Keep the file's coding: 0 ancestral, 1 derived.
    AncestralDerived,
    /// Recode each site so the minor allele is 1.
    MajorMinor,
}

impl Polarization {
    /// Recode one site in place.
    ///
    /// `alleles` holds dosages (unphased) or haplotype alleles (phased) for
    /// the individuals actually present. Under [`Polarization::MajorMinor`]
    /// a site whose `1` allele exceeds half the allele copies is flipped;
    /// an exact 50% site is left alone.
    pub fn apply(self, alleles: &mut [u8], phase: Phase) {
        if self == Polarization::AncestralDerived || alleles.is_empty() {
            return;
        }
        let copies = alleles.len() * 2 / phase.columns();
        let derived: usize = alleles.iter().map(|&a| a as usize).sum();
        if derived * 2 > copies {
            let max = phase.max_value();
            for a in alleles.iter_mut() {
                *a = max - *a;
            }
        }
    }
}

impl TryFrom<u8> for Polarization {
    type Error = DatasetError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Polarization::AncestralDerived),
            2 => Ok(Polarization::MajorMinor),
            other => Err(DatasetError::format(format!("polarize must be 1 or 2, got {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// GenotypeMatrix
// ---------------------------------------------------------------------------

/// `num_snps × (n · phase)` matrix of allele counts.
///
/// Phased data stores individual `i` in columns `2i` and `2i + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeMatrix {
    data: Array2<u8>,
    phase: Phase,
}

impl GenotypeMatrix {
    /// Wrap `data`, checking the column count against `phase`.
    ///
    /// Entry ranges are not checked here; the IBD estimator reports invalid
    /// dosages with their position.
    pub fn new(data: Array2<u8>, phase: Phase) -> Result<Self, DatasetError> {
        if data.ncols() % phase.columns() != 0 {
            return Err(DatasetError::format(format!(
                "phased genotype matrix needs an even column count, got {}",
                data.ncols()
            )));
        }
        Ok(GenotypeMatrix { data, phase })
    }

    /// Number of SNP rows.
    pub fn num_snps(&self) -> usize {
        self.data.nrows()
    }

    /// Number of individuals (padding included).
    pub fn n(&self) -> usize {
        self.data.ncols() / self.phase.columns()
    }

    /// Phase of the stored columns.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Raw view of the stored columns.
    pub fn view(&self) -> ArrayView2<'_, u8> {
        self.data.view()
    }

    /// Consume the matrix and return its storage.
    pub fn into_inner(self) -> Array2<u8> {
        self.data
    }

    /// Individuals left after trimming trailing all-zero columns.
    ///
    /// Phased data rounds up to whole individuals, so a trailing haplotype
    /// column of zeros next to a non-zero one still counts.
    pub fn effective_individuals(&self) -> usize {
        let used_cols = self
            .data
            .axis_iter(Axis(1))
            .rposition(|col| col.iter().any(|&v| v != 0))
            .map_or(0, |last| last + 1);
        let per = self.phase.columns();
        (used_cols + per - 1) / per
    }

    /// Check every entry against the range allowed by the phase.
    pub fn validate_values(&self) -> Result<(), IbdError> {
        let max = self.phase.max_value();
        for ((snp, col), &value) in self.data.indexed_iter() {
            if value > max {
                return Err(IbdError::InvalidDosage {
                    value,
                    snp,
                    individual: col / self.phase.columns(),
                });
            }
        }
        Ok(())
    }

    /// Per-individual dosage matrix `num_snps × n` as `f32`.
    ///
    /// Phased haplotype pairs are summed, so the model always sees dosages.
    pub fn to_model_input(&self) -> Array2<f32> {
        match self.phase {
            Phase::Unphased => self.data.mapv(f32::from),
            Phase::Phased => {
                let n = self.n();
                Array2::from_shape_fn((self.num_snps(), n), |(r, i)| {
                    f32::from(self.data[[r, 2 * i]]) + f32::from(self.data[[r, 2 * i + 1]])
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DistanceMetric
// ---------------------------------------------------------------------------

/// How distance between two sampling locations is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Geodesic distance on the WGS-84 ellipsoid, in kilometres. Rows of the
    /// location matrix are latitude then longitude in degrees.
    #[default]
    Geodesic,
    /// Straight-line distance in the units of projected coordinates.
    Euclidean,
}

impl DistanceMetric {
    /// Distance between `(row0, row1)` coordinate pairs `a` and `b`.
    pub fn distance(self, a: (f64, f64), b: (f64, f64)) -> f64 {
        match self {
            DistanceMetric::Geodesic => {
                let pa = Point::new(a.1, a.0);
                let pb = Point::new(b.1, b.0);
                pa.geodesic_distance(&pb) / 1000.0
            }
            DistanceMetric::Euclidean => (a.0 - b.0).hypot(a.1 - b.1),
        }
    }
}

// ---------------------------------------------------------------------------
// LocationMatrix
// ---------------------------------------------------------------------------

/// `2 × n` sampling coordinates. Row 0 is latitude (or projected x), row 1
/// longitude (or projected y).
#[derive(Debug, Clone, PartialEq)]
pub struct LocationMatrix {
    data: Array2<f64>,
}

impl LocationMatrix {
    /// Wrap a `2 × n` array.
    pub fn new(data: Array2<f64>) -> Result<Self, DatasetError> {
        if data.nrows() != 2 {
            return Err(DatasetError::format(format!(
                "location matrix must have 2 rows, got {}",
                data.nrows()
            )));
        }
        Ok(LocationMatrix { data })
    }

    /// Build from `(row0, row1)` pairs, zero-padding to `n` columns.
    pub fn from_points(points: &[(f64, f64)], n: usize) -> Result<Self, DatasetError> {
        if points.len() > n {
            return Err(DatasetError::NotEnoughSamples { found: n, required: points.len() });
        }
        let mut data = Array2::<f64>::zeros((2, n));
        for (i, &(x, y)) in points.iter().enumerate() {
            data[[0, i]] = x;
            data[[1, i]] = y;
        }
        Ok(LocationMatrix { data })
    }

    /// Number of columns (padding included).
    pub fn n(&self) -> usize {
        self.data.ncols()
    }

    /// Coordinates of individual `i`.
    pub fn point(&self, i: usize) -> (f64, f64) {
        (self.data[[0, i]], self.data[[1, i]])
    }

    /// Column view for individual `i`.
    pub fn column(&self, i: usize) -> ArrayView1<'_, f64> {
        self.data.column(i)
    }

    /// Raw view.
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Copy of the first `n` columns.
    pub fn truncated(&self, n: usize) -> LocationMatrix {
        let n = n.min(self.n());
        LocationMatrix { data: self.data.slice(s![.., ..n]).to_owned() }
    }

    /// Copy as `f32`, the layout fed to the model.
    pub fn to_model_input(&self) -> Array2<f32> {
        self.data.mapv(|v| v as f32)
    }

    /// Largest pairwise distance among the first `n` individuals.
    pub fn sampling_width(&self, n: usize, metric: DistanceMetric) -> f64 {
        let n = n.min(self.n());
        let mut width = 0.0_f64;
        for i in 0..n {
            for j in (i + 1)..n {
                width = width.max(metric.distance(self.point(i), self.point(j)));
            }
        }
        width
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
