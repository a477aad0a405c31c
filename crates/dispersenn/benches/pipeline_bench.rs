//! Benchmarks for the dispersenn data pipeline.
//!
//! Inputs are built from fixed formulas so numbers are comparable across
//! runs. Nothing here needs libtorch.
//!
//! Run with:
//!
//! ```bash
//! cargo bench -p dispersenn
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dispersenn::{
    combinations::PairCombinations,
    config::TrainingConfig,
    dataset::{MapDataset, SyntheticConfig, SyntheticMapDataset},
    genotype::{DistanceMetric, GenotypeMatrix, LocationMatrix, Phase},
    ibd::IbdEstimator,
    plan::ModelPlan,
    raster::{coarsen, replicate},
    schedule::ResolutionSchedule,
};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

// ─────────────────────────────────────────────────────────────────────────────
// Topology planning
// ─────────────────────────────────────────────────────────────────────────────

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule");
    for layers in [3_usize, 6, 12] {
        group.bench_with_input(BenchmarkId::new("layers", layers), &layers, |b, &l| {
            b.iter(|| ResolutionSchedule::new(black_box(10), black_box(500), l));
        });
    }
    group.finish();
}

fn bench_model_plan(c: &mut Criterion) {
    let cfg = TrainingConfig::default();
    c.bench_function("model_plan_default", |b| {
        b.iter(|| ModelPlan::from_config(black_box(&cfg)));
    });
}

fn bench_combinations(c: &mut Criterion) {
    let mut group = c.benchmark_group("combinations");
    // (n, size, pairs): ranked draw, then the rejection path.
    for (n, size, pairs) in [(100_usize, 2_usize, 4950_usize), (500, 6, 1000)] {
        group.bench_with_input(BenchmarkId::new("n_size", format!("{n}_{size}")), &pairs, |b, &p| {
            b.iter(|| PairCombinations::sample(n, size, p, black_box(42)));
        });
    }
    group.finish();
}

// ─────────────────────────────────────────────────────────────────────────────
// Target rasterization
// ─────────────────────────────────────────────────────────────────────────────

fn bench_coarsen_replicate(c: &mut Criterion) {
    let field = Array2::<f64>::from_shape_fn((1000, 1000), |(r, col)| ((r * 31 + col * 17) % 97) as f64 * 0.01);
    c.bench_function("coarsen_1000_to_50_replicate_500", |b| {
        b.iter(|| {
            let coarse = coarsen(black_box(&field), 50).unwrap();
            replicate(&coarse, 10)
        });
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Isolation by distance
// ─────────────────────────────────────────────────────────────────────────────

fn bench_ibd(c: &mut Criterion) {
    let (snps, n) = (5000_usize, 100_usize);
    let data = Array2::<u8>::from_shape_fn((snps, n), |(s, i)| ((s * 7 + i * 13 + s * i) % 3) as u8);
    let genos = GenotypeMatrix::new(data, Phase::Unphased).unwrap();
    let points: Vec<(f64, f64)> = (0..n).map(|i| ((i % 10) as f64 + 0.5, (i / 10) as f64 * 1.3 + 0.2)).collect();
    let locs = LocationMatrix::from_points(&points, n).unwrap();
    let estimator = IbdEstimator::new(DistanceMetric::Euclidean);

    c.bench_function("ibd_5000_snps_100_individuals", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(0);
            estimator.estimate(black_box(&genos), black_box(&locs), &mut rng)
        });
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Dataset
// ─────────────────────────────────────────────────────────────────────────────

fn bench_synthetic_get(c: &mut Criterion) {
    let ds = SyntheticMapDataset::new(100, SyntheticConfig::default());
    c.bench_function("synthetic_get", |b| {
        b.iter(|| ds.get(black_box(7)));
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Criterion registration
// ─────────────────────────────────────────────────────────────────────────────

criterion_group!(
    benches,
    // Planning
    bench_schedule,
    bench_model_plan,
    bench_combinations,
    // Raster
    bench_coarsen_replicate,
    // IBD
    bench_ibd,
    // Dataset
    bench_synthetic_get,
);
criterion_main!(benches);
