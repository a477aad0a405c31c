//! Integration tests for [`dispersenn::model`] at production input sizes.
//!
//! Requires libtorch; compiled only with `--features tch-backend`.
#![cfg(feature = "tch-backend")]

use dispersenn::config::TrainingConfig;
use dispersenn::dataset::{Batch, MapDataset, SyntheticConfig, SyntheticMapDataset};
use dispersenn::losses::DispersalLoss;
use dispersenn::model::{batch_inputs, batch_targets, tensor_to_maps, DispersalModel};
use tch::{Device, Kind, Tensor};
use tempfile::TempDir;

/// 20 individuals, 1000 SNPs and 10 sampled pairs at full output size.
fn production_config() -> TrainingConfig {
    TrainingConfig { n: 20, num_snps: 1000, pairs: 10, ..TrainingConfig::default() }
}

fn random_inputs() -> (Tensor, Tensor) {
    (
        Tensor::randint(3, [1, 1000, 20], (Kind::Float, Device::Cpu)),
        Tensor::rand([1, 2, 20], (Kind::Float, Device::Cpu)),
    )
}

#[test]
fn feature_block_for_thousand_snps() {
    let model = DispersalModel::new(&production_config(), Device::Cpu).unwrap();
    let (genos, locs) = random_inputs();
    let features = tch::no_grad(|| model.features(&genos, &locs));
    assert_eq!(features.size(), vec![1, 10, 1156]);
}

#[test]
fn full_resolution_forward() {
    let model = DispersalModel::new(&production_config(), Device::Cpu).unwrap();
    let (genos, locs) = random_inputs();
    let out = model.forward_inference(&genos, &locs);
    assert_eq!(out.dispersal.size(), vec![1, 500, 500]);
    assert_eq!(out.density.size(), vec![1, 500, 500]);
    assert!(out.dispersal.isfinite().all().int64_value(&[]) == 1);
}

/// A synthetic batch flows through the model and the loss end to end.
#[test]
fn synthetic_batch_loss_is_finite() {
    let config = TrainingConfig {
        n: 6,
        num_snps: 100,
        pairs: 10,
        upsample: 3,
        size_out: 50,
        grid_coarseness: 10,
        ..TrainingConfig::default()
    };
    let ds = SyntheticMapDataset::new(2, SyntheticConfig { n: 6, num_snps: 100, size_out: 50 });
    let samples: Vec<_> = (0..2).map(|i| ds.get(i).unwrap()).collect();
    let batch = Batch::collate(&samples).unwrap();

    let model = DispersalModel::new(&config, Device::Cpu).unwrap();
    let (genos, locs) = batch_inputs(&batch, Device::Cpu);
    let targets = batch_targets(&batch, Device::Cpu);
    let pred = model.forward(&genos, &locs);
    let (loss, parts) = DispersalLoss::new().forward(&pred, &targets);

    assert!(parts.total.is_finite());
    assert!((parts.total - (parts.dispersal + parts.density) / 2.0).abs() < 1e-5);
    assert!((loss.double_value(&[]) - parts.total).abs() < 1e-5);

    let maps = tensor_to_maps(&pred.dispersal.detach()).unwrap();
    assert_eq!(maps.len(), 2);
    assert_eq!(maps[0].dim(), (50, 50));
}

/// Reloaded weights reproduce the original predictions exactly.
#[test]
fn checkpoint_reload_reproduces_predictions() {
    let tmp = TempDir::new().unwrap();
    let config = TrainingConfig { out_dir: tmp.path().to_path_buf(), ..production_config() };
    let model = DispersalModel::new(&config, Device::Cpu).unwrap();
    let path = config.checkpoint_path();
    model.save(&path).unwrap();
    let reloaded = DispersalModel::load(&path, &config, Device::Cpu).unwrap();

    let (genos, locs) = random_inputs();
    let a = model.forward_inference(&genos, &locs);
    let b = reloaded.forward_inference(&genos, &locs);
    assert!(a.dispersal.allclose(&b.dispersal, 1e-6, 1e-6, false));
    assert!(a.density.allclose(&b.density, 1e-6, 1e-6, false));
}
