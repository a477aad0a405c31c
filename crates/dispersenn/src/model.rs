//! End-to-end dispersal/density model using tch-rs (PyTorch Rust bindings).
//!
//! # Architecture
//!
//! ```text
//! genotypes [B, S, n]   locations [B, 2, n]
//!        │                    │
//!        └────────┬───────────┘
//!                 ▼
//!        ┌──────────────────┐
//!        │ FeatureExtractor │  shared conv/pool + dense per combination
//!        └──────────────────┘
//!                 │ [B, P, F]
//!                 ▼
//!        ┌──────────────────┐
//!        │    PyramidNet    │  dense stages + transposed-conv upsampling
//!        └──────────────────┘
//!                 │
//!        ┌────────┴────────┐
//!        ▼                 ▼
//!   dispersal          density
//!  [B, 500, 500]    [B, 500, 500]
//! ```
//!
//! All weights live in one `VarStore` so a checkpoint is a single file. The
//! topology is fully determined by the [`TrainingConfig`] (including its
//! seed), so a checkpoint loads into a model built from the saved config.

use ndarray::{Array2, Array3, Axis};
use std::path::Path;
use tch::{nn, Device, Kind, Tensor};
use tracing::{info, warn};

use crate::channels::ChannelPair;
use crate::config::TrainingConfig;
use crate::dataset::Batch;
use crate::error::{TrainError, TrainResult};
use crate::extractor::FeatureExtractor;
use crate::plan::ModelPlan;
use crate::pyramid::PyramidNet;

// ---------------------------------------------------------------------------
// DispersalModel
// ---------------------------------------------------------------------------

/// Complete dispersal/density model.
pub struct DispersalModel {
    vs: nn::VarStore,
    config: TrainingConfig,
    plan: ModelPlan,
    extractor: FeatureExtractor,
    pyramid: PyramidNet,
}

impl DispersalModel {
    /// Build the model on `device`.
    ///
    /// Seeds libtorch with `config.seed` before any weight is initialised.
    ///
    /// # Errors
    ///
    /// [`TrainError::Config`] when the configuration is invalid or describes
    /// an unsupported topology.
    pub fn new(config: &TrainingConfig, device: Device) -> TrainResult<Self> {
        let plan = ModelPlan::from_config(config)?;
        tch::set_num_threads(config.threads as i32);
        tch::manual_seed(config.seed as i64);

        let vs = nn::VarStore::new(device);
        let (extractor, pyramid) = {
            let root = vs.root();
            (
                FeatureExtractor::new(&(&root / "extractor"), &plan.extractor, &plan.combinations),
                PyramidNet::new(&(&root / "pyramid"), &plan.pyramid)?,
            )
        };

        let model = DispersalModel { vs, config: config.clone(), plan, extractor, pyramid };
        info!(
            parameters = model.num_parameters(),
            device = ?device,
            "model built"
        );
        Ok(model)
    }

    /// Build the model and load weights from `path`.
    pub fn load(path: &Path, config: &TrainingConfig, device: Device) -> TrainResult<Self> {
        if !path.is_file() {
            return Err(TrainError::checkpoint("checkpoint not found", path));
        }
        let mut model = Self::new(config, device)?;
        model
            .vs
            .load(path)
            .map_err(|e| TrainError::checkpoint(format!("cannot load weights: {e}"), path))?;
        info!(path = %path.display(), "loaded checkpoint");
        Ok(model)
    }

    /// Save weights to `path`.
    pub fn save(&self, path: &Path) -> TrainResult<()> {
        self.vs
            .save(path)
            .map_err(|e| TrainError::checkpoint(format!("cannot save weights: {e}"), path))
    }

    /// Feature block only: `[B, pairs, feature_dim]`.
    pub fn features(&self, genotypes: &Tensor, locations: &Tensor) -> Tensor {
        self.extractor.forward(genotypes, locations)
    }

    /// Forward pass with gradient tracking.
    ///
    /// - `genotypes`: `[B, num_snps, n]`
    /// - `locations`: `[B, 2, n]`
    ///
    /// Returns `[B, size_out, size_out]` per channel.
    pub fn forward(&self, genotypes: &Tensor, locations: &Tensor) -> ChannelPair<Tensor> {
        self.pyramid.forward(&self.features(genotypes, locations))
    }

    /// Forward pass without gradient tracking.
    pub fn forward_inference(&self, genotypes: &Tensor, locations: &Tensor) -> ChannelPair<Tensor> {
        tch::no_grad(|| self.forward(genotypes, locations))
    }

    /// Configuration the model was built from.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Derived topology.
    pub fn plan(&self) -> &ModelPlan {
        &self.plan
    }

    /// Device holding the weights.
    pub fn device(&self) -> Device {
        self.vs.device()
    }

    /// Return all trainable variable tensors.
    pub fn trainable_variables(&self) -> Vec<Tensor> {
        self.vs.trainable_variables()
    }

    /// Count total trainable parameters.
    pub fn num_parameters(&self) -> usize {
        self.vs
            .trainable_variables()
            .iter()
            .map(|t| t.numel())
            .sum()
    }

    /// Access the internal `VarStore` (e.g. to create an optimizer).
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

/// Device selected by `config.gpu_index`, falling back to the CPU when CUDA
/// is unavailable.
pub fn select_device(config: &TrainingConfig) -> Device {
    match config.gpu_index {
        Some(index) if tch::Cuda::is_available() => Device::Cuda(index),
        Some(index) => {
            warn!(gpu = index, "CUDA is not available, falling back to CPU");
            Device::Cpu
        }
        None => Device::Cpu,
    }
}

// ---------------------------------------------------------------------------
// ndarray <-> Tensor
// ---------------------------------------------------------------------------

/// Copy an `f32` array into a tensor on `device`.
pub fn array3_to_tensor(a: &Array3<f32>, device: Device) -> Tensor {
    let shape: Vec<i64> = a.shape().iter().map(|&d| d as i64).collect();
    let data = a.as_standard_layout();
    let flat = data.as_slice().unwrap_or_default();
    Tensor::from_slice(flat).reshape(shape.as_slice()).to_device(device)
}

/// Batch inputs as `(genotypes, locations)` tensors.
pub fn batch_inputs(batch: &Batch, device: Device) -> (Tensor, Tensor) {
    (array3_to_tensor(&batch.genotypes, device), array3_to_tensor(&batch.locations, device))
}

/// Batch targets as tensors.
pub fn batch_targets(batch: &Batch, device: Device) -> ChannelPair<Tensor> {
    batch.targets.each_ref().map(|_, t| array3_to_tensor(t, device))
}

/// Split a `[B, H, W]` tensor into `B` host arrays.
pub fn tensor_to_maps(t: &Tensor) -> TrainResult<Vec<Array2<f32>>> {
    let size = t.size();
    if size.len() != 3 {
        return Err(TrainError::shape_mismatch(
            vec![0, 0, 0],
            size.iter().map(|&d| d as usize).collect(),
        ));
    }
    let (b, h, w) = (size[0] as usize, size[1] as usize, size[2] as usize);
    let flat = Vec::<f32>::try_from(&t.to_device(Device::Cpu).to_kind(Kind::Float).flatten(0, -1))?;
    let stacked = Array3::from_shape_vec((b, h, w), flat)
        .map_err(|_| TrainError::shape_mismatch(vec![b, h, w], vec![t.numel()]))?;
    Ok(stacked.axis_iter(Axis(0)).map(|m| m.to_owned()).collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
