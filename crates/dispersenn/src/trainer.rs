//! Training loop orchestrator.
//!
//! ```text
//! for epoch in 0..max_epochs:
//!     train DataLoader (shuffled per epoch) ──► forward ──► MSE ──► Adam step
//!     validation DataLoader ──► forward (no grad) ──► val loss + metrics
//!     ValidationMonitor:
//!         new best     ──► save <out>/pwConv_<seed>_model.ot
//!         plateau      ──► lr × 0.5
//!         out of patience ──► stop
//! ```
//!
//! The configuration is written to `<out>/config.json` before the first
//! epoch so a prediction run can rebuild the identical model.

use std::path::PathBuf;
use tch::nn::{self, OptimizerConfig};
use tracing::{debug, info};

use crate::callbacks::ValidationMonitor;
use crate::channels::ChannelPair;
use crate::config::TrainingConfig;
use crate::dataset::{Batch, DataLoader, MapDataset};
use crate::error::{TrainError, TrainResult};
use crate::losses::DispersalLoss;
use crate::metrics::{MetricsAccumulator, MetricsResult};
use crate::model::{batch_inputs, batch_targets, tensor_to_maps, DispersalModel};

// ---------------------------------------------------------------------------
// Summary types
// ---------------------------------------------------------------------------

/// Losses and learning rate of one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochLog {
    /// Zero-based epoch.
    pub epoch: usize,
    /// Mean training loss over examples.
    pub train_loss: f64,
    /// Mean validation loss over examples.
    pub val_loss: f64,
    /// Learning rate used during the epoch.
    pub lr: f64,
}

/// Outcome of [`Trainer::run`].
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    /// Lowest validation loss.
    pub best_val_loss: f64,
    /// Epoch of the lowest validation loss.
    pub best_epoch: usize,
    /// Epochs actually run.
    pub epochs_run: usize,
    /// Whether early stopping ended the run.
    pub stopped_early: bool,
    /// Per-epoch log.
    pub history: Vec<EpochLog>,
    /// Validation metrics of the best epoch, in normalized space.
    pub best_metrics: Option<MetricsResult>,
    /// Checkpoint of the best epoch.
    pub checkpoint: PathBuf,
}

// ---------------------------------------------------------------------------
// Trainer
// ---------------------------------------------------------------------------

/// Drives optimisation of a [`DispersalModel`].
pub struct Trainer {
    config: TrainingConfig,
    model: DispersalModel,
    loss: DispersalLoss,
}

impl Trainer {
    /// Train `model` with the configuration it was built from.
    pub fn new(model: DispersalModel) -> Self {
        Trainer { config: model.config().clone(), model, loss: DispersalLoss::new() }
    }

    /// Training configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// The model being trained.
    pub fn model(&self) -> &DispersalModel {
        &self.model
    }

    /// Train on `train`, selecting the checkpoint by loss on `val`.
    ///
    /// # Errors
    ///
    /// [`TrainError::EmptyDataset`] when either dataset is empty; any data
    /// loading, tensor or write error aborts the run.
    pub fn run(&mut self, train: &dyn MapDataset, val: &dyn MapDataset) -> TrainResult<TrainingSummary> {
        if train.is_empty() || val.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        let cfg = self.config.clone();
        std::fs::create_dir_all(&cfg.out_dir).map_err(|e| TrainError::write(&cfg.out_dir, e))?;
        cfg.to_json(&cfg.config_path())?;
        let checkpoint = cfg.checkpoint_path();

        let mut opt = nn::Adam::default().build(self.model.var_store(), cfg.learning_rate)?;
        let mut monitor = ValidationMonitor::new(cfg.patience, cfg.learning_rate);
        let train_loader = DataLoader::new(train, cfg.batch_size, true, cfg.seed);

        info!(
            train = train.len(),
            val = val.len(),
            batches = train_loader.num_batches(),
            parameters = self.model.num_parameters(),
            "starting training"
        );

        let mut history = Vec::new();
        let mut best_metrics = None;
        let mut stopped_early = false;

        for epoch in 0..cfg.max_epochs {
            let lr = monitor.lr();
            let mut loss_sum = 0.0;
            let mut seen = 0usize;
            for (step, samples) in train_loader.iter_epoch(epoch).enumerate() {
                let batch = Batch::collate(&samples?)?;
                let (genos, locs) = batch_inputs(&batch, self.model.device());
                let targets = batch_targets(&batch, self.model.device());
                let prediction = self.model.forward(&genos, &locs);
                let (loss, components) = self.loss.forward(&prediction, &targets);
                opt.backward_step(&loss);
                loss_sum += components.total * batch.len() as f64;
                seen += batch.len();
                debug!(epoch, step, loss = components.total, "batch");
            }
            let train_loss = loss_sum / seen.max(1) as f64;

            let (val_loss, metrics) = self.evaluate(val)?;
            let decision = monitor.observe(epoch, val_loss);
            info!(epoch, train_loss, val_loss, lr, "epoch complete");

            if decision.improved {
                self.model.save(&checkpoint)?;
                info!(epoch, val_loss, path = %checkpoint.display(), "validation loss improved, checkpoint saved");
                best_metrics = metrics;
            }
            if let Some(new_lr) = decision.new_lr {
                opt.set_lr(new_lr);
                info!(epoch, lr = new_lr, "reducing learning rate on plateau");
            }
            history.push(EpochLog { epoch, train_loss, val_loss, lr });
            if decision.stop {
                info!(epoch, patience = cfg.patience, "early stopping");
                stopped_early = true;
                break;
            }
        }

        let best_epoch = monitor.best_epoch().ok_or_else(|| {
            TrainError::checkpoint("validation loss never improved (non-finite)", &checkpoint)
        })?;
        info!(best_epoch, best_val_loss = monitor.best(), "training complete");

        Ok(TrainingSummary {
            best_val_loss: monitor.best(),
            best_epoch,
            epochs_run: history.len(),
            stopped_early,
            history,
            best_metrics,
            checkpoint,
        })
    }

    /// Mean loss over `dataset` without gradient tracking, plus metrics in
    /// normalized space.
    pub fn evaluate(&self, dataset: &dyn MapDataset) -> TrainResult<(f64, Option<MetricsResult>)> {
        let loader = DataLoader::new(dataset, self.config.batch_size, false, self.config.seed);
        let mut acc = MetricsAccumulator::new();
        let mut loss_sum = 0.0;
        let mut seen = 0usize;

        for samples in loader.iter() {
            let samples = samples?;
            let batch = Batch::collate(&samples)?;
            let (genos, locs) = batch_inputs(&batch, self.model.device());
            let targets = batch_targets(&batch, self.model.device());
            let prediction = self.model.forward_inference(&genos, &locs);
            let (_, components) = tch::no_grad(|| self.loss.forward(&prediction, &targets));
            loss_sum += components.total * batch.len() as f64;
            seen += batch.len();

            let predicted = prediction.try_map(|_, t| tensor_to_maps(&t))?;
            for (i, sample) in samples.iter().enumerate() {
                let pair = ChannelPair::from_fn(|c| predicted.get(c)[i].clone());
                acc.update(&pair, &sample.target);
            }
        }
        Ok((loss_sum / seen.max(1) as f64, acc.finalize()))
    }
}
