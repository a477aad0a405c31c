//! Batched prediction with denormalized PNG and text output.
//!
//! ```text
//! <out>/Test_<seed>/
//!   pwConv_<seed>_<id>_<t>_true.png    t = 0 dispersal, 1 density
//!   pwConv_<seed>_<id>_<t>_pred.png
//!   pwConv_<seed>_predictions.txt      optional, one record per example
//! ```

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tch::Device;
use tracing::{info, warn};

use crate::channels::{Channel, ChannelPair};
use crate::config::TrainingConfig;
use crate::dataset::{Batch, MapDataset, MapSample};
use crate::error::{TrainError, TrainResult};
use crate::metrics::{MetricsAccumulator, MetricsResult};
use crate::model::{batch_inputs, tensor_to_maps, DispersalModel};
use crate::raster::{self, NormStats};

/// Outcome of [`Predictor::predict_dataset`].
#[derive(Debug, Clone)]
pub struct PredictionSummary {
    /// Examples predicted.
    pub predicted: usize,
    /// Per-channel errors in original units.
    pub metrics: Option<MetricsResult>,
    /// Directory holding the PNGs.
    pub output_dir: PathBuf,
    /// Text record, when requested.
    pub text_path: Option<PathBuf>,
}

/// `num_pred` distinct indices out of `len`, drawn with `seed`.
///
/// `None` or a request larger than `len` selects every index.
pub fn choose_examples(len: usize, num_pred: Option<usize>, seed: u64) -> Vec<usize> {
    let amount = match num_pred {
        Some(k) if k > len => {
            warn!(requested = k, available = len, "fewer examples than requested, predicting all");
            len
        }
        Some(k) => k,
        None => len,
    };
    let mut rng = StdRng::seed_from_u64(seed);
    index::sample(&mut rng, len, amount).into_vec()
}

/// Trained model plus the statistics to undo target normalization.
pub struct Predictor {
    model: DispersalModel,
    stats: NormStats,
}

impl Predictor {
    /// Wrap an already-loaded model.
    pub fn new(model: DispersalModel, stats: NormStats) -> Self {
        Predictor { model, stats }
    }

    /// Load the checkpoint and `mean_sd.npy` written under
    /// `config.out_dir` by a training run with the same configuration.
    pub fn from_out_dir(config: &TrainingConfig, device: Device) -> TrainResult<Self> {
        let model = DispersalModel::load(&config.checkpoint_path(), config, device)?;
        let stats = NormStats::load_npy(&config.stats_path())?;
        Ok(Predictor { model, stats })
    }

    /// The wrapped model.
    pub fn model(&self) -> &DispersalModel {
        &self.model
    }

    /// Normalization statistics.
    pub fn stats(&self) -> &NormStats {
        &self.stats
    }

    /// Predicted maps for `samples`, still in normalized space.
    pub fn predict_normalized(&self, samples: &[MapSample]) -> TrainResult<Vec<ChannelPair<Array2<f32>>>> {
        let batch = Batch::collate(samples)?;
        let (genos, locs) = batch_inputs(&batch, self.model.device());
        let per_channel = self
            .model
            .forward_inference(&genos, &locs)
            .try_map(|_, t| tensor_to_maps(&t))?;
        Ok((0..batch.len())
            .map(|i| ChannelPair::from_fn(|c| per_channel.get(c)[i].clone()))
            .collect())
    }

    /// Predicted maps for `samples` in original units.
    pub fn predict(&self, samples: &[MapSample]) -> TrainResult<Vec<ChannelPair<Array2<f32>>>> {
        self.predict_normalized(samples)?
            .iter()
            .map(|maps| self.stats.denormalize(maps).map_err(TrainError::from))
            .collect()
    }

    /// Predict `num_pred` seeded examples of `dataset` in batches, writing
    /// true and predicted PNGs per channel and, with `write_text`, the text
    /// record.
    pub fn predict_dataset(
        &self,
        dataset: &dyn MapDataset,
        num_pred: Option<usize>,
        write_text: bool,
    ) -> TrainResult<PredictionSummary> {
        let cfg = self.model.config();
        if dataset.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        let output_dir = cfg.out_dir.join(format!("Test_{}", cfg.seed));
        std::fs::create_dir_all(&output_dir).map_err(|e| TrainError::write(&output_dir, e))?;

        let text_path = write_text.then(|| output_dir.join(format!("pwConv_{}_predictions.txt", cfg.seed)));
        let mut text = match &text_path {
            Some(path) => {
                if path.exists() {
                    std::fs::remove_file(path).map_err(|e| TrainError::write(path, e))?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| TrainError::write(path, e))?;
                Some((path.clone(), file))
            }
            None => None,
        };

        let chosen = choose_examples(dataset.len(), num_pred, cfg.seed);
        info!(examples = chosen.len(), dir = %output_dir.display(), "predicting");

        let mut acc = MetricsAccumulator::new();
        for ids in chosen.chunks(cfg.batch_size.max(1)) {
            let samples = ids.iter().map(|&i| dataset.get(i)).collect::<Result<Vec<_>, _>>()?;
            let predictions = self.predict(&samples)?;

            for (sample, prediction) in samples.iter().zip(&predictions) {
                let truth = self.stats.denormalize(&sample.target)?;
                write_pngs(&output_dir, cfg.seed, &sample.id, &truth, prediction)?;
                if let Some((path, file)) = text.as_mut() {
                    let record = raster::prediction_record(&sample.id, &truth, prediction)?;
                    writeln!(file, "{record}").map_err(|e| TrainError::write(path.as_path(), e))?;
                }
                acc.update(prediction, &truth);
            }
        }

        let metrics = acc.finalize();
        if let Some(m) = &metrics {
            info!(
                dispersal_rmse = m.channels.dispersal.rmse,
                density_rmse = m.channels.density.rmse,
                "{}",
                m.summary()
            );
        }
        Ok(PredictionSummary { predicted: chosen.len(), metrics, output_dir, text_path })
    }
}

fn write_pngs(
    dir: &Path,
    seed: u64,
    id: &str,
    truth: &ChannelPair<Array2<f32>>,
    prediction: &ChannelPair<Array2<f32>>,
) -> TrainResult<()> {
    for channel in Channel::ALL {
        let t = channel.index();
        raster::save_channel_png(&dir.join(format!("pwConv_{seed}_{id}_{t}_true.png")), truth.get(channel))?;
        raster::save_channel_png(&dir.join(format!("pwConv_{seed}_{id}_{t}_pred.png")), prediction.get(channel))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{SyntheticConfig, SyntheticMapDataset};
    use crate::raster::ChannelStats;

    #[test]
    fn choose_examples_is_seeded_and_distinct() {
        let a = choose_examples(20, Some(5), 3);
        let b = choose_examples(20, Some(5), 3);
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 5);
        assert_eq!(choose_examples(3, Some(10), 0).len(), 3);
        assert_eq!(choose_examples(4, None, 0).len(), 4);
    }

    #[test]
    fn predict_dataset_writes_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainingConfig {
            n: 6,
            num_snps: 100,
            pairs: 10,
            upsample: 3,
            size_out: 50,
            grid_coarseness: 10,
            batch_size: 2,
            out_dir: tmp.path().to_path_buf(),
            ..TrainingConfig::default()
        };
        let model = DispersalModel::new(&cfg, Device::Cpu).unwrap();
        let stats = NormStats::new(ChannelStats { mean: 1.0, sd: 2.0 }, ChannelStats { mean: 0.0, sd: 1.0 });
        let predictor = Predictor::new(model, stats);
        let dataset = SyntheticMapDataset::new(4, SyntheticConfig { n: 6, num_snps: 100, size_out: 50 });

        let summary = predictor.predict_dataset(&dataset, Some(3), true).unwrap();
        assert_eq!(summary.predicted, 3);
        assert_eq!(summary.metrics.unwrap().num_maps, 3);
        let pngs = std::fs::read_dir(&summary.output_dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "png"))
            .count();
        assert_eq!(pngs, 3 * 4);
        let text = std::fs::read_to_string(summary.text_path.unwrap()).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
