//! Network topology derived from the configuration, free of any tensor code.
//!
//! Everything about the network that depends only on scalar parameters is
//! computed here, before a single weight is allocated:
//!
//! ```text
//! TrainingConfig
//!     │
//!     ├──► PairCombinations   (which individuals each feature row compares)
//!     ├──► ExtractorPlan      (conv/pool stack, embedding width)
//!     └──► ResolutionSchedule ──► PyramidPlan (one StagePlan per map size)
//! ```
//!
//! The tch executors in `extractor` and `pyramid` only interpret these
//! plans, so every topology error surfaces as a [`ConfigError`] up front.

use serde::Serialize;
use tracing::info;

use crate::combinations::PairCombinations;
use crate::config::TrainingConfig;
use crate::error::ConfigError;
use crate::schedule::ResolutionSchedule;

/// Width of the shared dense transform applied to each position.
pub const EMBED_WIDTH: usize = 128;

/// Filters in the first convolution iteration.
pub const BASE_FILTERS: usize = 64;

/// Filters added per further iteration.
pub const FILTER_STEP: usize = 44;

/// Convolution kernel length.
pub const CONV_KERNEL: usize = 2;

/// Average-pooling window and stride.
pub const POOL_SIZE: usize = 10;

// ---------------------------------------------------------------------------
// ExtractorPlan
// ---------------------------------------------------------------------------

/// One convolution + pooling iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConvLayerPlan {
    /// Input channels.
    pub in_channels: usize,
    /// Filters.
    pub out_channels: usize,
    /// Sequence length entering the convolution.
    pub len_in: usize,
    /// Sequence length after pooling.
    pub len_out: usize,
}

/// Shape of the per-combination feature extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractorPlan {
    /// SNPs per example.
    pub num_snps: usize,
    /// Individuals per combination.
    pub combination_size: usize,
    /// Convolution iterations in order.
    pub conv_layers: Vec<ConvLayerPlan>,
    /// Input width of the shared dense transform.
    pub dense_in: usize,
    /// Sequence length after the last iteration.
    pub final_len: usize,
    /// `final_len · 128`.
    pub embedding_dim: usize,
    /// `embedding_dim + 2 · combination_size`.
    pub feature_dim: usize,
}

impl ExtractorPlan {
    /// Plan the extractor for `num_snps` SNP rows and combinations of
    /// `combination_size` individuals out of `n`.
    ///
    /// Runs `max(0, floor(log10 num_snps) − 1)` iterations of a kernel-2
    /// valid convolution with `64 + 44·i` filters followed by a floor-mode
    /// average pool of 10.
    pub fn new(num_snps: usize, n: usize, combination_size: usize) -> Result<Self, ConfigError> {
        if num_snps == 0 {
            return Err(ConfigError::invalid_value("num_snps", "must be > 0"));
        }
        if combination_size == 0 || combination_size > n {
            return Err(ConfigError::invalid_value(
                "combination_size",
                format!("must be in [1, n={n}], got {combination_size}"),
            ));
        }

        let iterations = (num_snps.ilog10() as usize).saturating_sub(1);
        let mut conv_layers = Vec::with_capacity(iterations);
        let mut channels = combination_size;
        let mut len = num_snps;
        for i in 0..iterations {
            let filters = BASE_FILTERS + FILTER_STEP * i;
            let after_conv = len.saturating_sub(CONV_KERNEL - 1);
            let len_out = after_conv / POOL_SIZE;
            if len_out == 0 {
                return Err(ConfigError::invalid_value(
                    "num_snps",
                    format!("sequence of {num_snps} SNPs pools to length 0 at iteration {i}"),
                ));
            }
            conv_layers.push(ConvLayerPlan {
                in_channels: channels,
                out_channels: filters,
                len_in: len,
                len_out,
            });
            channels = filters;
            len = len_out;
        }

        let embedding_dim = len * EMBED_WIDTH;
        Ok(ExtractorPlan {
            num_snps,
            combination_size,
            conv_layers,
            dense_in: channels,
            final_len: len,
            embedding_dim,
            feature_dim: embedding_dim + 2 * combination_size,
        })
    }
}

// ---------------------------------------------------------------------------
// PyramidPlan
// ---------------------------------------------------------------------------

/// Activation after a stage's dense transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Activation {
    /// Rectified linear.
    Relu,
    /// Identity.
    Linear,
}

/// Transposed convolution from one stage's map size to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpsampleStep {
    /// Input side length.
    pub from: usize,
    /// Output side length.
    pub to: usize,
    /// Kernel side length, `to − from + 1`.
    pub kernel: usize,
}

/// One pyramid stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagePlan {
    /// Stage index.
    pub index: usize,
    /// Map side length `R`.
    pub resolution: usize,
    /// `ceil(pairs / R)`.
    pub num_partitions: usize,
    /// Zero rows appended so the rows fill `num_partitions · R`.
    pub padded_rows: usize,
    /// Whether the previous stage's map is concatenated before the features.
    pub skip: bool,
    /// Dense input width.
    pub dense_in: usize,
    /// Dense output width (`R`).
    pub dense_out: usize,
    /// Activation after the dense transform.
    pub activation: Activation,
    /// Upsampling to the next stage, absent on the final stage.
    pub upsample: Option<UpsampleStep>,
}

impl StagePlan {
    /// `true` when rows are split into several partitions and mean-pooled.
    pub fn is_multi_partition(&self) -> bool {
        self.num_partitions > 1
    }
}

/// The full stack of pyramid stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyramidPlan {
    /// Rows in the feature block.
    pub pairs: usize,
    /// Columns in the feature block.
    pub feature_dim: usize,
    /// Stages in order.
    pub stages: Vec<StagePlan>,
}

impl PyramidPlan {
    /// Plan one stage per entry of `schedule`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Unsupported`] when the final stage would need more
    /// than one partition, which has no defined output mapping.
    pub fn new(
        schedule: &ResolutionSchedule,
        pairs: usize,
        feature_dim: usize,
    ) -> Result<Self, ConfigError> {
        if pairs == 0 {
            return Err(ConfigError::invalid_value("pairs", "must be > 0"));
        }
        let sizes = schedule.sizes();
        let last = sizes.len() - 1;
        let mut stages = Vec::with_capacity(sizes.len());
        for (u, &r) in sizes.iter().enumerate() {
            let num_partitions = (pairs + r - 1) / r;
            if u == last && num_partitions > 1 {
                return Err(ConfigError::unsupported(format!(
                    "final stage of size {r} would need {num_partitions} partitions for {pairs} pairs"
                )));
            }
            let skip = u > 0;
            let upsample = sizes.get(u + 1).map(|&to| UpsampleStep { from: r, to, kernel: to - r + 1 });
            stages.push(StagePlan {
                index: u,
                resolution: r,
                num_partitions,
                padded_rows: num_partitions * r - pairs,
                skip,
                dense_in: feature_dim + if skip { r } else { 0 },
                dense_out: r,
                activation: if u == last { Activation::Linear } else { Activation::Relu },
                upsample,
            });
        }
        Ok(PyramidPlan { pairs, feature_dim, stages })
    }

    /// Output side length.
    pub fn size_out(&self) -> usize {
        self.stages.last().map_or(0, |s| s.resolution)
    }
}

// ---------------------------------------------------------------------------
// ModelPlan
// ---------------------------------------------------------------------------

/// Everything needed to build the network, derived from one configuration.
#[derive(Debug, Clone)]
pub struct ModelPlan {
    /// Individuals compared by each feature row.
    pub combinations: PairCombinations,
    /// Map sizes per stage.
    pub schedule: ResolutionSchedule,
    /// Feature extractor shape.
    pub extractor: ExtractorPlan,
    /// Pyramid stages.
    pub pyramid: PyramidPlan,
}

impl ModelPlan {
    /// Validate `config` and derive the whole topology from it.
    pub fn from_config(config: &TrainingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let combinations =
            PairCombinations::sample(config.n, config.combination_size, config.pairs, config.seed)?;
        let extractor = ExtractorPlan::new(config.num_snps, config.n, config.combination_size)?;
        let schedule = ResolutionSchedule::new(config.min_tensor, config.size_out, config.upsample)?;
        let pyramid = PyramidPlan::new(&schedule, config.pairs, extractor.feature_dim)?;

        info!(
            conv_iterations = extractor.conv_layers.len(),
            feature_dim = extractor.feature_dim,
            sizes = ?schedule.sizes(),
            "model plan"
        );
        for stage in &pyramid.stages {
            info!(
                stage = stage.index,
                resolution = stage.resolution,
                partitions = stage.num_partitions,
                padded_rows = stage.padded_rows,
                "pyramid stage"
            );
        }

        Ok(ModelPlan { combinations, schedule, extractor, pyramid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extractor_for_thousand_snps() {
        let p = ExtractorPlan::new(1000, 20, 2).unwrap();
        assert_eq!(p.conv_layers.len(), 2);
        assert_eq!(p.conv_layers[0].out_channels, 64);
        assert_eq!(p.conv_layers[1].out_channels, 108);
        assert_eq!(p.final_len, 9);
        assert_eq!(p.feature_dim, 1156);
    }

    #[test]
    fn extractor_below_ten_snps_has_no_conv() {
        let p = ExtractorPlan::new(7, 4, 2).unwrap();
        assert!(p.conv_layers.is_empty());
        assert_eq!(p.dense_in, 2);
        assert_eq!(p.embedding_dim, 7 * EMBED_WIDTH);
    }

    #[test]
    fn extractor_default_snps() {
        // 4999/10 = 499, then 498/10 = 49.
        let p = ExtractorPlan::new(5000, 10, 2).unwrap();
        assert_eq!(p.conv_layers.len(), 2);
        assert_eq!(p.final_len, 49);
        assert_eq!(p.dense_in, 108);
        assert_eq!(p.feature_dim, 49 * 128 + 4);
    }

    #[test]
    fn partitions_for_45_pairs() {
        let s = ResolutionSchedule::new(10, 500, 8).unwrap();
        let p = PyramidPlan::new(&s, 45, 100).unwrap();
        assert_eq!((p.stages[0].num_partitions, p.stages[0].padded_rows), (5, 5));
        assert_eq!((p.stages[1].num_partitions, p.stages[1].padded_rows), (3, 6));
        assert_eq!((p.stages[3].num_partitions, p.stages[3].padded_rows), (1, 8));
        assert!(!p.stages[0].skip);
        assert_eq!(p.stages[1].dense_in, 117);
        assert_eq!(p.stages[7].activation, Activation::Linear);
        assert!(p.stages[7].upsample.is_none());
        assert_eq!(p.stages[0].upsample, Some(UpsampleStep { from: 10, to: 17, kernel: 8 }));
    }

    #[test]
    fn multi_partition_final_stage_unsupported() {
        let s = ResolutionSchedule::new(10, 20, 2).unwrap();
        assert!(matches!(PyramidPlan::new(&s, 45, 8), Err(ConfigError::Unsupported(_))));
    }

    #[test]
    fn model_plan_from_default_config() {
        let plan = ModelPlan::from_config(&TrainingConfig::default()).unwrap();
        assert_eq!(plan.combinations.len(), 45);
        assert_eq!(plan.pyramid.stages.len(), 6);
        assert_eq!(plan.pyramid.size_out(), 500);
    }
}
