//! Pairwise genotype/location feature extractor.
//!
//! # Architecture
//!
//! ```text
//! genotypes [B, S, n]                locations [B, 2, n]
//!       │ gather combination columns        │ gather combination columns
//!       ▼                                   ▼
//! [B·P, k, S]                         [B, P, 2, k] ──flatten──► [B, P, 2k]
//!       │
//!       ▼  × conv_iterations (shared weights)
//! ┌────────────────────────────────┐
//! │ Conv1d(k=2, valid) → ReLU      │
//! │ AvgPool1d(10, stride 10)       │
//! └────────────────────────────────┘
//!       │ [B·P, C, L]
//!       ▼
//! Linear(C → 128) → ReLU per position, flatten ──► [B, P, L·128]
//!       │
//!       └──────────── concat ◄──────────── [B, P, 2k]
//!                       │
//!                       ▼
//!              feature block [B, P, L·128 + 2k]
//! ```
//!
//! Every combination goes through the same convolution and dense weights;
//! all `P` combinations are processed as one batch of `B·P` sequences.

use tch::{nn, nn::Module, Kind, Tensor};

use crate::combinations::PairCombinations;
use crate::plan::{ExtractorPlan, CONV_KERNEL, EMBED_WIDTH, POOL_SIZE};

/// Shared-weight feature extractor.
pub struct FeatureExtractor {
    convs: Vec<nn::Conv1D>,
    dense: nn::Linear,
    indices: Tensor,
    pairs: i64,
    size: i64,
    feature_dim: i64,
}

impl FeatureExtractor {
    /// Register the extractor's weights under `path`.
    pub fn new(path: &nn::Path, plan: &ExtractorPlan, combinations: &PairCombinations) -> Self {
        let convs = plan
            .conv_layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                nn::conv1d(
                    &(path / format!("conv{i}")),
                    layer.in_channels as i64,
                    layer.out_channels as i64,
                    CONV_KERNEL as i64,
                    Default::default(),
                )
            })
            .collect();
        let dense = nn::linear(
            &(path / "dense"),
            plan.dense_in as i64,
            EMBED_WIDTH as i64,
            Default::default(),
        );
        let flat: Vec<i64> = combinations.flat_indices().into_iter().map(|i| i as i64).collect();
        FeatureExtractor {
            convs,
            dense,
            indices: Tensor::from_slice(&flat).to_device(path.device()),
            pairs: combinations.len() as i64,
            size: combinations.combination_size() as i64,
            feature_dim: plan.feature_dim as i64,
        }
    }

    /// Width of each feature row.
    pub fn feature_dim(&self) -> i64 {
        self.feature_dim
    }

    /// Build the feature block.
    ///
    /// - `genotypes`: `[B, num_snps, n]`
    /// - `locations`: `[B, 2, n]`
    ///
    /// Returns `[B, pairs, feature_dim]`, rows in combination order.
    pub fn forward(&self, genotypes: &Tensor, locations: &Tensor) -> Tensor {
        let batch = genotypes.size()[0];
        let snps = genotypes.size()[1];
        let (p, k) = (self.pairs, self.size);

        let mut h = genotypes
            .to_kind(Kind::Float)
            .index_select(2, &self.indices)
            .reshape([batch, snps, p, k])
            .permute([0, 2, 3, 1])
            .reshape([batch * p, k, snps]);
        for conv in &self.convs {
            h = conv
                .forward(&h)
                .relu()
                .avg_pool1d([POOL_SIZE as i64], [POOL_SIZE as i64], [0], false, true);
        }
        // [B·P, C, L] → [B·P, L, C] so the dense acts on channels per position.
        let embedding = h
            .transpose(1, 2)
            .apply(&self.dense)
            .relu()
            .reshape([batch, p, -1]);

        let locs = locations
            .to_kind(Kind::Float)
            .index_select(2, &self.indices)
            .reshape([batch, 2, p, k])
            .permute([0, 2, 1, 3])
            .reshape([batch, p, 2 * k]);

        Tensor::cat(&[embedding, locs], 2)
    }
}
