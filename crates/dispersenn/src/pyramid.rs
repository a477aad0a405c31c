//! Multi-resolution pyramid executor.
//!
//! Interprets a [`PyramidPlan`] on [`ChannelPair`] state. Each stage maps the
//! feature block (plus, after the first stage, the previous map) to an
//! `R × R` map per channel, then upsamples it to the next stage's size:
//!
//! ```text
//! feature block [B, P, F] ──► dispersal slot
//! zeros         [B, P, F] ──► density slot
//!
//! per stage, per channel:
//!   pad rows to NP·R ─► group [B, NP, R, F] ─► (concat prev map [B, R, R])
//!     ─► Linear(F(+R) → R), shared by partitions and both channels
//!     ─► mean over partitions ─► [B, R, R]
//!     ─► ConvTranspose2d(1→1, k = R' − R + 1) + ReLU, one per channel ─► [B, R', R']
//! ```
//!
//! The two channels never share a tensor, so no pooling or upsampling step can
//! mix them.

use tch::{nn, nn::Module, Tensor};

use crate::channels::{Channel, ChannelPair};
use crate::error::ConfigError;
use crate::plan::{Activation, PyramidPlan, StagePlan};

struct Stage {
    plan: StagePlan,
    dense: nn::Linear,
    upsample: Option<ChannelPair<nn::ConvTranspose2D>>,
}

impl Stage {
    fn new(path: &nn::Path, plan: &StagePlan) -> Self {
        let dense = nn::linear(
            &(path / "dense"),
            plan.dense_in as i64,
            plan.dense_out as i64,
            Default::default(),
        );
        let upsample = plan.upsample.map(|step| {
            ChannelPair::from_fn(|c: Channel| {
                nn::conv_transpose2d(
                    &(path / format!("upsample_{}", c.name())),
                    1,
                    1,
                    step.kernel as i64,
                    Default::default(),
                )
            })
        });
        Stage { plan: plan.clone(), dense, upsample }
    }

    /// Stage map for one channel slot, before upsampling: `[B, R, R]`.
    fn map(&self, features: &Tensor, prev: Option<&Tensor>) -> Tensor {
        let r = self.plan.resolution as i64;
        let parts = self.plan.num_partitions.max(1) as i64;
        let size = features.size();
        let (batch, feat) = (size[0], size[2]);

        let padded = features.constant_pad_nd([0, 0, 0, self.plan.padded_rows as i64]);
        let mut x = padded.reshape([batch, parts, r, feat]);
        if let Some(prev) = prev {
            let prev = prev.unsqueeze(1).expand([batch, parts, r, r], false);
            x = Tensor::cat(&[prev, x], 3);
        }
        let mut h = x.apply(&self.dense);
        if self.plan.activation == Activation::Relu {
            h = h.relu();
        }
        h.mean_dim(1, false, None)
    }

    /// Stage output per channel, upsampled when the stage has a successor.
    fn run(&self, inputs: &ChannelPair<Tensor>, prev: Option<&ChannelPair<Tensor>>) -> ChannelPair<Tensor> {
        let maps = ChannelPair::from_fn(|c| self.map(inputs.get(c), prev.map(|p| p.get(c))));
        match &self.upsample {
            Some(ups) => maps.zip(ups.each_ref(), |_, m, conv| {
                conv.forward(&m.unsqueeze(1)).relu().squeeze_dim(1)
            }),
            None => maps,
        }
    }
}

/// The upsampling pyramid.
pub struct PyramidNet {
    first: Stage,
    rest: Vec<Stage>,
}

impl PyramidNet {
    /// Register one dense transform per stage and one transposed
    /// convolution per channel per non-final stage under `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] when `plan` has no stages.
    pub fn new(path: &nn::Path, plan: &PyramidPlan) -> Result<Self, ConfigError> {
        let mut stages = plan
            .stages
            .iter()
            .map(|s| Stage::new(&(path / format!("stage{}", s.index)), s));
        let first = stages
            .next()
            .ok_or_else(|| ConfigError::invalid_value("stages", "pyramid plan has no stages"))?;
        Ok(PyramidNet { first, rest: stages.collect() })
    }

    /// Run the pyramid on a `[B, P, F]` feature block.
    ///
    /// Returns `[B, size_out, size_out]` per channel.
    pub fn forward(&self, features: &Tensor) -> ChannelPair<Tensor> {
        let inputs = ChannelPair::new(features.shallow_clone(), features.zeros_like());
        let mut maps = self.first.run(&inputs, None);
        for stage in &self.rest {
            maps = stage.run(&inputs, Some(&maps));
        }
        maps
    }
}
