//! Loss function for dispersenn training.
//!
//! Each channel is scored with a pixel-wise mean squared error in normalized
//! space, and the two channel losses are averaged:
//!
//! ```text
//! L_total = (MSE(dispersal) + MSE(density)) / 2
//! ```
//!
//! This equals a single MSE over the stacked `[B, H, W, 2]` target.

use tch::{Reduction, Tensor};

use crate::channels::ChannelPair;

/// Scalar components of one loss evaluation, detached for logging.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LossComponents {
    /// Mean of the two channel losses.
    pub total: f64,
    /// Dispersal channel MSE.
    pub dispersal: f64,
    /// Density channel MSE.
    pub density: f64,
}

/// Two-channel mean squared error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispersalLoss;

impl DispersalLoss {
    /// Create the loss.
    pub fn new() -> Self {
        DispersalLoss
    }

    /// Compute the loss.
    ///
    /// Returns the differentiable scalar together with its detached
    /// components.
    ///
    /// # Shapes
    /// - `prediction`, `target`: `[B, H, W]` per channel
    pub fn forward(
        &self,
        prediction: &ChannelPair<Tensor>,
        target: &ChannelPair<Tensor>,
    ) -> (Tensor, LossComponents) {
        let per_channel = prediction
            .each_ref()
            .zip(target.each_ref(), |_, p, t| p.mse_loss(t, Reduction::Mean));
        let total = (&per_channel.dispersal + &per_channel.density) / 2.0;
        let components = LossComponents {
            total: total.double_value(&[]),
            dispersal: per_channel.dispersal.double_value(&[]),
            density: per_channel.density.double_value(&[]),
        };
        (total, components)
    }
}
