//! Evaluation metrics for predicted dispersal and density maps.
//!
//! This module provides per-channel:
//!
//! - **RMSE**: root mean squared error over every pixel.
//! - **MAE**: mean absolute error over every pixel.
//! - **R²**: coefficient of determination of prediction against truth.
//!
//! Results are accumulated over maps via [`MetricsAccumulator`] and
//! finalized into a [`MetricsResult`] at the end of a validation epoch or a
//! prediction run. Maps are compared in whichever space they are passed in;
//! prediction output denormalizes first.

use ndarray::Array2;

use crate::channels::{Channel, ChannelPair};

// ---------------------------------------------------------------------------
// MetricsResult
// ---------------------------------------------------------------------------

/// Error summary for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelMetrics {
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Coefficient of determination; `NaN` when truth is constant.
    pub r2: f64,
}

/// Aggregated metrics over every map passed to the accumulator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricsResult {
    /// Per-channel errors.
    pub channels: ChannelPair<ChannelMetrics>,
    /// Number of maps evaluated.
    pub num_maps: usize,
}

impl MetricsResult {
    /// Mean RMSE over both channels.
    pub fn mean_rmse(&self) -> f64 {
        (self.channels.dispersal.rmse + self.channels.density.rmse) / 2.0
    }

    /// Returns `true` when this result has strictly lower mean RMSE.
    pub fn is_better_than(&self, other: &MetricsResult) -> bool {
        self.mean_rmse() < other.mean_rmse()
    }

    /// A human-readable summary line suitable for logging.
    pub fn summary(&self) -> String {
        let c = &self.channels;
        format!(
            "dispersal RMSE={:.4} R²={:.4}  density RMSE={:.4} R²={:.4}  (n_maps={})",
            c.dispersal.rmse, c.dispersal.r2, c.density.rmse, c.density.r2, self.num_maps
        )
    }
}

// ---------------------------------------------------------------------------
// MetricsAccumulator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct Sums {
    count: u64,
    sq_err: f64,
    abs_err: f64,
    truth: f64,
    truth_sq: f64,
}

/// Running accumulator for map metrics.
///
/// Call [`MetricsAccumulator::update`] for each map pair, then
/// [`MetricsAccumulator::finalize`].
#[derive(Debug, Clone, Default)]
pub struct MetricsAccumulator {
    sums: ChannelPair<Sums>,
    num_maps: usize,
}

impl MetricsAccumulator {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one predicted/true map pair. Mismatched shapes compare the
    /// overlapping region only.
    pub fn update(&mut self, prediction: &ChannelPair<Array2<f32>>, truth: &ChannelPair<Array2<f32>>) {
        for channel in Channel::ALL {
            let (p, t) = (prediction.get(channel), truth.get(channel));
            let sums = self.sums.get_mut(channel);
            for (&pv, &tv) in p.iter().zip(t.iter()) {
                let (pv, tv) = (f64::from(pv), f64::from(tv));
                let err = pv - tv;
                sums.count += 1;
                sums.sq_err += err * err;
                sums.abs_err += err.abs();
                sums.truth += tv;
                sums.truth_sq += tv * tv;
            }
        }
        self.num_maps += 1;
    }

    /// Finalize and return aggregated metrics.
    ///
    /// Returns `None` if no maps have been accumulated yet.
    pub fn finalize(&self) -> Option<MetricsResult> {
        if self.num_maps == 0 {
            return None;
        }
        let channels = self.sums.map(|_, s| {
            let n = s.count.max(1) as f64;
            let ss_tot = s.truth_sq - s.truth * s.truth / n;
            ChannelMetrics {
                rmse: (s.sq_err / n).sqrt(),
                mae: s.abs_err / n,
                r2: if ss_tot > 0.0 { 1.0 - s.sq_err / ss_tot } else { f64::NAN },
            }
        });
        Some(MetricsResult { channels, num_maps: self.num_maps })
    }

    /// Return the accumulated map count.
    pub fn num_maps(&self) -> usize {
        self.num_maps
    }

    /// Reset the accumulator to the initial (empty) state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
