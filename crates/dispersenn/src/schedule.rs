//! Log-uniform resolution schedule for the upsampling pyramid.
//!
//! Map sizes are evenly spaced in log-space between `min_tensor` and
//! `size_out` and rounded half-to-even:
//!
//! ```text
//! bin    = (ln size_out − ln min_tensor) / (num_layers − 1)
//! res[i] = round_half_even(exp(ln min_tensor + bin · i))
//! ```

use tracing::debug;

use crate::error::ConfigError;

/// Strictly increasing map side lengths, first `min_tensor`, last `size_out`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionSchedule {
    sizes: Vec<usize>,
}

impl ResolutionSchedule {
    /// Plan `num_layers` sizes from `min_tensor` to `size_out`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] when `num_layers < 2`, `min_tensor` is
    /// zero or not below `size_out`, or when rounding collapses two adjacent
    /// sizes.
    pub fn new(min_tensor: usize, size_out: usize, num_layers: usize) -> Result<Self, ConfigError> {
        if num_layers < 2 {
            return Err(ConfigError::invalid_value(
                "upsample",
                format!("need at least 2 stages, got {num_layers}"),
            ));
        }
        if min_tensor == 0 || min_tensor >= size_out {
            return Err(ConfigError::invalid_value(
                "min_tensor",
                format!("must be in [1, {size_out}), got {min_tensor}"),
            ));
        }

        let lo = (min_tensor as f64).ln();
        let hi = (size_out as f64).ln();
        let bin = (hi - lo) / (num_layers - 1) as f64;

        let mut sizes = Vec::with_capacity(num_layers);
        for i in 0..num_layers {
            let size = if i == num_layers - 1 {
                size_out
            } else {
                (lo + bin * i as f64).exp().round_ties_even() as usize
            };
            if let Some(&prev) = sizes.last() {
                if size <= prev {
                    return Err(ConfigError::invalid_value(
                        "upsample",
                        format!(
                            "{num_layers} stages between {min_tensor} and {size_out} repeat size {size}"
                        ),
                    ));
                }
            }
            sizes.push(size);
        }

        debug!(?sizes, "resolution schedule");
        Ok(ResolutionSchedule { sizes })
    }

    /// All sizes in pyramid order.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// Always `false`; a schedule has at least two stages.
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Size of stage `i`.
    pub fn get(&self, i: usize) -> Option<usize> {
        self.sizes.get(i).copied()
    }

    /// The output size.
    pub fn last(&self) -> usize {
        self.sizes[self.sizes.len() - 1]
    }
}
