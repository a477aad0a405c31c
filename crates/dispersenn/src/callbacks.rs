//! Validation-loss bookkeeping for the training loop.
//!
//! [`ValidationMonitor`] folds three end-of-epoch rules over the validation
//! loss:
//!
//! - **save best**: report an improvement whenever the loss is strictly
//!   lower than every previous epoch;
//! - **early stopping**: stop once `patience` consecutive epochs passed
//!   without improvement;
//! - **plateau decay**: multiply the learning rate by `factor` every
//!   `lr_patience` consecutive epochs without improvement.
//!
//! The monitor holds no tensors, so the rules are usable and testable without
//! a tensor backend.

/// Learning-rate multiplier applied on a plateau.
pub const PLATEAU_FACTOR: f64 = 0.5;

/// What the training loop should do after an epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochDecision {
    /// The loss is a new best; save a checkpoint.
    pub improved: bool,
    /// New learning rate, when the plateau rule fired.
    pub new_lr: Option<f64>,
    /// Stop training after this epoch.
    pub stop: bool,
}

/// Tracks the best validation loss and the stale-epoch counters.
#[derive(Debug, Clone)]
pub struct ValidationMonitor {
    patience: usize,
    lr_patience: usize,
    factor: f64,
    lr: f64,
    best: f64,
    best_epoch: Option<usize>,
    wait: usize,
    lr_wait: usize,
}

impl ValidationMonitor {
    /// Monitor with early-stopping `patience`, plateau patience
    /// `patience / 10` and factor [`PLATEAU_FACTOR`].
    pub fn new(patience: usize, initial_lr: f64) -> Self {
        Self::with_plateau(patience, patience / 10, PLATEAU_FACTOR, initial_lr)
    }

    /// Monitor with explicit plateau settings.
    pub fn with_plateau(patience: usize, lr_patience: usize, factor: f64, initial_lr: f64) -> Self {
        ValidationMonitor {
            patience,
            lr_patience,
            factor,
            lr: initial_lr,
            best: f64::INFINITY,
            best_epoch: None,
            wait: 0,
            lr_wait: 0,
        }
    }

    /// Record the validation loss of `epoch`.
    ///
    /// A non-finite loss never counts as an improvement.
    pub fn observe(&mut self, epoch: usize, val_loss: f64) -> EpochDecision {
        if val_loss < self.best {
            self.best = val_loss;
            self.best_epoch = Some(epoch);
            self.wait = 0;
            self.lr_wait = 0;
            return EpochDecision { improved: true, new_lr: None, stop: false };
        }

        self.wait += 1;
        self.lr_wait += 1;
        let mut new_lr = None;
        if self.lr_wait >= self.lr_patience {
            self.lr *= self.factor;
            self.lr_wait = 0;
            new_lr = Some(self.lr);
        }
        EpochDecision { improved: false, new_lr, stop: self.wait >= self.patience }
    }

    /// Lowest loss seen so far (`inf` before the first epoch).
    pub fn best(&self) -> f64 {
        self.best
    }

    /// Epoch of the lowest loss.
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Current learning rate.
    pub fn lr(&self) -> f64 {
        self.lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improvement_resets_counters() {
        let mut m = ValidationMonitor::new(3, 1e-3);
        assert!(m.observe(0, 1.0).improved);
        assert!(!m.observe(1, 1.0).improved);
        assert!(m.observe(2, 0.5).improved);
        assert_eq!(m.best_epoch(), Some(2));
        assert!(!m.observe(3, 0.6).stop);
        assert!(!m.observe(4, 0.6).stop);
        assert!(m.observe(5, 0.6).stop);
    }

    #[test]
    fn plateau_halves_lr_every_lr_patience_epochs() {
        // patience 20 -> lr_patience 2.
        let mut m = ValidationMonitor::new(20, 1.0);
        m.observe(0, 1.0);
        assert_eq!(m.observe(1, 2.0).new_lr, None);
        assert_eq!(m.observe(2, 2.0).new_lr, Some(0.5));
        assert_eq!(m.observe(3, 2.0).new_lr, None);
        assert_eq!(m.observe(4, 2.0).new_lr, Some(0.25));
        assert_eq!(m.lr(), 0.25);
    }

    #[test]
    fn small_patience_decays_every_stale_epoch() {
        let mut m = ValidationMonitor::new(5, 1.0);
        m.observe(0, 1.0);
        assert_eq!(m.observe(1, 1.0).new_lr, Some(0.5));
        assert_eq!(m.observe(2, 1.0).new_lr, Some(0.25));
    }

    #[test]
    fn nan_loss_is_not_an_improvement() {
        let mut m = ValidationMonitor::new(1, 1.0);
        let d = m.observe(0, f64::NAN);
        assert!(!d.improved);
        assert!(d.stop);
        assert!(m.best_epoch().is_none());
    }
}
