// ============================================================
// Layer 5 — Regularisation Annealing
// ============================================================
// Learned role assignment is trained in two phases:
//
//   epochs 0 .. burn_in    regularisation off (warm-up)
//   epoch  burn_in         regularisation on, ramp starts
//   ramp                   temperature = (epoch − burn_in + 1) / burn_in
//   after the ramp         temperature pinned at 1.0 for good
//
// With burn_in == 0 the ramp is skipped and the temperature is 1.0
// from the first epoch.
//
// Checkpoint selection (and with it early stopping) is only open
// on the burn-in epoch itself and once the temperature is pinned,
// so a checkpoint is never chosen while the regularisation
// strength is still moving underneath it.

/// What to do to the role encoder before an epoch starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnealStep {
    /// Switch the regularisation terms on this epoch
    pub enable_regularization: bool,

    /// New temperature to apply, if it changes this epoch
    pub temperature: Option<f64>,

    /// Whether this epoch's validation loss may select a checkpoint
    pub checkpoint_gate: bool,
}

#[derive(Debug, Clone)]
pub struct TemperatureSchedule {
    burn_in:     usize,
    reached_max: bool,
    temperature: f64,
}

impl TemperatureSchedule {
    pub fn new(burn_in: usize) -> Self {
        Self {
            burn_in,
            reached_max: false,
            temperature: 0.0,
        }
    }

    /// Current temperature (0.0 before burn-in).
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn reached_max(&self) -> bool {
        self.reached_max
    }

    /// Advance the schedule to `epoch`. Epochs must be visited in order.
    pub fn begin_epoch(&mut self, epoch: usize) -> AnnealStep {
        let mut step = AnnealStep {
            enable_regularization: epoch == self.burn_in,
            temperature:           None,
            checkpoint_gate:       false,
        };

        if epoch == self.burn_in && self.burn_in == 0 {
            self.temperature = 1.0;
            self.reached_max = true;
            step.temperature = Some(1.0);
        }

        if epoch >= self.burn_in && !self.reached_max {
            let temp = (epoch - self.burn_in + 1) as f64 / self.burn_in as f64;
            if temp <= 1.0 {
                self.temperature = temp;
                step.temperature = Some(temp);
            } else {
                self.reached_max = true;
            }
        }

        step.checkpoint_gate = self.reached_max || epoch == self.burn_in;
        step
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_burn_in_starts_at_max() {
        let mut s = TemperatureSchedule::new(0);
        let first = s.begin_epoch(0);
        assert!(first.enable_regularization);
        assert_eq!(first.temperature, Some(1.0));
        assert!(first.checkpoint_gate);

        for epoch in 1..5 {
            let step = s.begin_epoch(epoch);
            assert!(!step.enable_regularization);
            assert_eq!(step.temperature, None);
            assert!(step.checkpoint_gate);
            assert_eq!(s.temperature(), 1.0);
        }
    }

    #[test]
    fn test_warm_up_epochs_are_unregularised_and_ungated() {
        let mut s = TemperatureSchedule::new(3);
        for epoch in 0..3 {
            let step = s.begin_epoch(epoch);
            assert!(!step.enable_regularization);
            assert_eq!(step.temperature, None);
            assert!(!step.checkpoint_gate);
        }
        let at_burn_in = s.begin_epoch(3);
        assert!(at_burn_in.enable_regularization);
        assert!(at_burn_in.checkpoint_gate);
    }

    #[test]
    fn test_ramp_then_pinned() {
        let burn_in = 4;
        let mut s = TemperatureSchedule::new(burn_in);
        let temps: Vec<f64> = (0..12).map(|e| { s.begin_epoch(e); s.temperature() }).collect();

        assert_eq!(&temps[..4], &[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(&temps[4..8], &[0.25, 0.5, 0.75, 1.0]);
        assert!(temps[8..].iter().all(|t| *t == 1.0));
        assert!(temps.windows(2).all(|w| w[1] >= w[0]));
        assert!(s.reached_max());
    }

    #[test]
    fn test_gate_closed_during_ramp() {
        let mut s = TemperatureSchedule::new(2);
        let gates: Vec<bool> = (0..6).map(|e| s.begin_epoch(e).checkpoint_gate).collect();
        // burn-in epoch open, ramp closed, open again once pinned
        assert_eq!(gates, vec![false, false, true, false, true, true]);
    }
}
