// ============================================================
// Layer 5 — Epoch Driver
// ============================================================
// One state machine for all three training modes:
//
//   for each epoch:
//     routine.begin_epoch        (annealing hook, checkpoint gate)
//     shuffle batch order
//     for each batch:
//       routine.train_batch
//       every n batches: validate → progress line → save if best
//     end-of-epoch evaluation when scheduled per epoch
//     no improvement this epoch → patience counter += 1
//     counter == patience       → stop
//
// State: best_loss (starts at +∞), consecutive non-improving
// epochs, whether the current epoch improved. Terminal states are
// max_epochs exhausted and patience exhausted.
//
// Epochs whose gate is closed still validate and still write a
// progress line, but can neither save a checkpoint nor count
// toward patience.
//
// A non-finite training or validation loss stops the run with
// NumericDivergence instead of optimising on. Any other error
// raised by the routine or the progress log is wrapped in AtStep
// with the epoch and batch it happened at.

use std::io::Write;

use rand::{seq::SliceRandom, Rng};

use crate::domain::error::{TrainingError, TrainingResult};
use crate::infra::progress::ProgressLog;

/// One training mode plugged into the driver.
pub trait TrainingRoutine {
    type Batch;

    /// Called before every epoch. Returns whether this epoch may
    /// select a checkpoint.
    fn begin_epoch(&mut self, _epoch: usize) -> TrainingResult<bool> {
        Ok(true)
    }

    /// One optimisation step; returns the batch training loss.
    fn train_batch(&mut self, batch: &Self::Batch) -> TrainingResult<f64>;

    /// Dev-set loss of the current parameters.
    fn validate(&mut self) -> TrainingResult<f64>;

    /// Persist the current parameters as the best so far.
    fn save_checkpoint(&mut self) -> TrainingResult<()>;
}

/// When validation runs inside an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalSchedule {
    /// At batch indices 0, n, 2n, ...
    EveryBatches(usize),

    /// Once, after the last batch
    EndOfEpoch,
}

#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub max_epochs: usize,
    pub patience:   usize,
    pub schedule:   EvalSchedule,
}

impl LoopSettings {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.patience == 0 {
            return Err(TrainingError::InvalidConfig("patience must be at least 1".into()));
        }
        if self.schedule == EvalSchedule::EveryBatches(0) {
            return Err(TrainingError::InvalidConfig("print_every must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxEpochs,
    PatienceExhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    /// Lowest gated dev loss; +∞ if nothing was ever saved
    pub best_loss: f64,

    pub epochs_run: usize,
    pub stop:       StopReason,

    /// Dev loss at every checkpoint save, in order
    pub saved_losses: Vec<f64>,
}

// ─── Loop state ───────────────────────────────────────────────────────────────
struct LoopState {
    best_loss:    f64,
    saved_losses: Vec<f64>,
    improved:     bool,
}

impl LoopState {
    fn evaluate<Rt: TrainingRoutine, W: Write>(
        &mut self,
        routine:  &mut Rt,
        progress: &mut ProgressLog<W>,
        epoch:    usize,
        batch:    usize,
        gate:     bool,
    ) -> TrainingResult<()> {
        let loss = routine.validate().map_err(|e| e.at_step(epoch, batch))?;
        if !loss.is_finite() {
            return Err(TrainingError::NumericDivergence { epoch, batch, loss });
        }
        progress.record(epoch, batch, loss).map_err(|e| e.at_step(epoch, batch))?;
        tracing::info!("epoch {epoch} batch {batch}: dev loss {loss:.6}");

        if gate && loss < self.best_loss {
            routine.save_checkpoint().map_err(|e| e.at_step(epoch, batch))?;
            tracing::info!("New best dev loss {loss:.6}, checkpoint saved");
            self.best_loss = loss;
            self.saved_losses.push(loss);
            self.improved = true;
        }
        Ok(())
    }
}

/// Drive `routine` over `batches` until max_epochs or patience runs out.
///
/// The batch list is reshuffled in place at the start of every epoch.
pub fn run_epochs<Rt, W, R>(
    routine:  &mut Rt,
    batches:  &mut [Rt::Batch],
    settings: &LoopSettings,
    progress: &mut ProgressLog<W>,
    rng:      &mut R,
) -> TrainingResult<TrainingOutcome>
where
    Rt: TrainingRoutine,
    W:  Write,
    R:  Rng + ?Sized,
{
    settings.validate()?;
    if batches.is_empty() {
        return Err(TrainingError::empty("train"));
    }

    let mut state = LoopState {
        best_loss:    f64::INFINITY,
        saved_losses: Vec::new(),
        improved:     false,
    };
    let mut not_improved = 0;
    let mut epochs_run = 0;
    let mut stop = StopReason::MaxEpochs;

    for epoch in 0..settings.max_epochs {
        let gate = routine.begin_epoch(epoch).map_err(|e| e.at_step(epoch, 0))?;
        tracing::info!(
            "Epoch {}/{}{}",
            epoch + 1,
            settings.max_epochs,
            if gate { "" } else { " (no checkpointing)" },
        );
        batches.shuffle(rng);
        state.improved = false;
        epochs_run = epoch + 1;

        for (index, batch) in batches.iter().enumerate() {
            let loss = routine.train_batch(batch).map_err(|e| e.at_step(epoch, index))?;
            if !loss.is_finite() {
                return Err(TrainingError::NumericDivergence { epoch, batch: index, loss });
            }
            if let EvalSchedule::EveryBatches(n) = settings.schedule {
                if index % n == 0 {
                    state.evaluate(routine, progress, epoch, index, gate)?;
                }
            }
        }
        if settings.schedule == EvalSchedule::EndOfEpoch {
            state.evaluate(routine, progress, epoch, batches.len(), gate)?;
        }

        if !gate {
            continue;
        }
        if state.improved {
            not_improved = 0;
        } else {
            not_improved += 1;
            if not_improved >= settings.patience {
                tracing::info!("No improvement for {not_improved} epoch(s), stopping early");
                stop = StopReason::PatienceExhausted;
                break;
            }
        }
    }

    tracing::info!("Training finished after {epochs_run} epoch(s); best dev loss {:.6}", state.best_loss);
    Ok(TrainingOutcome {
        best_loss:    state.best_loss,
        epochs_run,
        stop,
        saved_losses: state.saved_losses,
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    /// Replays scripted dev losses; counts calls.
    struct Scripted {
        dev_losses: Vec<f64>,
        next_dev:   usize,
        train_loss: f64,
        gates:      Option<Vec<bool>>,
        trained:    usize,
        saves:      usize,
        fail_save:  bool,
        bad_batch:  Option<usize>,
    }

    impl Scripted {
        fn new(dev_losses: Vec<f64>) -> Self {
            Self {
                dev_losses,
                next_dev: 0,
                train_loss: 1.0,
                gates: None,
                trained: 0,
                saves: 0,
                fail_save: false,
                bad_batch: None,
            }
        }
    }

    /// A sink whose every write fails.
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl TrainingRoutine for Scripted {
        type Batch = usize;

        fn begin_epoch(&mut self, epoch: usize) -> TrainingResult<bool> {
            Ok(self.gates.as_ref().map(|g| g[epoch]).unwrap_or(true))
        }

        fn train_batch(&mut self, batch: &usize) -> TrainingResult<f64> {
            if self.bad_batch == Some(*batch) {
                return Err(TrainingError::ShapeMismatch { expected: 3, found: 2, position: 0 });
            }
            self.trained += 1;
            Ok(self.train_loss)
        }

        fn validate(&mut self) -> TrainingResult<f64> {
            let loss = self.dev_losses[self.next_dev.min(self.dev_losses.len() - 1)];
            self.next_dev += 1;
            Ok(loss)
        }

        fn save_checkpoint(&mut self) -> TrainingResult<()> {
            if self.fail_save {
                return Err(TrainingError::CheckpointWrite { path: "ck".into(), message: "disk full".into() });
            }
            self.saves += 1;
            Ok(())
        }
    }

    fn settings(max_epochs: usize, patience: usize, schedule: EvalSchedule) -> LoopSettings {
        LoopSettings { max_epochs, patience, schedule }
    }

    fn run(routine: &mut Scripted, batches: usize, s: LoopSettings) -> (TrainingResult<TrainingOutcome>, String) {
        let mut items: Vec<usize> = (0..batches).collect();
        let mut log = ProgressLog::new(Vec::new());
        let mut rng = StdRng::seed_from_u64(7);
        let outcome = run_epochs(routine, &mut items, &s, &mut log, &mut rng);
        (outcome, String::from_utf8(log.into_inner()).unwrap())
    }

    #[test]
    fn test_patience_halts_after_consecutive_misses() {
        let mut r = Scripted::new(vec![5.0, 4.0, 4.5, 4.6, 4.4]);
        let (outcome, log) = run(&mut r, 3, settings(100, 2, EvalSchedule::EndOfEpoch));
        let outcome = outcome.unwrap();

        assert_eq!(outcome.stop, StopReason::PatienceExhausted);
        assert_eq!(outcome.epochs_run, 4);
        assert_eq!(outcome.best_loss, 4.0);
        assert_eq!(outcome.saved_losses, vec![5.0, 4.0]);
        assert_eq!(r.next_dev, 4);
        assert_eq!(log.lines().count(), 4);
    }

    #[test]
    fn test_not_before_patience() {
        let mut r = Scripted::new(vec![1.0, 2.0, 2.0, 2.0, 0.5, 2.0]);
        let (outcome, _) = run(&mut r, 2, settings(6, 3, EvalSchedule::EndOfEpoch));
        let outcome = outcome.unwrap();
        // 3 misses after 1.0 halt at epoch 4 before 0.5 is seen
        assert_eq!(outcome.epochs_run, 4);
        assert_eq!(outcome.best_loss, 1.0);
    }

    #[test]
    fn test_saved_losses_strictly_decrease() {
        let mut r = Scripted::new(vec![3.0, 2.0, 2.0, 2.5, 1.0, 1.0, 0.9, 3.0]);
        let (outcome, _) = run(&mut r, 4, settings(8, 8, EvalSchedule::EndOfEpoch));
        let outcome = outcome.unwrap();
        assert_eq!(outcome.stop, StopReason::MaxEpochs);
        assert_eq!(outcome.saved_losses, vec![3.0, 2.0, 1.0, 0.9]);
        assert!(outcome.saved_losses.windows(2).all(|w| w[1] < w[0]));
        assert_eq!(r.saves, 4);
    }

    #[test]
    fn test_every_n_batches_includes_batch_zero() {
        let mut r = Scripted::new(vec![5.0, 4.0, 3.0, 2.0, 1.0, 0.5]);
        let (outcome, log) = run(&mut r, 5, settings(2, 1, EvalSchedule::EveryBatches(2)));
        outcome.unwrap();
        // batches 0, 2, 4 in each of 2 epochs
        let batches: Vec<&str> = log.lines().map(|l| l.split('\t').nth(1).unwrap()).collect();
        assert_eq!(batches, vec!["0", "2", "4", "0", "2", "4"]);
        assert_eq!(r.trained, 10);
    }

    #[test]
    fn test_closed_gate_logs_but_neither_saves_nor_counts() {
        let mut r = Scripted::new(vec![1.0, 0.5, 0.4, 2.0, 2.0]);
        r.gates = Some(vec![false, false, true, true, true]);
        let (outcome, log) = run(&mut r, 1, settings(5, 1, EvalSchedule::EndOfEpoch));
        let outcome = outcome.unwrap();

        assert_eq!(log.lines().count(), 4);
        assert_eq!(outcome.saved_losses, vec![0.4]);
        assert_eq!(outcome.stop, StopReason::PatienceExhausted);
        assert_eq!(outcome.epochs_run, 4);
    }

    #[test]
    fn test_nan_training_loss_diverges() {
        let mut r = Scripted::new(vec![1.0]);
        r.train_loss = f64::NAN;
        let (outcome, _) = run(&mut r, 3, settings(3, 1, EvalSchedule::EndOfEpoch));
        assert!(matches!(
            outcome,
            Err(TrainingError::NumericDivergence { epoch: 0, batch: 0, .. })
        ));
    }

    #[test]
    fn test_infinite_dev_loss_diverges() {
        let mut r = Scripted::new(vec![f64::INFINITY]);
        let (outcome, _) = run(&mut r, 2, settings(3, 1, EvalSchedule::EndOfEpoch));
        assert!(matches!(
            outcome,
            Err(TrainingError::NumericDivergence { epoch: 0, batch: 2, .. })
        ));
    }

    #[test]
    fn test_failed_checkpoint_stops_with_position() {
        let mut r = Scripted::new(vec![3.0, 2.0]);
        r.fail_save = true;
        let (outcome, log) = run(&mut r, 4, settings(5, 5, EvalSchedule::EndOfEpoch));
        let err = outcome.unwrap_err();

        assert!(matches!(err, TrainingError::AtStep { epoch: 0, batch: 4, .. }));
        assert!(matches!(err.root(), TrainingError::CheckpointWrite { .. }));
        assert!(err.to_string().contains("disk full"));
        // the first epoch's line is written, no later epoch runs
        assert_eq!(log.lines().count(), 1);
        assert_eq!(r.trained, 4);
        assert_eq!(r.next_dev, 1);
    }

    #[test]
    fn test_failed_progress_write_stops_with_position() {
        let mut r = Scripted::new(vec![3.0, 2.0]);
        let mut items: Vec<usize> = (0..3).collect();
        let mut log = ProgressLog::new(FullDisk);
        let mut rng = StdRng::seed_from_u64(7);
        let s = settings(5, 5, EvalSchedule::EveryBatches(2));
        let err = run_epochs(&mut r, &mut items, &s, &mut log, &mut rng).unwrap_err();

        assert!(matches!(err, TrainingError::AtStep { epoch: 0, batch: 0, .. }));
        assert!(matches!(err.root(), TrainingError::Io(_)));
        assert_eq!(r.trained, 1);
        assert_eq!(r.saves, 0);
    }

    #[test]
    fn test_batch_shape_error_names_its_batch() {
        let mut r = Scripted::new(vec![1.0]);
        r.bad_batch = Some(2);
        let (outcome, _) = run(&mut r, 4, settings(3, 3, EvalSchedule::EndOfEpoch));
        let err = outcome.unwrap_err();

        let TrainingError::AtStep { epoch, batch, .. } = &err else {
            panic!("expected a positioned error, got {err:?}");
        };
        assert_eq!(*epoch, 0);
        assert!(*batch < 4);
        assert!(matches!(err.root(), TrainingError::ShapeMismatch { .. }));
        assert_eq!(r.next_dev, 0);
    }

    #[test]
    fn test_empty_training_set_is_an_error() {
        let mut r = Scripted::new(vec![1.0]);
        let (outcome, _) = run(&mut r, 0, settings(3, 1, EvalSchedule::EndOfEpoch));
        assert!(matches!(outcome, Err(TrainingError::EmptyBatchSet { .. })));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(settings(1, 0, EvalSchedule::EndOfEpoch).validate().is_err());
        assert!(settings(1, 1, EvalSchedule::EveryBatches(0)).validate().is_err());
        assert!(settings(1, 1, EvalSchedule::EveryBatches(3)).validate().is_ok());
    }
}
