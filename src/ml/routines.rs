// ============================================================
// Layer 5 — Training Routines
// ============================================================
// The three training modes as TrainingRoutine implementations.
// Each pairs a learner (Layer 5 trainer) with its dev set, the
// validator for its mode and the checkpoint slots it owns:
//
//   Seq2SeqRoutine — encoder + decoder, slots encoder_/decoder_
//   MixRoutine     — role encoder + decoder, slots mix_tpr_/mix_decoder_
//   TpdnRoutine    — role encoder alone, slot tpr_, with the
//                    regularisation temperature schedule
//
// Validation always runs on `module.valid()`, the same weights on
// the inner backend without autodiff tracking.

use burn::{module::AutodiffModule, optim::Optimizer, tensor::backend::AutodiffBackend};

use crate::domain::{
    error::TrainingResult,
    sequence::{Sequence, TprSample},
    traits::{DigitTask, RoleFunction},
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    annealing::TemperatureSchedule,
    driver::TrainingRoutine,
    interfaces::{RoleEncoder, SequenceDecoder, SequenceEncoder},
    loss::LossBreakdown,
    trainer::{MixLearner, Seq2SeqLearner, TprLearner},
    validator::{dev_loss, dev_loss_mix, dev_loss_tpr},
};

// ─── Seq2SeqRoutine ───────────────────────────────────────────────────────────
pub struct Seq2SeqRoutine<'a, B, E, D, OE, OD>
where
    B: AutodiffBackend,
{
    pub learner:  Seq2SeqLearner<B, E, D, OE, OD>,
    dev:          &'a [Vec<Sequence>],
    task:         &'a dyn DigitTask,
    checkpoints:  &'a CheckpointManager,
    encoder_slot: String,
    decoder_slot: String,
    device:       B::Device,
}

impl<'a, B, E, D, OE, OD> Seq2SeqRoutine<'a, B, E, D, OE, OD>
where
    B: AutodiffBackend,
{
    pub fn new(
        learner:     Seq2SeqLearner<B, E, D, OE, OD>,
        dev:         &'a [Vec<Sequence>],
        task:        &'a dyn DigitTask,
        checkpoints: &'a CheckpointManager,
        prefix:      &str,
        device:      B::Device,
    ) -> Self {
        Self {
            learner,
            dev,
            task,
            checkpoints,
            encoder_slot: format!("encoder_{prefix}"),
            decoder_slot: format!("decoder_{prefix}"),
            device,
        }
    }

    pub fn slots(&self) -> (&str, &str) {
        (&self.encoder_slot, &self.decoder_slot)
    }
}

impl<'a, B, E, D, OE, OD> TrainingRoutine for Seq2SeqRoutine<'a, B, E, D, OE, OD>
where
    B:  AutodiffBackend,
    E:  SequenceEncoder<B> + AutodiffModule<B>,
    D:  SequenceDecoder<B> + AutodiffModule<B>,
    E::InnerModule: SequenceEncoder<B::InnerBackend>,
    D::InnerModule: SequenceDecoder<B::InnerBackend>,
    OE: Optimizer<E, B>,
    OD: Optimizer<D, B>,
{
    type Batch = Vec<Sequence>;

    fn train_batch(&mut self, batch: &Vec<Sequence>) -> TrainingResult<f64> {
        self.learner.train_batch(batch, self.task)
    }

    fn validate(&mut self) -> TrainingResult<f64> {
        dev_loss::<B::InnerBackend, _, _>(
            &self.learner.encoder.valid(),
            &self.learner.decoder.valid(),
            self.dev,
            self.task,
            &self.device,
        )
    }

    fn save_checkpoint(&mut self) -> TrainingResult<()> {
        let encoder = self.checkpoints.stage_module::<B, _>(&self.learner.encoder, &self.encoder_slot)?;
        let decoder = self.checkpoints.stage_module::<B, _>(&self.learner.decoder, &self.decoder_slot)?;
        self.checkpoints.commit(vec![encoder, decoder])
    }
}

// ─── MixRoutine ───────────────────────────────────────────────────────────────
pub struct MixRoutine<'a, B, R, D, OR, OD>
where
    B: AutodiffBackend,
{
    pub learner:  MixLearner<B, R, D, OR, OD>,
    dev:          &'a [Vec<Sequence>],
    task:         &'a dyn DigitTask,
    roles:        &'a dyn RoleFunction,
    checkpoints:  &'a CheckpointManager,
    role_slot:    String,
    decoder_slot: String,
    device:       B::Device,
}

impl<'a, B, R, D, OR, OD> MixRoutine<'a, B, R, D, OR, OD>
where
    B: AutodiffBackend,
{
    pub fn new(
        learner:     MixLearner<B, R, D, OR, OD>,
        dev:         &'a [Vec<Sequence>],
        task:        &'a dyn DigitTask,
        roles:       &'a dyn RoleFunction,
        checkpoints: &'a CheckpointManager,
        prefix:      &str,
        device:      B::Device,
    ) -> Self {
        Self {
            learner,
            dev,
            task,
            roles,
            checkpoints,
            role_slot:    format!("mix_tpr_{prefix}"),
            decoder_slot: format!("mix_decoder_{prefix}"),
            device,
        }
    }

    pub fn slots(&self) -> (&str, &str) {
        (&self.role_slot, &self.decoder_slot)
    }
}

impl<'a, B, R, D, OR, OD> TrainingRoutine for MixRoutine<'a, B, R, D, OR, OD>
where
    B:  AutodiffBackend,
    R:  RoleEncoder<B> + AutodiffModule<B>,
    D:  SequenceDecoder<B> + AutodiffModule<B>,
    R::InnerModule: RoleEncoder<B::InnerBackend>,
    D::InnerModule: SequenceDecoder<B::InnerBackend>,
    OR: Optimizer<R, B>,
    OD: Optimizer<D, B>,
{
    type Batch = Vec<Sequence>;

    fn train_batch(&mut self, batch: &Vec<Sequence>) -> TrainingResult<f64> {
        let (loss, _encoding) = self.learner.train_batch(batch, self.task, self.roles)?;
        Ok(loss)
    }

    fn validate(&mut self) -> TrainingResult<f64> {
        dev_loss_mix::<B::InnerBackend, _, _>(
            &self.learner.role_encoder.valid(),
            self.roles,
            &self.learner.decoder.valid(),
            self.dev,
            self.task,
            &self.device,
        )
    }

    fn save_checkpoint(&mut self) -> TrainingResult<()> {
        let role_encoder = self.checkpoints.stage_module::<B, _>(&self.learner.role_encoder, &self.role_slot)?;
        let decoder = self.checkpoints.stage_module::<B, _>(&self.learner.decoder, &self.decoder_slot)?;
        self.checkpoints.commit(vec![role_encoder, decoder])
    }
}

// ─── TpdnRoutine ──────────────────────────────────────────────────────────────
pub struct TpdnRoutine<'a, B, R, O>
where
    B: AutodiffBackend,
{
    pub learner: TprLearner<B, R, O>,
    dev:         &'a [Vec<TprSample>],
    checkpoints: &'a CheckpointManager,
    slot:        String,
    schedule:    TemperatureSchedule,
    metrics:     Option<MetricsLogger>,
    device:      B::Device,

    // Running training loss of the current epoch
    epoch:         usize,
    epoch_train:   LossBreakdown,
    epoch_batches: usize,
}

impl<'a, B, R, O> TpdnRoutine<'a, B, R, O>
where
    B: AutodiffBackend,
{
    pub fn new(
        learner:     TprLearner<B, R, O>,
        dev:         &'a [Vec<TprSample>],
        checkpoints: &'a CheckpointManager,
        prefix:      &str,
        burn_in:     usize,
        device:      B::Device,
    ) -> Self {
        Self {
            learner,
            dev,
            checkpoints,
            slot: format!("tpr_{prefix}"),
            schedule: TemperatureSchedule::new(burn_in),
            metrics: None,
            device,
            epoch: 0,
            epoch_train: LossBreakdown::default(),
            epoch_batches: 0,
        }
    }

    /// Also write one CSV row per epoch.
    pub fn with_metrics(mut self, logger: MetricsLogger) -> Self {
        self.metrics = Some(logger);
        self
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }
}

impl<'a, B, R, O> TrainingRoutine for TpdnRoutine<'a, B, R, O>
where
    B: AutodiffBackend,
    R: RoleEncoder<B> + AutodiffModule<B>,
    R::InnerModule: RoleEncoder<B::InnerBackend>,
    O: Optimizer<R, B>,
{
    type Batch = Vec<TprSample>;

    fn begin_epoch(&mut self, epoch: usize) -> TrainingResult<bool> {
        let step = self.schedule.begin_epoch(epoch);
        self.epoch = epoch;
        self.epoch_train = LossBreakdown::default();
        self.epoch_batches = 0;

        if let Some(reg) = self.learner.role_encoder.regularizer_mut() {
            if step.enable_regularization {
                tracing::info!("Burn-in over at epoch {epoch}, regularisation on");
                reg.use_regularization(true);
            }
            if let Some(temp) = step.temperature {
                tracing::info!("Regularisation temperature {temp:.4}");
                reg.set_regularization_temp(temp);
            }
        }
        Ok(step.checkpoint_gate)
    }

    fn train_batch(&mut self, batch: &Vec<TprSample>) -> TrainingResult<f64> {
        let breakdown = self.learner.train_batch(batch)?;
        self.epoch_train.add(&breakdown);
        self.epoch_batches += 1;
        Ok(breakdown.total)
    }

    fn validate(&mut self) -> TrainingResult<f64> {
        let v = dev_loss_tpr::<B::InnerBackend, _>(&self.learner.role_encoder.valid(), self.dev, &self.device)?;

        tracing::info!(
            "epoch {}: dev mse {:.6}, one-hot {:.6}, unique-role {:.6}, l2 {:.6}",
            self.epoch,
            v.loss.mse,
            v.loss.one_hot,
            v.loss.unique_role,
            v.loss.l2,
        );
        if let Some(roles) = &v.roles {
            tracing::info!(
                "roles used: {}, low-confidence predictions: {:.2}% of {}",
                roles.roles_used,
                roles.low_confidence_pct(),
                roles.positions,
            );
        }

        if let Some(logger) = &self.metrics {
            let train = self.epoch_train.averaged(self.epoch_batches);
            let row = EpochMetrics::new(self.epoch, self.schedule.temperature(), &train, &v);
            if let Err(e) = logger.log(&row) {
                tracing::warn!("Could not write metrics row: {e:#}");
            }
        }

        Ok(v.loss.total)
    }

    fn save_checkpoint(&mut self) -> TrainingResult<()> {
        self.checkpoints.save_module::<B, _>(&self.learner.role_encoder, &self.slot)
    }
}
