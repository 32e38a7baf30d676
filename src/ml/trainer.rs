// ============================================================
// Layer 5 — Single-Batch Trainers
// ============================================================
// One forward pass, one loss, one backward pass, one optimiser
// step per module. Three variants:
//
//   Seq2SeqLearner — encoder + decoder, NLL over output positions
//   MixLearner     — role encoder stands in for the encoder and
//                    feeds the decoder; roles come from a fixed
//                    role function
//   TprLearner     — role encoder alone, MSE onto target vectors
//                    plus the learned-role regularisation terms
//
// Burn builds a fresh gradient container on every backward(),
// so there is no "zero_grad" step: gradients never accumulate
// across batches. With two modules behind one loss, the
// container is split with GradientsParams::from_module and each
// optimiser only sees its own module's gradients.
//
// Optimizer::step consumes the module and returns the updated
// one; Burn modules are cheap to clone (parameters are shared
// handles), so the learners clone into step and store the result.
//
// Reference: Burn Book §5 (Custom Training Loop)
//            Kingma & Ba (2015) Adam

use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::TensorBatcher;
use crate::domain::{
    error::{TrainingError, TrainingResult},
    sequence::{Sequence, TprSample},
    traits::{DigitTask, RoleFunction},
};
use crate::ml::{
    interfaces::{RoleEncoder, SequenceDecoder, SequenceEncoder},
    loss::{mse_loss, scalar, sequence_nll, LossBreakdown},
};

// ─── Seq2SeqLearner ───────────────────────────────────────────────────────────
pub struct Seq2SeqLearner<B, E, D, OE, OD>
where
    B: AutodiffBackend,
{
    pub encoder:   E,
    pub decoder:   D,
    encoder_optim: OE,
    decoder_optim: OD,
    lr:            f64,
    batcher:       TensorBatcher<B>,
}

impl<B, E, D, OE, OD> Seq2SeqLearner<B, E, D, OE, OD>
where
    B:  AutodiffBackend,
    E:  SequenceEncoder<B> + AutodiffModule<B>,
    D:  SequenceDecoder<B> + AutodiffModule<B>,
    OE: Optimizer<E, B>,
    OD: Optimizer<D, B>,
{
    pub fn new(encoder: E, decoder: D, encoder_optim: OE, decoder_optim: OD, lr: f64, device: B::Device) -> Self {
        Self {
            encoder,
            decoder,
            encoder_optim,
            decoder_optim,
            lr,
            batcher: TensorBatcher::new(device),
        }
    }

    /// Train on one length-homogeneous batch.
    ///
    /// The summed per-position loss is back-propagated; the returned
    /// value is that sum divided by the batch size.
    pub fn train_batch(&mut self, items: &[Sequence], task: &dyn DigitTask) -> TrainingResult<f64> {
        let batch = self.batcher.sequences(items, task, None)?;

        let encoding  = self.encoder.encode(batch.inputs);
        let log_probs = self.decoder.decode(encoding, batch.seq_len, &batch.parses);
        let loss      = sequence_nll(log_probs, batch.targets)?;
        let loss_val  = scalar(loss.clone()) / batch.batch_size as f64;

        let mut grads = loss.backward();
        let encoder_grads = GradientsParams::from_module(&mut grads, &self.encoder);
        let decoder_grads = GradientsParams::from_module(&mut grads, &self.decoder);

        self.encoder = self.encoder_optim.step(self.lr, self.encoder.clone(), encoder_grads);
        self.decoder = self.decoder_optim.step(self.lr, self.decoder.clone(), decoder_grads);

        Ok(loss_val)
    }
}

// ─── MixLearner ───────────────────────────────────────────────────────────────
pub struct MixLearner<B, R, D, OR, OD>
where
    B: AutodiffBackend,
{
    pub role_encoder: R,
    pub decoder:      D,
    role_optim:       OR,
    decoder_optim:    OD,
    lr:               f64,
    batcher:          TensorBatcher<B>,
}

impl<B, R, D, OR, OD> MixLearner<B, R, D, OR, OD>
where
    B:  AutodiffBackend,
    R:  RoleEncoder<B> + AutodiffModule<B>,
    D:  SequenceDecoder<B> + AutodiffModule<B>,
    OR: Optimizer<R, B>,
    OD: Optimizer<D, B>,
{
    pub fn new(role_encoder: R, decoder: D, role_optim: OR, decoder_optim: OD, lr: f64, device: B::Device) -> Self {
        Self {
            role_encoder,
            decoder,
            role_optim,
            decoder_optim,
            lr,
            batcher: TensorBatcher::new(device),
        }
    }

    /// Train decoder and role encoder on one batch.
    ///
    /// The loss is divided by the batch size before back-propagation.
    /// Returns it together with the role encoding (detached, on the
    /// inner backend) for inspection.
    pub fn train_batch(
        &mut self,
        items: &[Sequence],
        task:  &dyn DigitTask,
        roles: &dyn RoleFunction,
    ) -> TrainingResult<(f64, Tensor<B::InnerBackend, 2>)> {
        let batch = self.batcher.sequences(items, task, Some(roles))?;
        let role_ids = batch
            .roles
            .ok_or_else(|| TrainingError::InvalidConfig("batch carries no role ids".into()))?;

        let encoded   = self.role_encoder.encode(batch.inputs, role_ids);
        let encoding  = encoded.encoding;
        let log_probs = self.decoder.decode(encoding.clone(), batch.seq_len, &batch.parses);
        let loss      = sequence_nll(log_probs, batch.targets)?.div_scalar(batch.batch_size as f64);
        let loss_val  = scalar(loss.clone());

        let mut grads = loss.backward();
        let decoder_grads = GradientsParams::from_module(&mut grads, &self.decoder);
        let role_grads    = GradientsParams::from_module(&mut grads, &self.role_encoder);

        self.decoder      = self.decoder_optim.step(self.lr, self.decoder.clone(), decoder_grads);
        self.role_encoder = self.role_optim.step(self.lr, self.role_encoder.clone(), role_grads);

        Ok((loss_val, encoding.inner()))
    }
}

// ─── TprLearner ───────────────────────────────────────────────────────────────
pub struct TprLearner<B, R, O>
where
    B: AutodiffBackend,
{
    pub role_encoder: R,
    optim:            O,
    lr:               f64,
    batcher:          TensorBatcher<B>,
}

impl<B, R, O> TprLearner<B, R, O>
where
    B: AutodiffBackend,
    R: RoleEncoder<B> + AutodiffModule<B>,
    O: Optimizer<R, B>,
{
    pub fn new(role_encoder: R, optim: O, lr: f64, device: B::Device) -> Self {
        Self {
            role_encoder,
            optim,
            lr,
            batcher: TensorBatcher::new(device),
        }
    }

    /// Train the role encoder on one batch of (fillers, roles, target) triples.
    ///
    /// total = mse + one_hot + unique_role + l2; the last three are
    /// zero for encoders without the regularisation capability.
    pub fn train_batch(&mut self, items: &[TprSample]) -> TrainingResult<LossBreakdown> {
        let batch = self.batcher.tpr(items)?;
        let out   = self.role_encoder.encode(batch.fillers, batch.roles);
        let mse   = mse_loss(out.encoding, batch.targets)?;

        let terms = match (out.role_predictions, self.role_encoder.regularizer()) {
            (Some(preds), Some(reg)) => Some(reg.regularization_loss(preds)),
            _ => None,
        };

        let mut breakdown = LossBreakdown {
            mse: scalar(mse.clone()),
            ..Default::default()
        };
        let total = match terms {
            Some(t) => {
                breakdown.one_hot     = scalar(t.one_hot.clone());
                breakdown.l2          = scalar(t.l2.clone());
                breakdown.unique_role = scalar(t.unique_role.clone());
                mse + t.sum()
            }
            None => mse,
        };
        breakdown.total = scalar(total.clone());

        let grads = total.backward();
        let grads = GradientsParams::from_grads(grads, &self.role_encoder);
        self.role_encoder = self.optim.step(self.lr, self.role_encoder.clone(), grads);

        Ok(breakdown)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        roles::{RoleAssigner, RoleScheme},
        tasks::TaskKind,
    };
    use crate::domain::traits::RoleFunction;
    use crate::ml::{
        interfaces::RoleRegularizer,
        model::{
            PositionDecoderConfig, PositionalEncoderConfig, RoleLearningEncoderConfig,
            TensorProductEncoderConfig,
        },
    };
    use burn::{
        backend::{Autodiff, NdArray},
        optim::AdamConfig,
    };

    type TestBackend = Autodiff<NdArray>;

    fn digit_batch() -> Vec<Sequence> {
        vec![vec![1, 2, 3], vec![3, 2, 1], vec![0, 4, 4], vec![5, 1, 0]]
    }

    #[test]
    fn test_seq2seq_step_reduces_loss_on_repeated_batch() {
        let device = Default::default();
        let encoder = PositionalEncoderConfig::new(6, 3, 16).init::<TestBackend>(&device);
        let decoder = PositionDecoderConfig::new(6, 3, 16, 8).init::<TestBackend>(&device);
        let mut learner = Seq2SeqLearner::new(
            encoder,
            decoder,
            AdamConfig::new().init(),
            AdamConfig::new().init(),
            0.01,
            device,
        );

        let batch = digit_batch();
        let first = learner.train_batch(&batch, &TaskKind::Autoencode).unwrap();
        let mut last = first;
        for _ in 0..30 {
            last = learner.train_batch(&batch, &TaskKind::Autoencode).unwrap();
        }
        assert!(first.is_finite());
        assert!(last < first, "loss did not drop: {first} -> {last}");
    }

    #[test]
    fn test_seq2seq_rejects_mixed_lengths() {
        let device = Default::default();
        let mut learner = Seq2SeqLearner::new(
            PositionalEncoderConfig::new(6, 4, 8).init::<TestBackend>(&device),
            PositionDecoderConfig::new(6, 4, 8, 8).init::<TestBackend>(&device),
            AdamConfig::new().init(),
            AdamConfig::new().init(),
            0.01,
            device,
        );
        let ragged = vec![vec![1, 2, 3], vec![1, 2]];
        assert!(learner.train_batch(&ragged, &TaskKind::Reverse).is_err());
    }

    #[test]
    fn test_mix_returns_encoding_per_sequence() {
        let device = Default::default();
        let roles = RoleAssigner::new(RoleScheme::Ltr, 3);
        let mut learner = MixLearner::new(
            TensorProductEncoderConfig::new(6, roles.num_roles(), 4, 4, 16).init::<TestBackend>(&device),
            PositionDecoderConfig::new(6, 3, 16, 8).init::<TestBackend>(&device),
            AdamConfig::new().init(),
            AdamConfig::new().init(),
            0.01,
            device,
        );
        let (loss, encoding) = learner.train_batch(&digit_batch(), &TaskKind::Reverse, &roles).unwrap();
        assert!(loss.is_finite() && loss > 0.0);
        assert_eq!(encoding.dims(), [4, 16]);
    }

    fn tpr_items() -> Vec<TprSample> {
        (0..4)
            .map(|i| TprSample::new(vec![i, i + 1, i + 2], vec![0, 1, 2], vec![0.1 * i as f32; 6]))
            .collect()
    }

    #[test]
    fn test_tpr_fixed_roles_has_no_regularization_terms() {
        let device = Default::default();
        let mut learner = TprLearner::new(
            TensorProductEncoderConfig::new(8, 3, 4, 4, 6).init::<TestBackend>(&device),
            AdamConfig::new().init(),
            0.01,
            device,
        );
        let b = learner.train_batch(&tpr_items()).unwrap();
        assert_eq!(b.one_hot, 0.0);
        assert_eq!(b.l2, 0.0);
        assert_eq!(b.unique_role, 0.0);
        assert!((b.total - b.mse).abs() < 1e-9);
    }

    #[test]
    fn test_tpr_total_is_sum_of_components() {
        let device = Default::default();
        let mut encoder = RoleLearningEncoderConfig::new(8, 3, 3, 4, 4, 6).init::<TestBackend>(&device);
        encoder.use_regularization(true);
        encoder.set_regularization_temp(1.0);

        let mut learner = TprLearner::new(encoder, AdamConfig::new().init(), 0.01, device);
        let b = learner.train_batch(&tpr_items()).unwrap();
        let sum = b.mse + b.one_hot + b.l2 + b.unique_role;
        assert!((b.total - sum).abs() < 1e-4, "{b:?}");
        assert!(b.one_hot > 0.0);
    }
}
