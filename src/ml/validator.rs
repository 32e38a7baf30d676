// ============================================================
// Layer 5 — Validators
// ============================================================
// Dev-set losses. The callers hand in `module.valid()`, so these
// run on the inner (non-autodiff) backend and never record a
// graph. Every loss is the sum of per-batch losses divided by
// the number of dev batches; an empty dev set is an error
// rather than a division by zero.

use std::collections::BTreeSet;

use burn::prelude::*;

use crate::data::batcher::TensorBatcher;
use crate::domain::{
    error::{TrainingError, TrainingResult},
    sequence::{Sequence, TprSample},
    traits::{DigitTask, RoleFunction},
};
use crate::ml::{
    interfaces::{RoleEncoder, SequenceDecoder, SequenceEncoder},
    loss::{host_vec, mse_loss, scalar, sequence_nll, LossBreakdown},
};

/// A role assignment counts as low-confidence below this probability.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.98;

/// Mean over dev batches of the summed per-position NLL.
pub fn dev_loss<B, E, D>(
    encoder: &E,
    decoder: &D,
    dev:     &[Vec<Sequence>],
    task:    &dyn DigitTask,
    device:  &B::Device,
) -> TrainingResult<f64>
where
    B: Backend,
    E: SequenceEncoder<B>,
    D: SequenceDecoder<B>,
{
    if dev.is_empty() {
        return Err(TrainingError::empty("dev"));
    }
    let batcher = TensorBatcher::<B>::new(device.clone());

    let mut total = 0.0;
    for items in dev {
        let batch     = batcher.sequences(items, task, None)?;
        let encoding  = encoder.encode(batch.inputs);
        let log_probs = decoder.decode(encoding, batch.seq_len, &batch.parses);
        total += scalar(sequence_nll(log_probs, batch.targets)?);
    }
    Ok(total / dev.len() as f64)
}

/// Same as [`dev_loss`] with a role encoder fed by a fixed role function.
pub fn dev_loss_mix<B, R, D>(
    role_encoder: &R,
    roles:        &dyn RoleFunction,
    decoder:      &D,
    dev:          &[Vec<Sequence>],
    task:         &dyn DigitTask,
    device:       &B::Device,
) -> TrainingResult<f64>
where
    B: Backend,
    R: RoleEncoder<B>,
    D: SequenceDecoder<B>,
{
    if dev.is_empty() {
        return Err(TrainingError::empty("dev"));
    }
    let batcher = TensorBatcher::<B>::new(device.clone());

    let mut total = 0.0;
    for items in dev {
        let batch = batcher.sequences(items, task, Some(roles))?;
        let role_ids = batch
            .roles
            .ok_or_else(|| TrainingError::InvalidConfig("batch carries no role ids".into()))?;
        let encoding  = role_encoder.encode(batch.inputs, role_ids).encoding;
        let log_probs = decoder.decode(encoding, batch.seq_len, &batch.parses);
        total += scalar(sequence_nll(log_probs, batch.targets)?);
    }
    Ok(total / dev.len() as f64)
}

// ─── Role encoder validation ──────────────────────────────────────────────────
/// How decisively a role-learning encoder assigns roles on the dev set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleDiagnostics {
    /// Distinct argmax roles over all dev positions
    pub roles_used: usize,

    /// Positions whose top role probability is below the threshold
    pub low_confidence: usize,

    pub positions: usize,
}

impl RoleDiagnostics {
    /// Percentage of positions with a low-confidence assignment.
    pub fn low_confidence_pct(&self) -> f64 {
        if self.positions == 0 {
            return 0.0;
        }
        100.0 * self.low_confidence as f64 / self.positions as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct TprValidation {
    /// Per-component means over dev batches
    pub loss: LossBreakdown,

    /// Present only for encoders that learn their roles
    pub roles: Option<RoleDiagnostics>,
}

/// Dev loss of a role encoder: MSE plus, when the encoder learns
/// its roles, the regularisation terms and role diagnostics.
pub fn dev_loss_tpr<B, R>(
    role_encoder: &R,
    dev:          &[Vec<TprSample>],
    device:       &B::Device,
) -> TrainingResult<TprValidation>
where
    B: Backend,
    R: RoleEncoder<B>,
{
    if dev.is_empty() {
        return Err(TrainingError::empty("dev"));
    }
    let batcher = TensorBatcher::<B>::new(device.clone());

    let mut sum = LossBreakdown::default();
    let mut used = BTreeSet::new();
    let mut diagnostics: Option<RoleDiagnostics> = None;

    for items in dev {
        let batch = batcher.tpr(items)?;
        let out   = role_encoder.encode(batch.fillers, batch.roles);

        let mut breakdown = LossBreakdown {
            mse: scalar(mse_loss(out.encoding, batch.targets)?),
            ..Default::default()
        };

        if let (Some(preds), Some(reg)) = (out.role_predictions, role_encoder.regularizer()) {
            let stats = diagnostics.get_or_insert_with(RoleDiagnostics::default);
            tally_roles(preds.clone(), stats, &mut used)?;

            let terms = reg.regularization_loss(preds);
            breakdown.one_hot     = scalar(terms.one_hot);
            breakdown.l2          = scalar(terms.l2);
            breakdown.unique_role = scalar(terms.unique_role);
        }
        breakdown.total = breakdown.mse + breakdown.one_hot + breakdown.l2 + breakdown.unique_role;
        sum.add(&breakdown);
    }

    if let Some(stats) = diagnostics.as_mut() {
        stats.roles_used = used.len();
    }

    Ok(TprValidation {
        loss:  sum.averaged(dev.len()),
        roles: diagnostics,
    })
}

fn tally_roles<B: Backend>(
    predictions: Tensor<B, 3>,
    stats:       &mut RoleDiagnostics,
    used:        &mut BTreeSet<i64>,
) -> TrainingResult<()> {
    let top_prob: Vec<f32> = host_vec(predictions.clone().max_dim(2).into_data().convert::<f32>())?;
    let top_role: Vec<i64> = host_vec(predictions.argmax(2).into_data().convert::<i64>())?;

    for (p, r) in top_prob.iter().zip(top_role.iter()) {
        if (*p as f64) < LOW_CONFIDENCE_THRESHOLD {
            stats.low_confidence += 1;
        }
        stats.positions += 1;
        used.insert(*r);
    }
    Ok(())
}
