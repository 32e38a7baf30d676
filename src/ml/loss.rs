// ============================================================
// Layer 5 — Loss Functions
// ============================================================
// Decoders emit log-probabilities, so the sequence loss is a
// plain negative log-likelihood: gather the log-probability of
// the correct token and average over the batch. The sequence
// loss adds one such term per output position.
//
// Role encoders regress onto target vectors with mean squared
// error (Burn's MseLoss).
//
// Reference: Burn Book §5 (Training)

use burn::{
    nn::loss::{MseLoss, Reduction},
    prelude::*,
    tensor::Element,
};

use crate::domain::error::{TrainingError, TrainingResult};

/// Mean NLL of `targets` [n] under `log_probs` [n, vocab].
pub fn nll_loss<B: Backend>(log_probs: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let [n, _] = log_probs.dims();
    log_probs
        .gather(1, targets.reshape([n, 1]))
        .mean()
        .neg()
}

/// Σ over positions of the NLL at that position.
///
/// `log_probs` holds one [batch, vocab] tensor per position and
/// `targets` is [batch, seq_len]; a decoder that returns the wrong
/// number of positions is a shape mismatch.
pub fn sequence_nll<B: Backend>(
    log_probs: Vec<Tensor<B, 2>>,
    targets:   Tensor<B, 2, Int>,
) -> TrainingResult<Tensor<B, 1>> {
    let [batch_size, seq_len] = targets.dims();
    if log_probs.len() != seq_len {
        return Err(TrainingError::ShapeMismatch {
            expected: seq_len,
            found:    log_probs.len(),
            position: 0,
        });
    }

    let mut total = Tensor::<B, 1>::zeros([1], &targets.device());
    for (index, lp) in log_probs.into_iter().enumerate() {
        let at_index = targets
            .clone()
            .slice([0..batch_size, index..index + 1])
            .reshape([batch_size]);
        total = total + nll_loss(lp, at_index);
    }
    Ok(total)
}

/// Mean squared error between a predicted and a target encoding.
pub fn mse_loss<B: Backend>(
    predicted: Tensor<B, 2>,
    target:    Tensor<B, 2>,
) -> TrainingResult<Tensor<B, 1>> {
    let [pb, pd] = predicted.dims();
    let [tb, td] = target.dims();
    if pb != tb || pd != td {
        return Err(TrainingError::ShapeMismatch {
            expected: td,
            found:    pd,
            position: 0,
        });
    }
    Ok(MseLoss::new().forward(predicted, target, Reduction::Mean))
}

/// Read a single-element tensor as f64.
pub fn scalar<B: Backend>(t: Tensor<B, 1>) -> f64 {
    t.into_scalar().elem::<f64>()
}

/// Tensor data as a host vector; `data` must already hold `E`.
pub fn host_vec<E: Element>(data: TensorData) -> TrainingResult<Vec<E>> {
    data.to_vec::<E>()
        .map_err(|e| TrainingError::TensorData(format!("{e:?}")))
}

// ─── LossBreakdown ────────────────────────────────────────────────────────────
/// Role-encoder loss split into its components, for logging.
/// Components an encoder does not support stay at 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossBreakdown {
    pub total:       f64,
    pub mse:         f64,
    pub one_hot:     f64,
    pub unique_role: f64,
    pub l2:          f64,
}

impl LossBreakdown {
    /// Component-wise sum, used to accumulate over batches
    pub fn add(&mut self, other: &LossBreakdown) {
        self.total       += other.total;
        self.mse         += other.mse;
        self.one_hot     += other.one_hot;
        self.unique_role += other.unique_role;
        self.l2          += other.l2;
    }

    /// Component-wise division by a batch count
    pub fn averaged(&self, count: usize) -> LossBreakdown {
        let n = count.max(1) as f64;
        LossBreakdown {
            total:       self.total / n,
            mse:         self.mse / n,
            one_hot:     self.one_hot / n,
            unique_role: self.unique_role / n,
            l2:          self.l2 / n,
        }
    }
}
