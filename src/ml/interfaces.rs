// ============================================================
// Layer 5 — Model Contracts
// ============================================================
// The trainers never see a concrete architecture. They need:
//
//   SequenceEncoder — filler batch → latent vector per sequence
//   SequenceDecoder — latent + length + digit parses → one
//                     log-probability tensor per output position
//   RoleEncoder     — (fillers, roles) → latent vector, plus the
//                     per-position role distributions when the
//                     encoder learns its own role assignment
//
// Learned role assignment comes with a regularisation capability.
// It is queried through RoleEncoder::regularizer(), not by type:
// an encoder without it simply returns None and contributes no
// regularisation terms.

use burn::prelude::*;

// ─── SequenceEncoder ──────────────────────────────────────────────────────────
pub trait SequenceEncoder<B: Backend>: Module<B> {
    /// fillers: [batch, seq_len] → encoding: [batch, hidden]
    fn encode(&self, fillers: Tensor<B, 2, Int>) -> Tensor<B, 2>;
}

// ─── SequenceDecoder ──────────────────────────────────────────────────────────
pub trait SequenceDecoder<B: Backend>: Module<B> {
    /// Returns `output_len` tensors of shape [batch, vocab] holding
    /// log-probabilities, one per output position.
    /// `parses[i]` is the parse_digits output of the i-th sequence.
    fn decode(
        &self,
        encoding:   Tensor<B, 2>,
        output_len: usize,
        parses:     &[Vec<usize>],
    ) -> Vec<Tensor<B, 2>>;
}

// ─── RoleEncoder ──────────────────────────────────────────────────────────────
/// Output of a role encoder forward pass.
#[derive(Debug, Clone)]
pub struct RoleEncoding<B: Backend> {
    /// [batch, hidden]
    pub encoding: Tensor<B, 2>,

    /// [batch, seq_len, num_roles] role probabilities; None when
    /// roles are taken as given
    pub role_predictions: Option<Tensor<B, 3>>,
}

/// The three regularisation terms of learned role assignment.
/// Each is a single-element tensor.
#[derive(Debug, Clone)]
pub struct RegularizationTerms<B: Backend> {
    /// Distance of each role distribution from one-hot
    pub one_hot: Tensor<B, 1>,

    /// Magnitude of the role embedding parameters
    pub l2: Tensor<B, 1>,

    /// Several positions of one sequence collapsing onto the same role
    pub unique_role: Tensor<B, 1>,
}

impl<B: Backend> RegularizationTerms<B> {
    pub fn zeros(device: &B::Device) -> Self {
        Self {
            one_hot:     Tensor::zeros([1], device),
            l2:          Tensor::zeros([1], device),
            unique_role: Tensor::zeros([1], device),
        }
    }

    /// one_hot + l2 + unique_role
    pub fn sum(self) -> Tensor<B, 1> {
        self.one_hot + self.l2 + self.unique_role
    }
}

/// Capability of role encoders that learn their role assignment.
pub trait RoleRegularizer<B: Backend> {
    fn regularization_loss(&self, role_predictions: Tensor<B, 3>) -> RegularizationTerms<B>;

    /// Switch the regularisation terms on or off (off during burn-in).
    fn use_regularization(&mut self, enabled: bool);

    /// Scale applied to every regularisation term, in [0, 1].
    fn set_regularization_temp(&mut self, temperature: f64);
}

pub trait RoleEncoder<B: Backend>: Module<B> {
    /// fillers, roles: [batch, seq_len]
    fn encode(&self, fillers: Tensor<B, 2, Int>, roles: Tensor<B, 2, Int>) -> RoleEncoding<B>;

    fn regularizer(&self) -> Option<&dyn RoleRegularizer<B>> {
        None
    }

    fn regularizer_mut(&mut self) -> Option<&mut dyn RoleRegularizer<B>> {
        None
    }
}
