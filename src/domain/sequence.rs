// ============================================================
// Layer 3 — Sequence Domain Types
// ============================================================
// A Sequence is an ordered list of filler ids (digits). Its
// length varies across a dataset, which is why batching keys
// on it.
//
// A TprSample is one training item for a role encoder:
//   fillers — the filler ids of the input sequence
//   roles   — one role id per filler (same length)
//   target  — the vector the role encoder must reproduce,
//             usually the encoding a trained sequence encoder
//             produced for the same input

use serde::{Deserialize, Serialize};

/// An ordered list of filler ids.
pub type Sequence = Vec<usize>;

/// One (fillers, roles, target) triple for role-encoder training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TprSample {
    pub fillers: Vec<usize>,
    pub roles:   Vec<usize>,
    pub target:  Vec<f32>,
}

impl TprSample {
    pub fn new(fillers: Vec<usize>, roles: Vec<usize>, target: Vec<f32>) -> Self {
        Self { fillers, roles, target }
    }

    /// Number of filler positions in this sample
    pub fn len(&self) -> usize {
        self.fillers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fillers.is_empty()
    }

    /// Dimension of the target vector
    pub fn target_dim(&self) -> usize {
        self.target.len()
    }
}
