// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The training loop consumes several pure functions whose
// implementation it does not care about:
//
//   RoleFunction — sequence → one role id per position
//   DigitTask    — sequence → correct output sequence, plus the
//                  per-element auxiliary parse fed to decoders
//   LengthKeyed  — the length a batchable item is bucketed by
//
// Concrete schemes live in Layer 4 (data::roles, data::tasks).

use crate::domain::sequence::{Sequence, TprSample};

// ─── RoleFunction ─────────────────────────────────────────────────────────────
/// Deterministic role assignment for a filler sequence.
///
/// Implementations:
///   - RoleScheme (ltr, rtl, bidirectional, bag-of-words, tree)
pub trait RoleFunction {
    /// Returns exactly one role id per position of `sequence`.
    fn assign(&self, sequence: &[usize]) -> Vec<usize>;

    /// Size of the role vocabulary; every assigned id is below it.
    fn num_roles(&self) -> usize;
}

// ─── DigitTask ────────────────────────────────────────────────────────────────
/// Ground-truth mapping used to build decoder targets.
pub trait DigitTask {
    /// The correct output sequence for `input`. Same length as the input.
    fn input_to_output(&self, input: &[usize]) -> Sequence;

    /// Per-element auxiliary representation passed to the decoder.
    fn parse_digits(&self, input: &[usize]) -> Vec<usize>;
}

// ─── LengthKeyed ──────────────────────────────────────────────────────────────
/// Anything that can be bucketed by sequence length.
pub trait LengthKeyed {
    fn length_key(&self) -> usize;
}

impl LengthKeyed for Sequence {
    fn length_key(&self) -> usize {
        self.len()
    }
}

/// Role-encoder samples are bucketed by the length of their fillers.
impl LengthKeyed for TprSample {
    fn length_key(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tpr_sample_keys_on_fillers() {
        let s = TprSample::new(vec![1, 2, 3], vec![0, 1, 2], vec![0.5; 10]);
        assert_eq!(s.length_key(), 3);
        assert!(!s.is_empty());
    }

    #[test]
    fn test_sequence_keys_on_len() {
        let s: Sequence = vec![4, 4, 4, 4];
        assert_eq!(s.length_key(), 4);
    }
}
