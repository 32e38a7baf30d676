// ============================================================
// Layer 4 — Length-Bucketed Batching
// ============================================================
// Recurrent-style encoders and per-position decoders need every
// sequence in a batch to have the same length, so batches are
// formed per length bucket instead of by padding:
//
//   1. Group items by length (the LengthKeyed key)
//   2. Walk buckets in increasing length, cutting full batches
//   3. Drop the remainder of each bucket (< batch_size items)
//   4. Shuffle the batch order (never the order within a batch)
//
//   Example: 10 items of length 5, 3 of length 7, batch_size 4
//     length 5 → 2 batches (8 used, 2 dropped)
//     length 7 → 0 batches (3 dropped)
//
// The second half of the file turns a batch of plain Rust items
// into Burn tensors on an explicit device, rejecting mixed
// lengths before they reach a trainer.
//
// Reference: Burn Book §4 (Batcher)

use std::collections::BTreeMap;

use burn::prelude::*;
use rand::{seq::SliceRandom, Rng};

use crate::domain::{
    error::{TrainingError, TrainingResult},
    sequence::{Sequence, TprSample},
    traits::{DigitTask, LengthKeyed, RoleFunction},
};

// ─── batchify ─────────────────────────────────────────────────────────────────
/// Partition `items` into full, length-homogeneous batches in shuffled order.
///
/// Returns an empty Vec when no bucket holds `batch_size` items;
/// callers decide whether that is fatal.
pub fn batchify<T, R>(items: &[T], batch_size: usize, rng: &mut R) -> TrainingResult<Vec<Vec<T>>>
where
    T: LengthKeyed + Clone,
    R: Rng + ?Sized,
{
    if batch_size == 0 {
        return Err(TrainingError::InvalidConfig("batch_size must be at least 1".into()));
    }

    // BTreeMap iterates keys in ascending order, i.e. shortest bucket first
    let mut buckets: BTreeMap<usize, Vec<T>> = BTreeMap::new();
    for item in items {
        buckets.entry(item.length_key()).or_default().push(item.clone());
    }

    let mut batches = Vec::new();
    for (len, bucket) in &buckets {
        let dropped = bucket.len() % batch_size;
        if dropped > 0 {
            tracing::debug!("length {}: dropping {} of {} items", len, dropped, bucket.len());
        }
        batches.extend(bucket.chunks_exact(batch_size).map(|chunk| chunk.to_vec()));
    }

    batches.shuffle(rng);
    Ok(batches)
}

/// Number of items `batchify` would keep: Σ floor(|bucket| / B) · B.
pub fn covered_items<T: LengthKeyed>(items: &[T], batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for item in items {
        *counts.entry(item.length_key()).or_default() += 1;
    }
    counts.values().map(|n| n / batch_size * batch_size).sum()
}

/// Fails with ShapeMismatch unless every item has the first item's length.
pub fn check_homogeneous<T: LengthKeyed>(items: &[T]) -> TrainingResult<usize> {
    let expected = items
        .first()
        .map(|item| item.length_key())
        .ok_or_else(|| TrainingError::InvalidConfig("cannot build a tensor batch from zero items".into()))?;

    for (position, item) in items.iter().enumerate() {
        let found = item.length_key();
        if found != expected {
            return Err(TrainingError::ShapeMismatch { expected, found, position });
        }
    }
    Ok(expected)
}

// ─── SequenceBatch ────────────────────────────────────────────────────────────
/// A length-homogeneous batch of digit sequences as tensors.
#[derive(Debug, Clone)]
pub struct SequenceBatch<B: Backend> {
    /// Input filler ids — shape: [batch_size, seq_len]
    pub inputs: Tensor<B, 2, Int>,

    /// Correct output ids from the task — shape: [batch_size, seq_len]
    pub targets: Tensor<B, 2, Int>,

    /// Role ids, present only when a role function was supplied
    pub roles: Option<Tensor<B, 2, Int>>,

    /// parse_digits output per sequence, handed to the decoder as-is
    pub parses: Vec<Vec<usize>>,

    pub seq_len:    usize,
    pub batch_size: usize,
}

// ─── TprBatch ─────────────────────────────────────────────────────────────────
/// Three aligned tensors for role-encoder training.
#[derive(Debug, Clone)]
pub struct TprBatch<B: Backend> {
    /// Filler ids — shape: [batch_size, seq_len]
    pub fillers: Tensor<B, 2, Int>,

    /// Role ids — shape: [batch_size, seq_len]
    pub roles: Tensor<B, 2, Int>,

    /// Vectors to reproduce — shape: [batch_size, target_dim]
    pub targets: Tensor<B, 2>,
}

/// Builds tensor batches on one device.
#[derive(Clone, Debug)]
pub struct TensorBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> TensorBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Inputs, task targets, parses, and (optionally) roles for a sequence batch.
    pub fn sequences(
        &self,
        items: &[Sequence],
        task:  &dyn DigitTask,
        roles: Option<&dyn RoleFunction>,
    ) -> TrainingResult<SequenceBatch<B>> {
        let seq_len    = check_homogeneous(items)?;
        let batch_size = items.len();

        let targets: Vec<Sequence> = items.iter().map(|s| task.input_to_output(s)).collect();
        for (position, t) in targets.iter().enumerate() {
            if t.len() != seq_len {
                return Err(TrainingError::ShapeMismatch { expected: seq_len, found: t.len(), position });
            }
        }

        let role_tensor = match roles {
            Some(role_fn) => {
                let assigned: Vec<Vec<usize>> = items.iter().map(|s| role_fn.assign(s)).collect();
                check_homogeneous(&assigned)?;
                Some(self.int_matrix(&assigned, seq_len))
            }
            None => None,
        };

        Ok(SequenceBatch {
            inputs:  self.int_matrix(items, seq_len),
            targets: self.int_matrix(&targets, seq_len),
            roles:   role_tensor,
            parses:  items.iter().map(|s| task.parse_digits(s)).collect(),
            seq_len,
            batch_size,
        })
    }

    /// Fillers, roles and targets for a role-encoder batch.
    pub fn tpr(&self, items: &[TprSample]) -> TrainingResult<TprBatch<B>> {
        let seq_len    = check_homogeneous(items)?;
        let batch_size = items.len();
        let target_dim = items[0].target_dim();

        for (position, item) in items.iter().enumerate() {
            if item.roles.len() != seq_len {
                return Err(TrainingError::ShapeMismatch {
                    expected: seq_len,
                    found:    item.roles.len(),
                    position,
                });
            }
            if item.target_dim() != target_dim {
                return Err(TrainingError::ShapeMismatch {
                    expected: target_dim,
                    found:    item.target_dim(),
                    position,
                });
            }
        }

        let fillers: Vec<&[usize]> = items.iter().map(|s| s.fillers.as_slice()).collect();
        let roles:   Vec<&[usize]> = items.iter().map(|s| s.roles.as_slice()).collect();

        let target_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.target.iter().copied())
            .collect();
        let targets = Tensor::<B, 1>::from_floats(target_flat.as_slice(), &self.device)
            .reshape([batch_size, target_dim]);

        Ok(TprBatch {
            fillers: self.int_matrix(&fillers, seq_len),
            roles:   self.int_matrix(&roles, seq_len),
            targets,
        })
    }

    /// Flatten rows of ids into a [rows, cols] Int tensor.
    /// Burn uses i32 for Int tensor data.
    fn int_matrix<S: AsRef<[usize]>>(&self, rows: &[S], cols: usize) -> Tensor<B, 2, Int> {
        let flat: Vec<i32> = rows
            .iter()
            .flat_map(|r| r.as_ref().iter().map(|&x| x as i32))
            .collect();
        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device).reshape([rows.len(), cols])
    }
}
