// ============================================================
// Layer 5 — Target Generation
// ============================================================
// Role-encoder training regresses onto the encodings of an
// already trained sequence encoder. This module runs that encoder
// over digit sequences and pairs every sequence with its roles
// and its encoding.
//
// Unlike batchify, nothing is dropped here: every sequence gets a
// target, so the last chunk of a length group may be short.

use std::collections::BTreeMap;

use burn::prelude::*;

use crate::domain::{
    error::TrainingResult,
    sequence::{Sequence, TprSample},
    traits::RoleFunction,
};
use crate::data::batcher::check_homogeneous;
use crate::ml::{interfaces::SequenceEncoder, loss::host_vec};

/// Encode `sequences` with `encoder`, `chunk` sequences at a time.
///
/// Output order follows length groups (shortest first), then input order.
pub fn encode_targets<B, E>(
    encoder:   &E,
    sequences: &[Sequence],
    roles:     &dyn RoleFunction,
    chunk:     usize,
    device:    &B::Device,
) -> TrainingResult<Vec<TprSample>>
where
    B: Backend,
    E: SequenceEncoder<B>,
{
    let mut by_len: BTreeMap<usize, Vec<&Sequence>> = BTreeMap::new();
    for seq in sequences {
        by_len.entry(seq.len()).or_default().push(seq);
    }

    let mut samples = Vec::with_capacity(sequences.len());
    for group in by_len.values() {
        for part in group.chunks(chunk.max(1)) {
            let owned: Vec<Sequence> = part.iter().map(|s| (*s).clone()).collect();
            let seq_len = check_homogeneous(&owned)?;

            let flat: Vec<i32> = owned.iter().flatten().map(|&d| d as i32).collect();
            let inputs = Tensor::<B, 1, Int>::from_data(TensorData::new(flat, [owned.len() * seq_len]), device)
                .reshape([owned.len(), seq_len]);

            let encoding = encoder.encode(inputs);
            let [_, hidden] = encoding.dims();
            let values: Vec<f32> = host_vec(encoding.into_data().convert::<f32>())?;

            for (seq, row) in owned.into_iter().zip(values.chunks(hidden.max(1))) {
                let assigned = roles.assign(&seq);
                samples.push(TprSample::new(seq, assigned, row.to_vec()));
            }
        }
    }

    tracing::info!("Encoded {} target vectors", samples.len());
    Ok(samples)
}
