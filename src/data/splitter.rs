// ============================================================
// Layer 4 — Train/Dev Splitter
// ============================================================
// Used when no separate dev file is supplied: shuffle the
// training items with the run's RNG and hold out a fraction.
// The dev set only ever produces a validation scalar, so it
// must never share items with the training set.

use rand::{seq::SliceRandom, Rng};

/// Shuffle `samples` with `rng` and split into (train, dev).
///
/// `train_fraction` is clamped to the sample count, so tiny
/// datasets never panic.
pub fn split_train_dev<T, R: Rng + ?Sized>(
    mut samples:    Vec<T>,
    train_fraction: f64,
    rng:            &mut R,
) -> (Vec<T>, Vec<T>) {
    samples.shuffle(rng);

    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction).round() as usize;
    let split_at = split_at.min(total);

    // split_off(n) leaves [0..n) in `samples` and returns [n..total)
    let dev = samples.split_off(split_at);

    tracing::debug!("Dataset split: {} train, {} dev", samples.len(), dev.len());
    (samples, dev)
}
