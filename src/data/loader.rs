// ============================================================
// Layer 4 — Dataset Loader
// ============================================================
// Reads the two on-disk dataset formats:
//
//   Digit sequences (seq2seq / mix training)
//     one sequence per line, fillers separated by whitespace
//       3 1 4 1 5
//       9 2 6
//
//   Role-encoder samples (tpdn training), JSON lines
//       {"fillers": [3, 1, 4], "target": [0.12, -0.4, ...]}
//       {"fillers": [9, 2], "roles": [1, 0], "target": [...]}
//     "roles" is optional; when absent the configured role
//     scheme assigns them.
//
// Blank lines are skipped. Any malformed line aborts the load
// with its line number.
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::domain::{
    sequence::{Sequence, TprSample},
    traits::RoleFunction,
};

/// One JSON line of a role-encoder dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct TprRecord {
    pub fillers: Vec<usize>,
    #[serde(default)]
    pub roles:   Option<Vec<usize>>,
    pub target:  Vec<f32>,
}

/// Load whitespace-separated digit sequences, one per line.
pub fn load_sequences(path: impl AsRef<Path>) -> Result<Vec<Sequence>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read sequence file '{}'", path.display()))?;

    let mut sequences = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let seq = line
            .split_whitespace()
            .map(|tok| tok.parse::<usize>())
            .collect::<Result<Sequence, _>>()
            .with_context(|| {
                format!("{}:{}: expected whitespace-separated digits", path.display(), line_no + 1)
            })?;
        sequences.push(seq);
    }

    tracing::info!("Loaded {} sequences from '{}'", sequences.len(), path.display());
    Ok(sequences)
}

/// Read role-encoder records from JSON lines without assigning roles.
///
/// Records that carry roles must carry one per filler.
pub fn read_tpr_records(path: impl AsRef<Path>) -> Result<Vec<TprRecord>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read role-encoder dataset '{}'", path.display()))?;

    let mut records = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: TprRecord = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid JSON record", path.display(), line_no + 1))?;

        if let Some(r) = &record.roles {
            if r.len() != record.fillers.len() {
                bail!(
                    "{}:{}: {} roles for {} fillers",
                    path.display(),
                    line_no + 1,
                    r.len(),
                    record.fillers.len()
                );
            }
        }
        records.push(record);
    }

    tracing::info!("Loaded {} role-encoder samples from '{}'", records.len(), path.display());
    Ok(records)
}

/// Turn records into samples, filling missing roles with `roles`.
pub fn assign_roles(records: Vec<TprRecord>, roles: &dyn RoleFunction) -> Vec<TprSample> {
    records
        .into_iter()
        .map(|record| {
            let assigned = match record.roles {
                Some(r) => r,
                None    => roles.assign(&record.fillers),
            };
            TprSample::new(record.fillers, assigned, record.target)
        })
        .collect()
}

/// Length of the longest sequence (at least 1).
pub fn max_len<S: AsRef<[usize]>>(sets: &[&[S]]) -> usize {
    sets.iter()
        .flat_map(|set| set.iter().map(|s| s.as_ref().len()))
        .max()
        .unwrap_or(0)
        .max(1)
}

/// Smallest filler vocabulary covering every id in `sets`.
pub fn filler_vocab_size<S: AsRef<[usize]>>(sets: &[&[S]]) -> usize {
    sets.iter()
        .flat_map(|set| set.iter().flat_map(|s| s.as_ref().iter().copied()))
        .max()
        .map_or(1, |m| m + 1)
}
