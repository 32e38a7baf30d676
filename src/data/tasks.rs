// ============================================================
// Layer 4 — Digit Tasks
// ============================================================
// The ground-truth mapping a sequence-to-sequence model learns.
// Every task keeps the output the same length as the input, so
// a decoder asked for `len` positions always has a target for
// each one.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::data::roles::tree_paths;
use crate::domain::{sequence::Sequence, traits::DigitTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Reproduce the input
    Autoencode,
    /// Output the input back to front
    Reverse,
    /// Output the input digits in ascending order
    Sort,
}

impl DigitTask for TaskKind {
    fn input_to_output(&self, input: &[usize]) -> Sequence {
        match self {
            Self::Autoencode => input.to_vec(),
            Self::Reverse    => input.iter().rev().copied().collect(),
            Self::Sort => {
                let mut out = input.to_vec();
                out.sort_unstable();
                out
            }
        }
    }

    /// Balanced-tree leaf path of every position
    fn parse_digits(&self, input: &[usize]) -> Vec<usize> {
        tree_paths(input.len())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "autoencode" | "identity" => Ok(Self::Autoencode),
            "reverse"                 => Ok(Self::Reverse),
            "sort"                    => Ok(Self::Sort),
            other => Err(format!(
                "unknown task '{other}' (expected autoencode, reverse, sort)"
            )),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Autoencode => "autoencode",
            Self::Reverse    => "reverse",
            Self::Sort       => "sort",
        };
        f.write_str(name)
    }
}
