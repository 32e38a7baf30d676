// ============================================================
// Layer 4 — Role Schemes
// ============================================================
// Fixed role-assignment functions. A role encoder binds each
// filler to the role returned here, so the scheme decides which
// structural hypothesis a tensor-product decomposition tests:
//
//   ltr           — role = position from the left
//   rtl           — role = position from the right
//   bidirectional — role = (left index, right index) pair
//   bow           — every filler gets the same role
//   tree          — role = path of the leaf in a balanced
//                   binary tree over the positions
//
// Role ids must stay below num_roles(), which depends on the
// longest sequence the scheme will see.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::traits::RoleFunction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleScheme {
    Ltr,
    Rtl,
    Bidirectional,
    Bow,
    Tree,
}

impl FromStr for RoleScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ltr"                  => Ok(Self::Ltr),
            "rtl"                  => Ok(Self::Rtl),
            "bi" | "bidirectional" => Ok(Self::Bidirectional),
            "bow"                  => Ok(Self::Bow),
            "tree"                 => Ok(Self::Tree),
            other => Err(format!(
                "unknown role scheme '{other}' (expected ltr, rtl, bidirectional, bow, tree)"
            )),
        }
    }
}

impl fmt::Display for RoleScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ltr           => "ltr",
            Self::Rtl           => "rtl",
            Self::Bidirectional => "bidirectional",
            Self::Bow           => "bow",
            Self::Tree          => "tree",
        };
        f.write_str(name)
    }
}

/// A role scheme bound to the longest sequence length it must cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleAssigner {
    scheme:  RoleScheme,
    max_len: usize,
}

impl RoleAssigner {
    pub fn new(scheme: RoleScheme, max_len: usize) -> Self {
        Self { scheme, max_len: max_len.max(1) }
    }
}

impl RoleFunction for RoleAssigner {
    fn assign(&self, sequence: &[usize]) -> Vec<usize> {
        let n = sequence.len();
        match self.scheme {
            RoleScheme::Ltr => (0..n).collect(),
            RoleScheme::Rtl => (0..n).map(|i| n - 1 - i).collect(),
            RoleScheme::Bidirectional => {
                (0..n).map(|i| i * self.max_len + (n - 1 - i)).collect()
            }
            RoleScheme::Bow  => vec![0; n],
            RoleScheme::Tree => tree_paths(n),
        }
    }

    fn num_roles(&self) -> usize {
        match self.scheme {
            RoleScheme::Ltr | RoleScheme::Rtl => self.max_len,
            RoleScheme::Bidirectional         => self.max_len * self.max_len,
            RoleScheme::Bow                   => 1,
            RoleScheme::Tree                  => 1 << (ceil_log2(self.max_len) + 1),
        }
    }
}

/// Leaf path codes of a balanced binary tree over `n` positions.
///
/// The root is 1, a left child of `c` is `2c` and a right child
/// is `2c + 1`; the left half takes the extra element when `n`
/// is odd. A single position is its own root.
pub fn tree_paths(n: usize) -> Vec<usize> {
    fn fill(lo: usize, hi: usize, code: usize, out: &mut [usize]) {
        if hi - lo == 1 {
            out[lo] = code;
            return;
        }
        let mid = lo + (hi - lo + 1) / 2;
        fill(lo, mid, 2 * code, out);
        fill(mid, hi, 2 * code + 1, out);
    }

    let mut out = vec![0; n];
    if n > 0 {
        fill(0, n, 1, &mut out);
    }
    out
}

fn ceil_log2(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}
