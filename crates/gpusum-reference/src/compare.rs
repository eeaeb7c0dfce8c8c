//! Element-wise tolerance comparison.

use serde::{Deserialize, Serialize};

/// Outcome of comparing two outputs.
///
/// A mismatch is a result, not an error: the harness reports it and
/// carries on to teardown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Comparison {
    Match,
    /// First index where `|expected - actual| > epsilon`.
    Mismatch {
        index: usize,
        expected: f32,
        actual: f32,
    },
    LengthMismatch {
        left: usize,
        right: usize,
    },
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        matches!(self, Comparison::Match)
    }

    /// Index of the first mismatching element, if any.
    pub fn mismatch_index(&self) -> Option<usize> {
        match self {
            Comparison::Mismatch { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Comparison::Match => write!(f, "match"),
            Comparison::Mismatch {
                index,
                expected,
                actual,
            } => write!(f, "mismatch at index {index}: {expected} vs {actual}"),
            Comparison::LengthMismatch { left, right } => {
                write!(f, "length mismatch: {left} vs {right}")
            }
        }
    }
}

/// Compares `a` (expected) with `b` (actual) under an absolute tolerance.
///
/// Stops at the first element outside tolerance. A NaN on either side never
/// matches.
pub fn compare(a: &[f32], b: &[f32], epsilon: f32) -> Comparison {
    if a.len() != b.len() {
        return Comparison::LengthMismatch {
            left: a.len(),
            right: b.len(),
        };
    }
    a.iter()
        .zip(b)
        // Written as a negated `<=` so NaN differences count as mismatches.
        .position(|(x, y)| !((x - y).abs() <= epsilon))
        .map_or(Comparison::Match, |index| Comparison::Mismatch {
            index,
            expected: a[index],
            actual: b[index],
        })
}
