//! Score primitives shared by every matcher.
//!
//! A score is a similarity value in `[0.0, 1.0]`. Matchers never return
//! booleans directly: a boolean check is lifted with [`from_bool`], several
//! pattern scores are folded with [`combine`], and the configured
//! [`MatchBehaviour`] is applied last with [`convert`].

use serde::{Deserialize, Serialize};

/// No similarity at all.
pub const MISMATCH: f64 = 0.0;

/// Full match.
pub const PERFECT: f64 = 1.0;

/// Threshold a mapping average must exceed to count as a match.
pub const ALMOST_PERFECT: f64 = 0.99;

/// Absolute tolerance used for score equality.
pub const TOLERANCE: f64 = 1e-6;

/// Whether a score is a perfect match (within [`TOLERANCE`]).
#[inline]
pub fn is_perfect(score: f64) -> bool {
    (score - PERFECT).abs() < TOLERANCE
}

/// Whether two scores are equal within [`TOLERANCE`].
#[inline]
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < TOLERANCE
}

/// Lift a boolean check into a score.
#[inline]
pub fn from_bool(matched: bool) -> f64 {
    if matched {
        PERFECT
    } else {
        MISMATCH
    }
}

/// Accept or reject semantics of a matcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum MatchBehaviour {
    #[default]
    AcceptOnMatch,
    RejectOnMatch,
}

impl MatchBehaviour {
    /// `RejectOnMatch` when `reject` is set, `AcceptOnMatch` otherwise.
    pub fn from_reject(reject: bool) -> Self {
        if reject {
            MatchBehaviour::RejectOnMatch
        } else {
            MatchBehaviour::AcceptOnMatch
        }
    }

    pub fn is_reject(self) -> bool {
        self == MatchBehaviour::RejectOnMatch
    }
}

/// How the scores of several patterns fold into one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum MatchOperator {
    /// Best individual score.
    #[default]
    Or,
    /// Worst individual score.
    And,
    /// Arithmetic mean.
    Average,
}

impl MatchOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchOperator::Or => "Or",
            MatchOperator::And => "And",
            MatchOperator::Average => "Average",
        }
    }
}

/// Fold several scores with `op`. An empty set is a [`MISMATCH`].
pub fn combine<I>(values: I, op: MatchOperator) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut count = 0usize;
    let mut acc = match op {
        MatchOperator::Or => f64::MIN,
        MatchOperator::And => f64::MAX,
        MatchOperator::Average => 0.0,
    };

    for value in values {
        count += 1;
        acc = match op {
            MatchOperator::Or => acc.max(value),
            MatchOperator::And => acc.min(value),
            MatchOperator::Average => acc + value,
        };
    }

    if count == 0 {
        return MISMATCH;
    }

    match op {
        MatchOperator::Average => acc / count as f64,
        _ => acc,
    }
}

/// Apply match behaviour to a raw score.
///
/// Reject semantics is a hard inversion around zero: only a score within
/// [`TOLERANCE`] of zero becomes [`PERFECT`], anything else is a
/// [`MISMATCH`].
#[inline]
pub fn convert(behaviour: MatchBehaviour, score: f64) -> f64 {
    match behaviour {
        MatchBehaviour::AcceptOnMatch => score,
        MatchBehaviour::RejectOnMatch => {
            if score <= TOLERANCE {
                PERFECT
            } else {
                MISMATCH
            }
        }
    }
}
