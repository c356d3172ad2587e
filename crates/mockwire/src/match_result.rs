//! Per-field scores of one (request, mapping) evaluation and their ordering.

use crate::score::{approx_eq, is_perfect, ALMOST_PERFECT};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Score contributed by one configured field matcher.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDetail {
    /// Field matcher kind, e.g. `RequestPathMatcher`
    pub matcher: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ordered per-field scores with derived aggregates.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMatchResult {
    pub entries: Vec<MatchDetail>,
}

impl RequestMatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, matcher: impl Into<String>, score: f64, error: Option<String>) {
        self.entries.push(MatchDetail {
            matcher: matcher.into(),
            score,
            error,
        });
    }

    /// Mean of all entry scores, 0 when nothing was evaluated.
    pub fn average(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.entries.iter().map(|e| e.score).sum::<f64>() / self.entries.len() as f64
    }

    /// Number of individually perfect entries.
    pub fn perfect_count(&self) -> usize {
        self.entries.iter().filter(|e| is_perfect(e.score)).count()
    }

    /// Whether the aggregate exceeds the match threshold.
    pub fn is_match(&self) -> bool {
        self.average() > ALMOST_PERFECT
    }

    /// Rank against another result. `Greater` means `self` is the better
    /// candidate: higher average first, then more perfect entries.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.average(), other.average());
        if !approx_eq(a, b) {
            return a.total_cmp(&b);
        }
        self.perfect_count().cmp(&other.perfect_count())
    }

    /// Same rank within score tolerance.
    pub fn same_rank(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| e.error.as_deref())
    }
}
