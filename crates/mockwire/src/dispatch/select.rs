//! Mapping selection: priority groups, ranking, probability draws.
//!
//! Scoring a request against mappings is pure, so it runs up front without
//! any lock ([`evaluate_all`]). Selection over the scores is cheap and runs
//! under the scenario locks of the mappings that could answer
//! ([`contenders`]).

use crate::error::MatchError;
use crate::mapping::{Mapping, MappingKind};
use crate::match_result::RequestMatchResult;
use crate::request::RequestMessage;
use crate::score::MISMATCH;
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

/// A scored mapping.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub mapping: Arc<Mapping>,
    pub result: RequestMatchResult,
}

/// A mapping with its score for one request, or the error a strict matcher
/// raised.
#[derive(Debug, Clone)]
pub struct Evaluated {
    pub mapping: Arc<Mapping>,
    pub outcome: Result<RequestMatchResult, MatchError>,
}

impl Evaluated {
    /// Whether this mapping could answer the request in some scenario state.
    pub fn can_answer(&self) -> bool {
        match &self.outcome {
            Ok(result) => {
                result.average() > MISMATCH
                    || (self.mapping.is_fallback() && self.mapping.request.is_empty())
            }
            Err(_) => false,
        }
    }
}

/// Outcome of ranking one kind of mapping against a request.
#[derive(Debug, Default)]
pub struct Selection {
    /// Winner above the match threshold
    pub matched: Option<Candidate>,
    /// Best candidate overall, used for partial matching and diagnostics
    pub closest: Option<Candidate>,
    /// Mappings whose strict matchers refused the request
    pub errors: Vec<(Uuid, MatchError)>,
}

impl Selection {
    /// The closest candidate, if it scored above zero.
    pub fn partial(&self) -> Option<&Candidate> {
        self.closest
            .as_ref()
            .filter(|c| c.result.average() > MISMATCH)
    }
}

/// Score `request` against every mapping passing `include`.
pub fn evaluate_all(
    mappings: &[Arc<Mapping>],
    request: &RequestMessage,
    include: impl Fn(&Mapping) -> bool,
) -> Vec<Evaluated> {
    mappings
        .iter()
        .filter(|m| include(m.as_ref()))
        .map(|mapping| Evaluated {
            mapping: Arc::clone(mapping),
            outcome: mapping.request.evaluate(request),
        })
        .collect()
}

/// Scenario-bound mappings that could answer. Only their scenarios need
/// locking for a dispatch.
pub fn contenders(evaluated: &[Evaluated]) -> Vec<Arc<Mapping>> {
    evaluated
        .iter()
        .filter(|e| e.mapping.scenario.is_some() && e.can_answer())
        .map(|e| Arc::clone(&e.mapping))
        .collect()
}

/// Mappings of `kind` passing `eligible`, in evaluation order: ascending
/// priority, registration order inside a priority.
fn ordered<'a>(
    evaluated: &'a [Evaluated],
    kind: MappingKind,
    eligible: &impl Fn(&Mapping) -> bool,
) -> Vec<&'a Evaluated> {
    let mut members: Vec<&Evaluated> = evaluated
        .iter()
        .filter(|e| e.mapping.kind == kind && eligible(e.mapping.as_ref()))
        .collect();
    members.sort_by_key(|e| e.mapping.priority);
    members
}

/// First-registered member wins an exact tie.
fn best_of(candidates: &[Candidate]) -> Option<&Candidate> {
    let mut best: Option<&Candidate> = None;
    for candidate in candidates {
        if best.map_or(true, |b| candidate.result.rank_cmp(&b.result) == Ordering::Greater) {
            best = Some(candidate);
        }
    }
    best
}

/// Rank the `kind` mappings group by group. The first group whose best
/// member exceeds the threshold wins. `roll` yields a uniform value in
/// `[0, 1)` and is called only for a probability draw.
pub fn select(
    evaluated: &[Evaluated],
    kind: MappingKind,
    eligible: impl Fn(&Mapping) -> bool,
    roll: impl FnOnce() -> f64,
) -> Selection {
    let mut selection = Selection::default();
    let members = ordered(evaluated, kind, &eligible);

    for group in members.chunk_by(|a, b| a.mapping.priority == b.mapping.priority) {
        let mut scored = Vec::with_capacity(group.len());
        for member in group {
            match &member.outcome {
                Ok(result) => scored.push(Candidate {
                    mapping: Arc::clone(&member.mapping),
                    result: result.clone(),
                }),
                Err(e) => selection.errors.push((member.mapping.id, e.clone())),
            }
        }
        let Some(best) = best_of(&scored) else {
            continue;
        };

        if best.result.is_match() {
            let tied: Vec<&Candidate> = scored
                .iter()
                .filter(|c| {
                    c.result.same_rank(&best.result) && c.mapping.request == best.mapping.request
                })
                .collect();
            let weighted = tied.iter().any(|c| c.mapping.probability.is_some());
            let winner = if tied.len() > 1 && weighted {
                let weights: Vec<Option<f64>> =
                    tied.iter().map(|c| c.mapping.probability).collect();
                tied[weighted_index(&weights, roll())]
            } else {
                best
            };
            selection.matched = Some(winner.clone());
            selection.closest = Some(winner.clone());
            return selection;
        }

        let closer = selection
            .closest
            .as_ref()
            .map_or(true, |c| best.result.rank_cmp(&c.result) == Ordering::Greater);
        if closer {
            selection.closest = Some(best.clone());
        }
    }
    selection
}

/// First eligible fallback mapping that accepts the request. A fallback
/// without request criteria accepts everything.
pub fn select_fallback(
    evaluated: &[Evaluated],
    eligible: impl Fn(&Mapping) -> bool,
) -> (Option<Candidate>, Vec<(Uuid, MatchError)>) {
    let mut errors = Vec::new();
    for member in ordered(evaluated, MappingKind::Fallback, &eligible) {
        match &member.outcome {
            Ok(result) if member.mapping.request.is_empty() || result.is_match() => {
                let candidate = Candidate {
                    mapping: Arc::clone(&member.mapping),
                    result: result.clone(),
                };
                return (Some(candidate), errors);
            }
            Ok(_) => {}
            Err(e) => errors.push((member.mapping.id, e.clone())),
        }
    }
    (None, errors)
}

/// Pick an index by weight given a uniform `roll` in `[0, 1)`.
///
/// Weights summing to less than 1 are taken as-is and unweighted members
/// share the remaining mass equally. Otherwise the weights are normalized
/// and unweighted members get nothing.
pub fn weighted_index(weights: &[Option<f64>], roll: f64) -> usize {
    let declared: f64 = weights.iter().flatten().sum();
    let unweighted = weights.iter().filter(|w| w.is_none()).count();

    let masses: Vec<f64> = if declared < 1.0 && unweighted > 0 {
        let share = (1.0 - declared) / unweighted as f64;
        weights.iter().map(|w| w.unwrap_or(share)).collect()
    } else if declared > 0.0 {
        weights.iter().map(|w| w.unwrap_or(0.0) / declared).collect()
    } else {
        vec![1.0 / weights.len().max(1) as f64; weights.len()]
    };

    let mut cumulative = 0.0;
    let mut last_positive = 0;
    for (i, mass) in masses.iter().enumerate() {
        if *mass <= 0.0 {
            continue;
        }
        cumulative += mass;
        last_positive = i;
        if roll < cumulative {
            return i;
        }
    }
    last_positive
}
