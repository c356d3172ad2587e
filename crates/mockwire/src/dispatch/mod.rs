//! The dispatcher: one context owning mappings, scenarios and the request
//! log, deciding which mapping answers each request.

mod select;

pub use select::{
    contenders, evaluate_all, select, select_fallback, weighted_index, Candidate, Evaluated,
    Selection,
};

use crate::config::Settings;
use crate::error::{MappingError, MatchError};
use crate::log::{LogEntry, RequestLog};
use crate::mapping::{Mapping, MappingKind, MappingModel, ResponseMessage};
use crate::match_result::RequestMatchResult;
use crate::metrics;
use crate::registry::MappingRegistry;
use crate::request::{RequestMatcher, RequestMessage};
use crate::scenario::{is_terminal, ScenarioState, ScenarioStore};
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How a request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    Matched,
    /// Best below-threshold candidate, partial mapping enabled
    Partial,
    Fallback,
    NoMatch,
}

impl DispatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchKind::Matched => "matched",
            DispatchKind::Partial => "partial",
            DispatchKind::Fallback => "fallback",
            DispatchKind::NoMatch => "no_match",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub kind: DispatchKind,
    pub mapping: Option<Arc<Mapping>>,
    /// Result of the answering mapping, or of the closest one on no match
    pub match_result: Option<RequestMatchResult>,
    pub response: ResponseMessage,
    /// Scenario state after the transition, if the mapping had a scenario
    pub scenario: Option<ScenarioState>,
    /// Errors from strict matchers, rendered for diagnostics
    pub errors: Vec<String>,
    pub log_id: Uuid,
}

/// Side-effect free selection, see [`Dispatcher::find_best_match`].
#[derive(Debug, Clone)]
pub struct BestMatch {
    pub mapping: Arc<Mapping>,
    pub result: RequestMatchResult,
    pub kind: DispatchKind,
}

pub struct Dispatcher {
    registry: MappingRegistry,
    scenarios: ScenarioStore,
    log: RequestLog,
    allow_partial_mapping: AtomicBool,
    rng: Mutex<StdRng>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

impl Dispatcher {
    pub fn new(settings: &Settings) -> Self {
        let rng = match settings.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let max_age = settings
            .request_log_expiration_secs
            .and_then(|secs| chrono::Duration::try_seconds(secs as i64));
        Self {
            registry: MappingRegistry::new(),
            scenarios: ScenarioStore::new(),
            log: RequestLog::new(settings.max_request_log_count, max_age),
            allow_partial_mapping: AtomicBool::new(settings.allow_partial_mapping),
            rng: Mutex::new(rng),
        }
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    pub fn allow_partial_mapping(&self) -> bool {
        self.allow_partial_mapping.load(Ordering::Relaxed)
    }

    pub fn set_allow_partial_mapping(&self, allow: bool) {
        self.allow_partial_mapping.store(allow, Ordering::Relaxed);
    }

    // ===== Mappings =====

    /// Register or replace a mapping. Returns the replaced one.
    pub fn add_mapping(&self, mapping: Mapping) -> Option<Arc<Mapping>> {
        let label = mapping.label();
        let replaced = self.registry.add_or_replace(mapping);
        if replaced.is_some() {
            info!("Replaced mapping {}", label);
        } else {
            info!("Registered mapping {}", label);
        }
        metrics::set_mappings(self.registry.len());
        replaced
    }

    pub fn remove_mapping(&self, id: Uuid) -> Result<Arc<Mapping>, MappingError> {
        let removed = self.registry.remove(id)?;
        info!("Removed mapping {}", removed.label());
        metrics::set_mappings(self.registry.len());
        Ok(removed)
    }

    pub fn mapping(&self, id: Uuid) -> Option<Arc<Mapping>> {
        self.registry.get(id)
    }

    pub fn mappings(&self) -> Vec<Arc<Mapping>> {
        self.registry.snapshot()
    }

    /// Remove all non-admin mappings.
    pub fn reset_mappings(&self) -> usize {
        let removed = self.registry.reset();
        info!("Reset mappings, {} removed", removed);
        metrics::set_mappings(self.registry.len());
        removed
    }

    /// Import a batch of models. Nothing is registered unless every model
    /// converts and the batch has no duplicate ids.
    pub fn import_mappings(&self, models: &[MappingModel]) -> Result<usize, MappingError> {
        let batch = models
            .iter()
            .map(MappingModel::to_mapping)
            .collect::<Result<Vec<_>, _>>()?;
        let count = self.registry.import(batch)?;
        metrics::set_mappings(self.registry.len());
        Ok(count)
    }

    pub fn export_mappings(&self) -> Vec<MappingModel> {
        self.registry.export()
    }

    // ===== Scenarios =====

    pub fn scenarios(&self) -> Vec<ScenarioState> {
        self.scenarios.states()
    }

    pub fn scenario(&self, name: &str) -> Option<ScenarioState> {
        self.scenarios.get(name)
    }

    pub fn reset_scenario(&self, name: &str) -> bool {
        self.scenarios.reset(name)
    }

    pub fn reset_scenarios(&self) {
        self.scenarios.reset_all();
    }

    /// Force a scenario into `state`.
    pub fn set_scenario_state(&self, name: &str, state: &str) -> ScenarioState {
        let finished = is_terminal(name, Some(state), &self.registry.snapshot());
        self.scenarios.set_state(name, state, finished)
    }

    // ===== Request log =====

    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.log.entries()
    }

    pub fn log_entry(&self, id: Uuid) -> Option<LogEntry> {
        self.log.get(id)
    }

    /// Logged requests the matcher accepts above the match threshold.
    pub fn find_log_entries(&self, matcher: &RequestMatcher) -> Result<Vec<LogEntry>, MatchError> {
        self.log.find(matcher)
    }

    pub fn reset_log(&self) {
        self.log.reset();
    }

    // ===== Dispatch =====

    fn report_errors(errors: &[(Uuid, MatchError)]) -> Vec<String> {
        errors
            .iter()
            .map(|(id, e)| {
                warn!("Mapping {} rejected request: {}", id, e);
                metrics::record_matcher_error(e.matcher_name());
                format!("{id}: {e}")
            })
            .collect()
    }

    /// Uniform draw in `[0, 1)`. The rng is locked only for the draw.
    fn roll(&self) -> f64 {
        self.rng.lock().gen()
    }

    /// The mapping that would answer `request`, without advancing scenarios,
    /// logging or consuming random draws. A probability draw peeks at the
    /// value the next dispatch would use.
    pub fn find_best_match(&self, request: &RequestMessage) -> Option<BestMatch> {
        let snapshot = self.registry.snapshot();
        let allow_partial = self.allow_partial_mapping();
        let evaluated = evaluate_all(&snapshot, request, |m| !m.is_admin());

        self.scenarios.with_locked(&contenders(&evaluated), |view| {
            let selection = select(
                &evaluated,
                MappingKind::Standard,
                |m| view.is_eligible(m),
                || self.rng.lock().clone().gen(),
            );
            if let Some(c) = selection.matched {
                return Some(BestMatch {
                    mapping: c.mapping,
                    result: c.result,
                    kind: DispatchKind::Matched,
                });
            }
            if let (Some(c), _) = select_fallback(&evaluated, |m| view.is_eligible(m)) {
                return Some(BestMatch {
                    mapping: c.mapping,
                    result: c.result,
                    kind: DispatchKind::Fallback,
                });
            }
            let kind = if allow_partial && selection.partial().is_some() {
                DispatchKind::Partial
            } else {
                DispatchKind::NoMatch
            };
            selection.closest.map(|c| BestMatch {
                mapping: c.mapping,
                result: c.result,
                kind,
            })
        })
    }

    /// Answer a request. Never fails: unmatched or malformed input degrades
    /// to the built-in no-match response.
    ///
    /// Scoring runs without locks. Gating, selection and the scenario
    /// transition run while holding the locks of the scenarios that could
    /// answer, so concurrent requests to one scenario advance it one step
    /// at a time.
    pub fn dispatch(&self, request: &RequestMessage) -> DispatchResult {
        let started = Instant::now();
        let snapshot = self.registry.snapshot();
        let allow_partial = self.allow_partial_mapping();
        let evaluated = evaluate_all(&snapshot, request, |m| !m.is_admin());

        let (kind, chosen, closest, scenario, errors) =
            self.scenarios.with_locked(&contenders(&evaluated), |view| {
                let mut selection = select(
                    &evaluated,
                    MappingKind::Standard,
                    |m| view.is_eligible(m),
                    || self.roll(),
                );

                let (kind, chosen) = if let Some(c) = selection.matched.take() {
                    (DispatchKind::Matched, Some(c))
                } else {
                    let (fallback, errors) =
                        select_fallback(&evaluated, |m| view.is_eligible(m));
                    selection.errors.extend(errors);
                    match fallback {
                        Some(c) => (DispatchKind::Fallback, Some(c)),
                        None => match selection.partial() {
                            Some(c) if allow_partial => (DispatchKind::Partial, Some(c.clone())),
                            _ => (DispatchKind::NoMatch, None),
                        },
                    }
                };

                let scenario = chosen
                    .as_ref()
                    .and_then(|c| view.transition(&c.mapping, &snapshot));
                (kind, chosen, selection.closest, scenario, selection.errors)
            });

        let errors = Self::report_errors(&errors);
        if let Some(state) = &scenario {
            metrics::record_transition(&state.name);
            debug!(
                "Scenario '{}' now at {:?} (counter {}, finished {})",
                state.name, state.next_state, state.counter, state.finished
            );
        }

        let response = match &chosen {
            Some(candidate) => {
                let provided = candidate.mapping.respond(request);
                if let Some(recorded) = provided.new_mapping {
                    info!("Recorded mapping {} from {}", recorded.label(), request.path);
                    self.add_mapping(recorded);
                }
                provided.response
            }
            None => ResponseMessage::no_match(),
        };

        match (kind, &chosen) {
            (DispatchKind::Partial, Some(c)) => warn!(
                "Partial match: {} {} answered by {} (score {:.3})",
                request.method,
                request.path,
                c.mapping.label(),
                c.result.average()
            ),
            (_, Some(c)) => debug!(
                "{} {} matched {} ({})",
                request.method,
                request.path,
                c.mapping.label(),
                kind.as_str()
            ),
            (_, None) => debug!("{} {} matched no mapping", request.method, request.path),
        }

        let mapping = chosen.as_ref().map(|c| Arc::clone(&c.mapping));
        let match_result = chosen.map(|c| c.result).or(closest.map(|c| c.result));
        let log_id = Uuid::new_v4();
        self.log.append(LogEntry {
            id: log_id,
            request: request.clone(),
            mapping_id: mapping.as_ref().map(|m| m.id),
            mapping_title: mapping.as_ref().and_then(|m| m.title.clone()),
            match_result: match_result.clone(),
            partial: kind == DispatchKind::Partial,
            timestamp: Utc::now(),
        });

        metrics::record_dispatch(kind.as_str(), started.elapsed().as_secs_f64() * 1000.0);

        DispatchResult {
            kind,
            mapping,
            match_result,
            response,
            scenario,
            errors,
            log_id,
        }
    }

    /// Answer a request from the internal admin mappings. `None` when none
    /// accepts it. Admin requests are not logged.
    pub fn dispatch_admin(&self, request: &RequestMessage) -> Option<DispatchResult> {
        let snapshot = self.registry.snapshot();
        let evaluated = evaluate_all(&snapshot, request, Mapping::is_admin);
        let selection = select(&evaluated, MappingKind::Admin, |_| true, || self.roll());
        let errors = Self::report_errors(&selection.errors);
        let candidate = selection.matched?;
        let response = candidate.mapping.respond(request).response;
        debug!("Admin {} {} handled", request.method, request.path);

        Some(DispatchResult {
            kind: DispatchKind::Matched,
            mapping: Some(candidate.mapping),
            match_result: Some(candidate.result),
            response,
            scenario: None,
            errors,
            log_id: Uuid::nil(),
        })
    }
}
