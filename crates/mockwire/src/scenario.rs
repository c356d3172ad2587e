//! Per-name scenario state machines gating mapping eligibility.
//!
//! Every scenario lives in its own mutex cell. A dispatch locks the cells of
//! all scenarios in its snapshot (sorted by name, so concurrent dispatches
//! never deadlock) and holds them from gating through the transition, which
//! makes read-then-advance atomic per scenario.

use crate::mapping::Mapping;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioState {
    pub name: String,
    /// State the next mapping must require; `None` before the first transition
    pub next_state: Option<String>,
    pub started: bool,
    /// No mapping of the scenario is reachable from `next_state`
    pub finished: bool,
    pub counter: u64,
}

impl ScenarioState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether a mapping's precondition holds in this state.
    pub fn admits(&self, required: Option<&str>) -> bool {
        match required {
            None => !self.started,
            Some(state) => self.next_state.as_deref() == Some(state),
        }
    }
}

type Cell = Arc<Mutex<ScenarioState>>;

/// Table of scenario states, created lazily on first use.
#[derive(Debug, Default)]
pub struct ScenarioStore {
    cells: RwLock<HashMap<String, Cell>>,
}

impl ScenarioStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, name: &str) -> Cell {
        if let Some(cell) = self.cells.read().get(name) {
            return Arc::clone(cell);
        }
        let mut cells = self.cells.write();
        Arc::clone(
            cells
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ScenarioState::new(name)))),
        )
    }

    fn existing(&self, name: &str) -> Option<Cell> {
        self.cells.read().get(name).cloned()
    }

    /// Run `f` with every scenario named by `mappings` locked.
    pub fn with_locked<R>(&self, mappings: &[Arc<Mapping>], f: impl FnOnce(&mut ScenarioView<'_>) -> R) -> R {
        let names: BTreeSet<&str> = mappings
            .iter()
            .filter_map(|m| m.scenario.as_deref())
            .collect();
        let cells: Vec<(String, Cell)> = names
            .into_iter()
            .map(|name| (name.to_string(), self.cell(name)))
            .collect();
        let guards = cells
            .iter()
            .map(|(name, cell)| (name.as_str(), cell.lock()))
            .collect();
        let mut view = ScenarioView { guards };
        f(&mut view)
    }

    /// Current state of a scenario that has started.
    pub fn get(&self, name: &str) -> Option<ScenarioState> {
        let state = self.existing(name)?.lock().clone();
        state.started.then_some(state)
    }

    /// Started scenarios, by name.
    pub fn states(&self) -> Vec<ScenarioState> {
        let mut cells: Vec<(String, Cell)> = self
            .cells
            .read()
            .iter()
            .map(|(name, cell)| (name.clone(), Arc::clone(cell)))
            .collect();
        cells.sort_by(|a, b| a.0.cmp(&b.0));
        cells
            .into_iter()
            .map(|(_, cell)| cell.lock().clone())
            .filter(|state| state.started)
            .collect()
    }

    /// Return a scenario to its unstarted state. `false` if it never existed.
    pub fn reset(&self, name: &str) -> bool {
        let Some(cell) = self.existing(name) else {
            return false;
        };
        *cell.lock() = ScenarioState::new(name);
        info!("Scenario '{}' reset", name);
        true
    }

    pub fn reset_all(&self) {
        let mut cells: Vec<(String, Cell)> = self
            .cells
            .read()
            .iter()
            .map(|(name, cell)| (name.clone(), Arc::clone(cell)))
            .collect();
        cells.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, cell) in &cells {
            *cell.lock() = ScenarioState::new(name.as_str());
        }
        info!("Reset {} scenarios", cells.len());
    }

    /// Force a scenario into `state`, marking it started.
    pub fn set_state(&self, name: &str, state: impl Into<String>, finished: bool) -> ScenarioState {
        let cell = self.cell(name);
        let mut guard = cell.lock();
        guard.next_state = Some(state.into());
        guard.started = true;
        guard.finished = finished;
        debug!("Scenario '{}' forced to {:?}", name, guard.next_state);
        guard.clone()
    }
}

/// Locked scenario states for one dispatch.
pub struct ScenarioView<'a> {
    guards: Vec<(&'a str, MutexGuard<'a, ScenarioState>)>,
}

impl ScenarioView<'_> {
    fn find(&self, name: &str) -> Option<&ScenarioState> {
        self.guards
            .binary_search_by(|(n, _)| (*n).cmp(name))
            .ok()
            .map(|i| &*self.guards[i].1)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut ScenarioState> {
        let i = self.guards.binary_search_by(|(n, _)| (*n).cmp(name)).ok()?;
        Some(&mut *self.guards[i].1)
    }

    pub fn state(&self, name: &str) -> Option<&ScenarioState> {
        self.find(name)
    }

    /// Unscenarioed mappings are always eligible.
    pub fn is_eligible(&self, mapping: &Mapping) -> bool {
        match mapping.scenario.as_deref() {
            None => true,
            Some(name) => self
                .find(name)
                .is_some_and(|state| state.admits(mapping.when_state_is.as_deref())),
        }
    }

    /// Advance the mapping's scenario. `finished` is derived from `snapshot`:
    /// true when no mapping of the scenario requires the resulting state.
    pub fn transition(&mut self, mapping: &Mapping, snapshot: &[Arc<Mapping>]) -> Option<ScenarioState> {
        let name = mapping.scenario.as_deref()?;
        let state = self.find_mut(name)?;
        state.started = true;
        state.counter += 1;
        if let Some(next) = &mapping.set_state_to {
            state.next_state = Some(next.clone());
        }
        state.finished = is_terminal(name, state.next_state.as_deref(), snapshot);
        Some(state.clone())
    }
}

/// True when no mapping of scenario `name` can fire from `state`.
pub fn is_terminal(name: &str, state: Option<&str>, mappings: &[Arc<Mapping>]) -> bool {
    let Some(state) = state else {
        return true;
    };
    !mappings.iter().any(|m| {
        m.scenario.as_deref() == Some(name) && m.when_state_is.as_deref() == Some(state)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(scenario: &str, when: Option<&str>, then: Option<&str>) -> Arc<Mapping> {
        let mut builder = Mapping::builder().in_scenario(scenario);
        if let Some(w) = when {
            builder = builder.when_state_is(w);
        }
        if let Some(t) = then {
            builder = builder.will_set_state_to(t);
        }
        Arc::new(builder.build().unwrap())
    }

    #[test]
    fn test_unstarted_admits_only_initial_mappings() {
        let state = ScenarioState::new("S");
        assert!(state.admits(None));
        assert!(!state.admits(Some("step2")));
    }

    #[test]
    fn test_chain_transitions() {
        let store = ScenarioStore::new();
        let first = mapping("S", None, Some("step2"));
        let second = mapping("S", Some("step2"), Some("done"));
        let snapshot = vec![Arc::clone(&first), Arc::clone(&second)];

        store.with_locked(&snapshot, |view| {
            assert!(view.is_eligible(&first));
            assert!(!view.is_eligible(&second));
            let state = view.transition(&first, &snapshot).unwrap();
            assert_eq!(state.next_state.as_deref(), Some("step2"));
            assert!(!state.finished);
        });

        store.with_locked(&snapshot, |view| {
            assert!(!view.is_eligible(&first));
            assert!(view.is_eligible(&second));
            let state = view.transition(&second, &snapshot).unwrap();
            assert_eq!(state.counter, 2);
            assert!(state.finished);
        });
    }

    #[test]
    fn test_states_lists_started_only() {
        let store = ScenarioStore::new();
        let a = mapping("A", None, Some("x"));
        let b = mapping("B", None, None);
        let snapshot = vec![Arc::clone(&a), Arc::clone(&b)];

        store.with_locked(&snapshot, |view| {
            view.transition(&a, &snapshot);
        });
        let states = store.states();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].name, "A");
        assert!(store.get("B").is_none());
    }

    #[test]
    fn test_reset_in_place() {
        let store = ScenarioStore::new();
        let first = mapping("S", None, Some("step2"));
        let snapshot = vec![Arc::clone(&first)];
        store.with_locked(&snapshot, |view| {
            view.transition(&first, &snapshot);
        });
        assert!(store.get("S").is_some());

        assert!(store.reset("S"));
        assert!(store.get("S").is_none());
        assert!(!store.reset("unknown"));

        store.with_locked(&snapshot, |view| assert!(view.is_eligible(&first)));
    }

    #[test]
    fn test_set_state() {
        let store = ScenarioStore::new();
        let state = store.set_state("S", "step3", false);
        assert!(state.started);
        assert_eq!(store.get("S").unwrap().next_state.as_deref(), Some("step3"));
        store.reset_all();
        assert!(store.states().is_empty());
    }

    #[test]
    fn test_concurrent_transitions_are_serialized() {
        let store = ScenarioStore::new();
        let counter = mapping("C", None, None);
        let snapshot = vec![Arc::clone(&counter)];
        store.set_state("C", "running", false);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        store.with_locked(&snapshot, |view| {
                            view.transition(&counter, &snapshot);
                        });
                    }
                });
            }
        });
        assert_eq!(store.get("C").unwrap().counter, 800);
    }
}
