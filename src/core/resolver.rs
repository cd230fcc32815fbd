//! Wildcard resolution against the concrete state space of an item.
//!
//! The resolver owns the cartesian product of the declared per-dimension
//! values. Patterns are expanded against that set, and pattern-to-pattern
//! transitions are turned into explicit concrete mappings.

use super::state::{State, StateError, WILDCARD};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Explicit concrete start state to concrete destination mapping.
pub type TransitionMap = BTreeMap<State, State>;

/// Errors raised while resolving patterns and transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No dimensions declared")]
    NoDimensions,

    #[error("Dimension {index} declares no values")]
    EmptyDimension { index: usize },

    #[error("Dimension {index} declares the wildcard as a value")]
    WildcardValue { index: usize },

    #[error("Invalid state: {0}")]
    InvalidState(#[from] StateError),

    #[error("Pattern '{pattern}' has dimension {found}, expected {expected}")]
    DimensionMismatch {
        pattern: String,
        expected: usize,
        found: usize,
    },

    #[error("Ambiguous transition from '{from}': matches {destinations:?}")]
    AmbiguousTransition {
        from: State,
        destinations: Vec<State>,
    },

    #[error(
        "Conflicting transitions from '{from}': '{first}' ({first_source}) vs '{second}' ({second_source})"
    )]
    ConflictingTransition {
        from: State,
        first: State,
        first_source: String,
        second: State,
        second_source: String,
    },
}

/// Concrete state space of one item definition.
///
/// The number of states is the product of the dimension sizes, so items are
/// expected to keep to two to four small dimensions.
///
/// # Example
///
/// ```rust
/// use toolstate::core::{State, StateResolver};
///
/// let resolver = StateResolver::new(vec![
///     vec!["idle".into(), "aiming".into()],
///     vec!["empty".into(), "loaded".into()],
/// ])
/// .unwrap();
///
/// let loaded = resolver.resolve_states(&"*-loaded".parse().unwrap()).unwrap();
/// assert_eq!(loaded.len(), 2);
///
/// let reload = resolver
///     .resolve_transition(&"*-empty".parse().unwrap(), &"*-loaded".parse().unwrap())
///     .unwrap();
/// let aiming: State = "aiming-empty".parse().unwrap();
/// assert_eq!(reload[&aiming].to_string(), "aiming-loaded");
/// ```
#[derive(Debug, Clone)]
pub struct StateResolver {
    dimensions: Vec<Vec<String>>,
    states: Vec<State>,
    index: HashSet<State>,
}

impl StateResolver {
    /// Build the state space from the allowed values of each dimension.
    ///
    /// Duplicate values are ignored; declaration order is kept.
    pub fn new(dimensions: Vec<Vec<String>>) -> Result<Self, ResolveError> {
        if dimensions.is_empty() {
            return Err(ResolveError::NoDimensions);
        }

        let mut deduped = Vec::with_capacity(dimensions.len());
        for (index, values) in dimensions.into_iter().enumerate() {
            let mut seen = HashSet::new();
            let mut kept = Vec::with_capacity(values.len());
            for value in values {
                if value == WILDCARD {
                    return Err(ResolveError::WildcardValue { index });
                }
                // Rejects separators and empty tokens.
                State::single(value.as_str())?;
                if seen.insert(value.clone()) {
                    kept.push(value);
                }
            }
            if kept.is_empty() {
                return Err(ResolveError::EmptyDimension { index });
            }
            deduped.push(kept);
        }

        let states = cartesian_product(&deduped)?;
        let index = states.iter().cloned().collect();

        Ok(Self {
            dimensions: deduped,
            states,
            index,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimensions.len()
    }

    /// Allowed values of every dimension.
    pub fn dimensions(&self) -> &[Vec<String>] {
        &self.dimensions
    }

    /// Every concrete state, in declaration order of the dimension values.
    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn contains(&self, state: &State) -> bool {
        self.index.contains(state)
    }

    /// Concrete states matched by `pattern`.
    pub fn resolve_states(&self, pattern: &State) -> Result<Vec<State>, ResolveError> {
        self.check_dimension(pattern)?;
        Ok(self
            .states
            .iter()
            .filter(|state| pattern.matches(state))
            .cloned()
            .collect())
    }

    /// Resolve a wildcard transition into a concrete mapping.
    ///
    /// Wildcards in `to` take the token of the start state. Start states
    /// whose destination falls outside the state space are omitted.
    pub fn resolve_transition(
        &self,
        from: &State,
        to: &State,
    ) -> Result<TransitionMap, ResolveError> {
        self.resolve_transition_to_any(from, std::slice::from_ref(to))
    }

    /// Resolve a transition whose destination may be any of `targets`.
    ///
    /// Every start state must reach at most one destination; more than one
    /// is an [`ResolveError::AmbiguousTransition`].
    pub fn resolve_transition_to_any(
        &self,
        from: &State,
        targets: &[State],
    ) -> Result<TransitionMap, ResolveError> {
        for target in targets {
            self.check_dimension(target)?;
        }

        let mut mapping = TransitionMap::new();
        for start in self.resolve_states(from)? {
            let mut destinations: Vec<State> = Vec::new();
            for target in targets {
                let destination = target.merge(&start)?;
                if self.contains(&destination) && !destinations.contains(&destination) {
                    destinations.push(destination);
                }
            }

            match destinations.len() {
                0 => {}
                1 => {
                    if let Some(destination) = destinations.pop() {
                        mapping.insert(start, destination);
                    }
                }
                _ => {
                    return Err(ResolveError::AmbiguousTransition {
                        from: start,
                        destinations,
                    })
                }
            }
        }

        Ok(mapping)
    }

    /// Union labelled mappings, rejecting start states mapped to different
    /// destinations by two sources.
    pub fn merge_transitions<I, L>(batches: I) -> Result<TransitionMap, ResolveError>
    where
        I: IntoIterator<Item = (L, TransitionMap)>,
        L: Into<String>,
    {
        let mut merged = TransitionMap::new();
        let mut sources: BTreeMap<State, String> = BTreeMap::new();

        for (label, batch) in batches {
            let label = label.into();
            for (from, to) in batch {
                match merged.get(&from) {
                    Some(existing) if *existing != to => {
                        return Err(ResolveError::ConflictingTransition {
                            first: existing.clone(),
                            first_source: sources.get(&from).cloned().unwrap_or_default(),
                            second: to,
                            second_source: label,
                            from,
                        });
                    }
                    Some(_) => {}
                    None => {
                        sources.insert(from.clone(), label.clone());
                        merged.insert(from, to);
                    }
                }
            }
        }

        Ok(merged)
    }

    fn check_dimension(&self, pattern: &State) -> Result<(), ResolveError> {
        if pattern.dimension() != self.dimension() {
            return Err(ResolveError::DimensionMismatch {
                pattern: pattern.serialize(),
                expected: self.dimension(),
                found: pattern.dimension(),
            });
        }
        Ok(())
    }
}

fn cartesian_product(dimensions: &[Vec<String>]) -> Result<Vec<State>, StateError> {
    let mut rows: Vec<Vec<&str>> = vec![Vec::new()];
    for values in dimensions {
        rows = rows
            .into_iter()
            .flat_map(|prefix| {
                values.iter().map(move |value| {
                    let mut row = prefix.clone();
                    row.push(value.as_str());
                    row
                })
            })
            .collect();
    }

    rows.into_iter().map(State::vector).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(text: &str) -> State {
        text.parse().unwrap()
    }

    fn values(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    fn gun() -> StateResolver {
        StateResolver::new(vec![
            values(&["idle", "aiming", "firing"]),
            values(&["empty", "loaded"]),
        ])
        .unwrap()
    }

    #[test]
    fn full_wildcard_yields_cartesian_product() {
        let resolver = gun();
        let all = resolver.resolve_states(&state("*-*")).unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], state("idle-empty"));
        assert_eq!(all[5], state("firing-loaded"));
    }

    #[test]
    fn duplicate_values_are_ignored() {
        let resolver = StateResolver::new(vec![values(&["a", "b", "a"])]).unwrap();
        assert_eq!(resolver.states().len(), 2);
    }

    #[test]
    fn invalid_dimensions_are_rejected() {
        assert_eq!(
            StateResolver::new(Vec::new()).unwrap_err(),
            ResolveError::NoDimensions
        );
        assert_eq!(
            StateResolver::new(vec![values(&["a"]), Vec::new()]).unwrap_err(),
            ResolveError::EmptyDimension { index: 1 }
        );
        assert_eq!(
            StateResolver::new(vec![values(&["*"])]).unwrap_err(),
            ResolveError::WildcardValue { index: 0 }
        );
        assert!(matches!(
            StateResolver::new(vec![values(&["a-b"])]).unwrap_err(),
            ResolveError::InvalidState(StateError::ReservedSeparator { .. })
        ));
    }

    #[test]
    fn resolve_states_checks_dimension() {
        assert!(matches!(
            gun().resolve_states(&state("idle")),
            Err(ResolveError::DimensionMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn wildcard_destination_passes_tokens_through() {
        let mapping = gun()
            .resolve_transition(&state("*-empty"), &state("*-loaded"))
            .unwrap();

        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping[&state("aiming-empty")], state("aiming-loaded"));
        assert!(!mapping.contains_key(&state("aiming-loaded")));
    }

    #[test]
    fn concrete_destination_applies_to_every_start() {
        let mapping = gun()
            .resolve_transition(&state("*-*"), &state("idle-empty"))
            .unwrap();
        assert_eq!(mapping.len(), 6);
        assert!(mapping.values().all(|to| *to == state("idle-empty")));
    }

    #[test]
    fn destinations_outside_the_space_are_omitted() {
        let mapping = gun()
            .resolve_transition(&state("idle-*"), &state("reloading-*"))
            .unwrap();
        assert!(mapping.is_empty());
    }

    #[test]
    fn multiple_destinations_are_rejected() {
        let result = gun().resolve_transition_to_any(
            &state("idle-empty"),
            &[state("aiming-loaded"), state("firing-loaded")],
        );

        match result {
            Err(ResolveError::AmbiguousTransition { from, destinations }) => {
                assert_eq!(from, state("idle-empty"));
                assert_eq!(destinations.len(), 2);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn alternatives_that_agree_are_not_ambiguous() {
        let mapping = gun()
            .resolve_transition_to_any(
                &state("idle-empty"),
                &[state("*-loaded"), state("idle-loaded")],
            )
            .unwrap();
        assert_eq!(mapping[&state("idle-empty")], state("idle-loaded"));
    }

    #[test]
    fn merge_unions_disjoint_batches() {
        let resolver = gun();
        let load = resolver
            .resolve_transition(&state("idle-empty"), &state("idle-loaded"))
            .unwrap();
        let unload = resolver
            .resolve_transition(&state("idle-loaded"), &state("idle-empty"))
            .unwrap();

        let merged = StateResolver::merge_transitions([("load", load), ("unload", unload)]).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_accepts_agreeing_batches() {
        let resolver = gun();
        let a = resolver
            .resolve_transition(&state("*-empty"), &state("*-loaded"))
            .unwrap();
        let b = resolver
            .resolve_transition(&state("idle-empty"), &state("idle-loaded"))
            .unwrap();

        let merged = StateResolver::merge_transitions([("a", a), ("b", b)]).unwrap();
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn merge_names_both_conflicting_sources() {
        let resolver = gun();
        let a = resolver
            .resolve_transition(&state("idle-empty"), &state("idle-loaded"))
            .unwrap();
        let b = resolver
            .resolve_transition(&state("idle-empty"), &state("aiming-empty"))
            .unwrap();

        match StateResolver::merge_transitions([("reload", a), ("aim", b)]) {
            Err(ResolveError::ConflictingTransition {
                first_source,
                second_source,
                ..
            }) => {
                assert_eq!(first_source, "reload");
                assert_eq!(second_source, "aim");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
