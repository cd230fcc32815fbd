//! Interning cache for parsed states.

use super::state::{State, StateError};
use std::collections::HashMap;

/// Memoizes states by their serialized form.
///
/// The cache is owned by a single [`Engine`](crate::effects::Engine). During a
/// session it only grows: every distinct serialized state is parsed once and
/// later lookups hand out clones sharing the same storage, so
/// [`State::ptr_eq`] holds for equal text. [`StateCache::clear`] is called on
/// engine shutdown and nowhere else.
#[derive(Debug, Default)]
pub struct StateCache {
    by_text: HashMap<String, State>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache with already-built states, e.g. every state of a
    /// resolver, so parsed values share storage with the graph keys.
    pub fn with_states<'a>(states: impl IntoIterator<Item = &'a State>) -> Self {
        let by_text = states
            .into_iter()
            .map(|state| (state.serialize(), state.clone()))
            .collect();
        Self { by_text }
    }

    /// Parse `text`, returning the interned value if it was seen before.
    pub fn intern(&mut self, text: &str) -> Result<State, StateError> {
        if let Some(state) = self.by_text.get(text) {
            return Ok(state.clone());
        }

        let state = State::parse(text)?;
        self.by_text.insert(text.to_string(), state.clone());
        Ok(state)
    }

    /// Return the interned copy of `state`, inserting it if unknown.
    pub fn canonical(&mut self, state: &State) -> State {
        self.by_text
            .entry(state.serialize())
            .or_insert_with(|| state.clone())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.by_text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_text.is_empty()
    }

    /// Drop every entry. Only valid at engine teardown.
    pub fn clear(&mut self) {
        self.by_text.clear();
    }
}
