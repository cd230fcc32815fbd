//! Transition history kept for inspection tooling.

use super::context::{SlotId, Trigger};
use super::outcome::Outcome;
use super::state::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Record of a single traversed edge.
///
/// # Example
///
/// ```rust
/// use toolstate::core::{Outcome, SlotId, StateHistory, TransitionRecord, Trigger};
/// use chrono::Utc;
///
/// let mut history = StateHistory::with_capacity(8);
/// history.record(TransitionRecord {
///     slot: SlotId(0),
///     from: "idle".parse().unwrap(),
///     to: "reloading".parse().unwrap(),
///     trigger: Trigger::Timeout,
///     operation: "reload".to_string(),
///     outcome: Outcome::Started,
///     timestamp: Utc::now(),
/// });
/// assert_eq!(history.len(), 1);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub slot: SlotId,
    /// The state being transitioned from
    pub from: State,
    /// The state being transitioned to
    pub to: State,
    pub trigger: Trigger,
    /// Label of the operation or handler whose guard succeeded
    pub operation: String,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

/// Bounded, ordered history of transitions.
///
/// Once `capacity` records are stored the oldest one is dropped for every
/// new record. A capacity of zero disables recording.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateHistory {
    capacity: usize,
    records: VecDeque<TransitionRecord>,
}

impl Default for StateHistory {
    fn default() -> Self {
        Self::with_capacity(64)
    }
}

impl StateHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn record(&mut self, record: TransitionRecord) {
        if self.capacity == 0 {
            return;
        }
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &TransitionRecord> + '_ {
        self.records.iter()
    }

    /// Records of one slot, oldest first.
    pub fn for_slot(&self, slot: SlotId) -> Vec<&TransitionRecord> {
        self.records.iter().filter(|r| r.slot == slot).collect()
    }

    /// States traversed by `slot`: the first `from`, then every `to`.
    pub fn get_path(&self, slot: SlotId) -> Vec<&State> {
        let records = self.for_slot(slot);
        let mut path = Vec::with_capacity(records.len() + 1);
        if let Some(first) = records.first() {
            path.push(&first.from);
        }
        path.extend(records.iter().map(|r| &r.to));
        path
    }

    /// Time between the oldest and newest stored record.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.records.front()?, self.records.back()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
