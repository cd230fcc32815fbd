//! Operation timers.
//!
//! Timers are cooperative: nothing fires until the owner calls
//! [`TimerQueue::take_due`] from its tick. A timer remembers the state its
//! slot was in when it was scheduled; the engine drops it on firing if the
//! slot has moved on since.

use crate::core::{PlayerId, SlotId, State};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// A scheduled timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTimer {
    pub id: Uuid,
    pub slot: SlotId,
    pub player: PlayerId,
    pub operation: String,
    /// State of the slot right after the timer was started
    pub state: State,
    pub due: DateTime<Utc>,
}

/// At most one pending timer per `(slot, operation)`.
#[derive(Debug, Default)]
pub struct TimerQueue {
    pending: HashMap<(SlotId, String), PendingTimer>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a timer, replacing the pending one of the same slot and
    /// operation.
    pub fn schedule(
        &mut self,
        slot: SlotId,
        player: PlayerId,
        operation: &str,
        state: State,
        due: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.pending.insert(
            (slot, operation.to_string()),
            PendingTimer {
                id,
                slot,
                player,
                operation: operation.to_string(),
                state,
                due,
            },
        );
        id
    }

    pub fn cancel(&mut self, slot: SlotId, operation: &str) -> Option<PendingTimer> {
        self.pending.remove(&(slot, operation.to_string()))
    }

    /// Cancel every timer of a slot, e.g. when its item is removed.
    pub fn cancel_slot(&mut self, slot: SlotId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|(owner, _), _| *owner != slot);
        before - self.pending.len()
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<PendingTimer> {
        let keys: Vec<(SlotId, String)> = self
            .pending
            .iter()
            .filter(|(_, timer)| timer.due <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut due: Vec<PendingTimer> = keys
            .into_iter()
            .filter_map(|key| self.pending.remove(&key))
            .collect();
        due.sort_by(|a, b| {
            a.due
                .cmp(&b.due)
                .then_with(|| a.slot.cmp(&b.slot))
                .then_with(|| a.operation.cmp(&b.operation))
        });
        due
    }

    pub fn get(&self, slot: SlotId, operation: &str) -> Option<&PendingTimer> {
        self.pending.get(&(slot, operation.to_string()))
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.pending.values().map(|timer| timer.due).min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(text: &str) -> State {
        text.parse().unwrap()
    }

    #[test]
    fn rescheduling_replaces_pending_timer() {
        let mut queue = TimerQueue::new();
        let now = Utc::now();
        let first = queue.schedule(SlotId(0), PlayerId(0), "reload", state("a"), now);
        let second = queue.schedule(SlotId(0), PlayerId(0), "reload", state("b"), now);

        assert_ne!(first, second);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(SlotId(0), "reload").unwrap().id, second);
    }

    #[test]
    fn timers_are_owned_per_slot_and_operation() {
        let mut queue = TimerQueue::new();
        let now = Utc::now();
        queue.schedule(SlotId(0), PlayerId(0), "reload", state("a"), now);
        queue.schedule(SlotId(0), PlayerId(0), "aim", state("a"), now);
        queue.schedule(SlotId(1), PlayerId(0), "reload", state("a"), now);

        assert_eq!(queue.len(), 3);
        assert!(queue.cancel(SlotId(0), "aim").is_some());
        assert_eq!(queue.cancel_slot(SlotId(0)), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn take_due_returns_earliest_first() {
        let mut queue = TimerQueue::new();
        let now = Utc::now();
        let later = now + chrono::Duration::milliseconds(20);
        queue.schedule(SlotId(1), PlayerId(0), "b", state("a"), later);
        queue.schedule(SlotId(2), PlayerId(0), "a", state("a"), now);
        queue.schedule(
            SlotId(3),
            PlayerId(0),
            "c",
            state("a"),
            now + chrono::Duration::seconds(5),
        );

        let due = queue.take_due(later);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].slot, SlotId(2));
        assert_eq!(due[1].slot, SlotId(1));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_due(), Some(now + chrono::Duration::seconds(5)));
    }
}
