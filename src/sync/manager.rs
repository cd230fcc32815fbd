//! Authoritative and predicted state slots.
//!
//! The authoritative side reads and writes the persisted attribute
//! directly. The predictive side keeps an optimistic local value on top of
//! the last replicated snapshot and gives it up once it has disagreed with
//! the snapshot for longer than the reconciliation window.

use crate::core::{SlotId, State, StateCache};
use crate::effects::Clock;
use crate::sync::error::SyncError;
use crate::sync::packet::StatePacket;
use crate::sync::storage::{state_attribute, SlotStorage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest time a prediction may disagree with the authoritative state.
pub const DEFAULT_RECONCILIATION_WINDOW: Duration = Duration::from_millis(90);

/// Which copy of the state this process owns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Server: persisted value is the truth
    #[default]
    Authoritative,
    /// Client: local predictions over replicated snapshots
    Predictive,
}

#[derive(Debug, Clone)]
struct Prediction {
    state: State,
    diverged_at: DateTime<Utc>,
}

pub struct StateManager {
    side: Side,
    fsm_id: String,
    attribute: String,
    initial: State,
    window: Duration,
    clock: Arc<dyn Clock>,
    storage: Box<dyn SlotStorage>,
    predictions: HashMap<SlotId, Prediction>,
    dirty: BTreeSet<SlotId>,
}

impl StateManager {
    pub fn new(
        side: Side,
        fsm_id: impl Into<String>,
        initial: State,
        clock: Arc<dyn Clock>,
        storage: Box<dyn SlotStorage>,
    ) -> Self {
        let fsm_id = fsm_id.into();
        Self {
            side,
            attribute: state_attribute(&fsm_id),
            fsm_id,
            initial,
            window: DEFAULT_RECONCILIATION_WINDOW,
            clock,
            storage,
            predictions: HashMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn storage(&self) -> &dyn SlotStorage {
        self.storage.as_ref()
    }

    pub fn storage_mut(&mut self) -> &mut dyn SlotStorage {
        self.storage.as_mut()
    }

    /// Persisted state of a slot; `None` if the stack carries no state yet.
    pub fn authoritative(
        &self,
        cache: &mut StateCache,
        slot: SlotId,
    ) -> Result<Option<State>, SyncError> {
        let stack = self
            .storage
            .stack(slot)
            .ok_or(SyncError::MissingStack { slot })?;

        let Some(text) = stack.attribute(&self.attribute) else {
            return Ok(None);
        };

        cache
            .intern(text)
            .map(Some)
            .map_err(|source| SyncError::MalformedState {
                slot,
                text: text.to_string(),
                source,
            })
    }

    fn snapshot(&self, cache: &mut StateCache, slot: SlotId) -> State {
        match self.authoritative(cache, slot) {
            Ok(Some(state)) => state,
            Ok(None) => self.initial.clone(),
            Err(err) => {
                warn!(fsm = %self.fsm_id, %slot, error = %err, "falling back to initial state");
                self.initial.clone()
            }
        }
    }

    /// Current state of a slot as seen by this side.
    pub fn get(&mut self, cache: &mut StateCache, slot: SlotId) -> State {
        let snapshot = self.snapshot(cache, slot);
        if self.side == Side::Authoritative {
            return snapshot;
        }

        let Some(prediction) = self.predictions.get(&slot) else {
            return snapshot;
        };

        if prediction.state == snapshot {
            self.predictions.remove(&slot);
            return snapshot;
        }

        let elapsed = self
            .clock
            .now()
            .signed_duration_since(prediction.diverged_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        if elapsed > self.window {
            debug!(
                fsm = %self.fsm_id,
                %slot,
                predicted = %prediction.state,
                authoritative = %snapshot,
                ?elapsed,
                "prediction expired, reconciling"
            );
            self.predictions.remove(&slot);
            return snapshot;
        }

        prediction.state.clone()
    }

    /// Write a new state for a slot.
    ///
    /// Authoritative: persisted immediately and queued for replication.
    /// Predictive: stored as a local prediction; the first divergence since
    /// the last reconciliation is timestamped.
    pub fn set(
        &mut self,
        cache: &mut StateCache,
        slot: SlotId,
        state: State,
    ) -> Result<(), SyncError> {
        match self.side {
            Side::Authoritative => {
                let stack = self
                    .storage
                    .stack_mut(slot)
                    .ok_or(SyncError::MissingStack { slot })?;
                stack.set_attribute(self.attribute.clone(), state.serialize());
                self.dirty.insert(slot);
            }
            Side::Predictive => {
                if let Some(prediction) = self.predictions.get_mut(&slot) {
                    prediction.state = state;
                } else if state != self.snapshot(cache, slot) {
                    self.predictions.insert(
                        slot,
                        Prediction {
                            state,
                            diverged_at: self.clock.now(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Local prediction of a slot, if one is outstanding.
    pub fn prediction(&self, slot: SlotId) -> Option<&State> {
        self.predictions.get(&slot).map(|p| &p.state)
    }

    /// Sweep every outstanding prediction through [`StateManager::get`].
    /// Returns how many predictions were dropped.
    pub fn reconcile(&mut self, cache: &mut StateCache) -> usize {
        let slots: Vec<SlotId> = self.predictions.keys().copied().collect();
        let before = self.predictions.len();
        for slot in slots {
            self.get(cache, slot);
        }
        before - self.predictions.len()
    }

    /// Store a replicated authoritative state on the predictive side.
    pub fn apply_packet(
        &mut self,
        cache: &mut StateCache,
        packet: &StatePacket,
    ) -> Result<(), SyncError> {
        if self.side != Side::Predictive {
            return Err(SyncError::NotPredictive);
        }
        if packet.fsm != self.fsm_id {
            return Err(SyncError::WrongMachine {
                expected: self.fsm_id.clone(),
                found: packet.fsm.clone(),
            });
        }

        let state = cache
            .intern(&packet.state)
            .map_err(|source| SyncError::MalformedState {
                slot: packet.slot,
                text: packet.state.clone(),
                source,
            })?;

        let stack = self
            .storage
            .stack_mut(packet.slot)
            .ok_or(SyncError::MissingStack { slot: packet.slot })?;
        stack.set_attribute(self.attribute.clone(), state.serialize());
        Ok(())
    }

    /// Packets for every slot written since the last drain.
    pub fn drain_outgoing(&mut self) -> Vec<StatePacket> {
        let slots = std::mem::take(&mut self.dirty);
        slots
            .into_iter()
            .filter_map(|slot| {
                let state = self.storage.stack(slot)?.attribute(&self.attribute)?;
                Some(StatePacket {
                    fsm: self.fsm_id.clone(),
                    slot,
                    state: state.to_string(),
                })
            })
            .collect()
    }

    /// Drop local bookkeeping of a slot whose item went away.
    pub fn forget(&mut self, slot: SlotId) {
        self.predictions.remove(&slot);
        self.dirty.remove(&slot);
    }
}
