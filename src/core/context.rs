//! Identifiers and the evaluation context handed to guards.

use super::state::State;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a stateful entity: the item stack held in one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub u64);

/// Player acting on a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u64);

/// Index of a declared input within its item definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

/// What caused an edge to be evaluated.
///
/// `Timeout` is never produced by a player; it is injected when a scheduled
/// operation timer fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Trigger {
    Input(InputId),
    Timeout,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(id) => write!(f, "input#{}", id.0),
            Self::Timeout => f.write_str("timeout"),
        }
    }
}

/// Everything a guard may look at when deciding on a transition.
#[derive(Clone, Copy, Debug)]
pub struct GuardContext<'a> {
    pub slot: SlotId,
    pub player: PlayerId,
    pub state: &'a State,
    pub trigger: Trigger,
}

impl<'a> GuardContext<'a> {
    pub fn new(slot: SlotId, player: PlayerId, state: &'a State, trigger: Trigger) -> Self {
        Self {
            slot,
            player,
            state,
            trigger,
        }
    }
}
