//! Synchronization error types.

use crate::core::{SlotId, StateError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The slot holds no item stack to read the state from
    #[error("No item stack in {slot}")]
    MissingStack { slot: SlotId },

    /// The persisted attribute does not parse as a state
    #[error("Malformed state '{text}' in {slot}: {source}")]
    MalformedState {
        slot: SlotId,
        text: String,
        #[source]
        source: StateError,
    },

    /// The state is not part of the item's state space
    #[error("State '{state}' is not a state of the item in {slot}")]
    UnknownState { slot: SlotId, state: String },

    /// A packet addressed to another state machine
    #[error("Packet for state machine '{found}' delivered to '{expected}'")]
    WrongMachine { expected: String, found: String },

    /// Authoritative state is only accepted on the predictive side
    #[error("Authoritative packets cannot be applied on the authoritative side")]
    NotPredictive,

    #[error("Packet codec failed: {0}")]
    Codec(#[from] bincode::Error),
}
