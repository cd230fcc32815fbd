//! Replication packet: the latest serialized state of one slot.

use crate::core::SlotId;
use crate::sync::error::SyncError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePacket {
    /// State machine instance id
    pub fsm: String,
    pub slot: SlotId,
    /// Serialized state (`a-b-c`)
    pub state: String,
}

impl StatePacket {
    pub fn encode(&self) -> Result<Vec<u8>, SyncError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SyncError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
