//! State synchronization between the authoritative and predictive sides.
//!
//! Per-entity state lives on the entity's own item stack. The server
//! persists and replicates it; clients predict on top of the replicated
//! snapshot and reconcile within a bounded window.

pub mod error;
pub mod manager;
pub mod packet;
pub mod storage;

pub use error::SyncError;
pub use manager::{Side, StateManager, DEFAULT_RECONCILIATION_WINDOW};
pub use packet::StatePacket;
pub use storage::{state_attribute, Inventory, ItemStack, SlotStorage};
