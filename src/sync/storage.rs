//! Where states are persisted: attributes of the item stack in a slot.

use crate::core::SlotId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute key holding the state of the state machine `fsm_id`.
///
/// Keys are namespaced so several independent machines can live on one
/// item stack.
pub fn state_attribute(fsm_id: &str) -> String {
    format!("fsm.{fsm_id}.state")
}

/// Persisted data of one item stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub code: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

impl ItemStack {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }
}

/// Host inventory access.
pub trait SlotStorage: Send {
    fn stack(&self, slot: SlotId) -> Option<&ItemStack>;

    fn stack_mut(&mut self, slot: SlotId) -> Option<&mut ItemStack>;

    fn remove_stack(&mut self, slot: SlotId) -> Option<ItemStack>;
}

/// In-memory slot storage.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    slots: BTreeMap<SlotId, ItemStack>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, slot: SlotId, stack: ItemStack) -> Self {
        self.insert(slot, stack);
        self
    }

    pub fn insert(&mut self, slot: SlotId, stack: ItemStack) -> Option<ItemStack> {
        self.slots.insert(slot, stack)
    }
}

impl SlotStorage for Inventory {
    fn stack(&self, slot: SlotId) -> Option<&ItemStack> {
        self.slots.get(&slot)
    }

    fn stack_mut(&mut self, slot: SlotId) -> Option<&mut ItemStack> {
        self.slots.get_mut(&slot)
    }

    fn remove_stack(&mut self, slot: SlotId) -> Option<ItemStack> {
        self.slots.remove(&slot)
    }
}
