//! Runtime driver of one item state machine.
//!
//! The engine owns everything that changes while the game runs: per-slot
//! state (through the [`StateManager`]), pending operation timers, the
//! state cache and the transition history. It is single threaded; inputs
//! and timer firings of a slot are processed in the order they are fed in.

use crate::builder::InputKind;
use crate::core::{
    GuardContext, PlayerId, SlotId, State, StateCache, StateHistory, TimeoutDirective,
    TransitionRecord, Trigger,
};
use crate::effects::clock::{Clock, SystemClock};
use crate::effects::fsm::ItemFsm;
use crate::effects::graph::{Inspection, Step, Traversal};
use crate::effects::timer::TimerQueue;
use crate::sync::{
    Inventory, Side, SlotStorage, StateManager, StatePacket, SyncError,
    DEFAULT_RECONCILIATION_WINDOW,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runtime knobs of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub side: Side,
    pub reconciliation_window_ms: u64,
    pub history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            side: Side::default(),
            reconciliation_window_ms: millis(DEFAULT_RECONCILIATION_WINDOW),
            history_capacity: 64,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl EngineConfig {
    pub fn reconciliation_window(&self) -> Duration {
        Duration::from_millis(self.reconciliation_window_ms)
    }
}

pub struct EngineBuilder {
    fsm: ItemFsm,
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    storage: Option<Box<dyn SlotStorage>>,
}

impl EngineBuilder {
    pub fn new(fsm: ItemFsm) -> Self {
        Self {
            fsm,
            config: EngineConfig::default(),
            clock: None,
            storage: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn side(mut self, side: Side) -> Self {
        self.config.side = side;
        self
    }

    pub fn reconciliation_window(mut self, window: Duration) -> Self {
        self.config.reconciliation_window_ms = millis(window);
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.config.history_capacity = capacity;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn storage(mut self, storage: impl SlotStorage + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    pub fn build(self) -> Engine {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let storage = self
            .storage
            .unwrap_or_else(|| Box::new(Inventory::new()));

        let manager = StateManager::new(
            self.config.side,
            self.fsm.fsm_id(),
            self.fsm.initial().clone(),
            clock.clone(),
            storage,
        )
        .with_window(self.config.reconciliation_window());

        Engine {
            cache: StateCache::with_states(self.fsm.resolver().states()),
            history: StateHistory::with_capacity(self.config.history_capacity),
            timers: TimerQueue::new(),
            manager,
            clock,
            fsm: self.fsm,
        }
    }
}

/// Drives an [`ItemFsm`] for every slot holding the item.
///
/// # Example
///
/// ```rust
/// use toolstate::builder::{
///     ItemDefinition, ItemFsmBuilder, InputDefinition, InputKind,
///     OperationDefinition, OperationKind, StageDefinition, StateEntry,
/// };
/// use toolstate::core::{PlayerId, SlotId};
/// use toolstate::effects::Engine;
/// use toolstate::sync::{Inventory, ItemStack};
///
/// let item = ItemDefinition::new("lamp", vec![vec!["off".into(), "on".into()]], "off")
///     .input(InputDefinition::new("toggle", InputKind::KeyPress))
///     .operation(
///         OperationDefinition::new("switch_on", OperationKind::Instant)
///             .state(StateEntry::instant("off", "on"))
///             .stage("initial", StageDefinition::new().input("toggle")),
///     );
/// let fsm = ItemFsmBuilder::new(item).build().unwrap();
///
/// let mut engine = Engine::builder(fsm)
///     .storage(Inventory::new().with(SlotId(0), ItemStack::new("lamp")))
///     .build();
///
/// assert!(engine.handle_input(SlotId(0), PlayerId(1), "toggle"));
/// assert_eq!(engine.state(SlotId(0)).to_string(), "on");
/// ```
pub struct Engine {
    fsm: ItemFsm,
    manager: StateManager,
    timers: TimerQueue,
    clock: Arc<dyn Clock>,
    cache: StateCache,
    history: StateHistory,
}

impl Engine {
    pub fn builder(fsm: ItemFsm) -> EngineBuilder {
        EngineBuilder::new(fsm)
    }

    pub fn fsm(&self) -> &ItemFsm {
        &self.fsm
    }

    pub fn side(&self) -> Side {
        self.manager.side()
    }

    /// Current state of a slot.
    ///
    /// Stored states outside the state space (e.g. written by an older item
    /// definition) read as the initial state.
    pub fn state(&mut self, slot: SlotId) -> State {
        let state = self.manager.get(&mut self.cache, slot);
        if self.fsm.resolver().contains(&state) {
            return state;
        }
        warn!(
            item = %self.fsm.item(),
            %slot,
            state = %state,
            "stored state is not part of the state space, using initial"
        );
        self.fsm.initial().clone()
    }

    /// Overwrite the state of a slot without running any operation.
    pub fn set_state(&mut self, slot: SlotId, state: State) -> Result<(), SyncError> {
        if !self.fsm.resolver().contains(&state) {
            return Err(SyncError::UnknownState {
                slot,
                state: state.serialize(),
            });
        }
        let state = self.cache.canonical(&state);
        self.manager.set(&mut self.cache, slot, state)
    }

    /// Normalised input callback. Returns whether the state machine handled
    /// the input; unknown input codes are never handled.
    pub fn handle_input(&mut self, slot: SlotId, player: PlayerId, input: &str) -> bool {
        match self.fsm.input_id(input) {
            Some(id) => self.fire(slot, player, Trigger::Input(id)).handled,
            None => {
                debug!(item = %self.fsm.item(), input, "input not declared by item");
                false
            }
        }
    }

    /// Host notification that the content of `slot` changed.
    ///
    /// A slot that no longer holds a stack loses its timers and
    /// predictions. Otherwise every input of kind
    /// [`InputKind::SlotChanged`] is dispatched in declaration order.
    pub fn on_slot_changed(&mut self, slot: SlotId, player: PlayerId) -> bool {
        if self.manager.storage().stack(slot).is_none() {
            let cancelled = self.timers.cancel_slot(slot);
            self.manager.forget(slot);
            debug!(item = %self.fsm.item(), %slot, cancelled, "slot emptied");
            return false;
        }

        let inputs: Vec<_> = self.fsm.inputs_of_kind(InputKind::SlotChanged).collect();
        let mut handled = false;
        for id in inputs {
            handled |= self.fire(slot, player, Trigger::Input(id)).handled;
        }
        handled
    }

    /// Process one trigger for a slot and apply the result.
    ///
    /// A slot without an item stack never runs any operation.
    pub fn fire(&mut self, slot: SlotId, player: PlayerId, trigger: Trigger) -> Traversal {
        let from = self.state(slot);
        if self.manager.storage().stack(slot).is_none() {
            debug!(item = %self.fsm.item(), %slot, %trigger, "no item stack in slot");
            return Traversal {
                state: from,
                handled: false,
                step: None,
            };
        }

        let traversal = {
            let ctx = GuardContext::new(slot, player, &from, trigger);
            self.fsm.process(&ctx)
        };

        if let Some(step) = &traversal.step {
            let to = self.cache.canonical(&traversal.state);
            if let Err(err) = self.manager.set(&mut self.cache, slot, to.clone()) {
                warn!(item = %self.fsm.item(), %slot, error = %err, "failed to store state");
                return Traversal {
                    state: from,
                    handled: false,
                    step: None,
                };
            }
            self.apply_timeout(slot, player, step, &to);

            debug!(
                item = %self.fsm.item(),
                %slot,
                operation = %step.label,
                from = %from,
                to = %to,
                %trigger,
                "transition"
            );
            self.history.record(TransitionRecord {
                slot,
                from,
                to,
                trigger,
                operation: step.label.clone(),
                outcome: step.result.outcome,
                timestamp: self.clock.now(),
            });
        }

        traversal
    }

    fn apply_timeout(&mut self, slot: SlotId, player: PlayerId, step: &Step, state: &State) {
        match step.result.timeout {
            TimeoutDirective::Start => {
                let Some(delay) = step.result.delay else {
                    return;
                };
                let Ok(delay) = chrono::Duration::from_std(delay) else {
                    warn!(operation = %step.label, ?delay, "timer delay out of range");
                    return;
                };
                let due = self.clock.now() + delay;
                self.timers
                    .schedule(slot, player, &step.label, state.clone(), due);
            }
            TimeoutDirective::Stop => {
                self.timers.cancel(slot, &step.label);
            }
            TimeoutDirective::Ignore => {}
        }
    }

    /// Fire every due timer whose slot is still in the state it was
    /// scheduled for, and reconcile expired predictions.
    ///
    /// Returns the number of timers that fired a transition.
    pub fn tick(&mut self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;

        for timer in self.timers.take_due(now) {
            let current = self.state(timer.slot);
            if current != timer.state {
                debug!(
                    item = %self.fsm.item(),
                    slot = %timer.slot,
                    operation = %timer.operation,
                    scheduled = %timer.state,
                    current = %current,
                    "stale timer"
                );
                continue;
            }
            if self
                .fire(timer.slot, timer.player, Trigger::Timeout)
                .step
                .is_some()
            {
                fired += 1;
            }
        }

        if self.manager.side() == Side::Predictive {
            self.manager.reconcile(&mut self.cache);
        }

        fired
    }

    /// Verify-only view of the guards an input would try.
    pub fn inspect(&mut self, slot: SlotId, player: PlayerId, input: &str) -> Vec<Inspection> {
        let Some(id) = self.fsm.input_id(input) else {
            return Vec::new();
        };
        let state = self.state(slot);
        let ctx = GuardContext::new(slot, player, &state, Trigger::Input(id));
        self.fsm.inspect(&ctx)
    }

    pub fn apply_packet(&mut self, packet: &StatePacket) -> Result<(), SyncError> {
        self.manager.apply_packet(&mut self.cache, packet)
    }

    pub fn drain_outgoing(&mut self) -> Vec<StatePacket> {
        self.manager.drain_outgoing()
    }

    pub fn history(&self) -> &StateHistory {
        &self.history
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    pub fn storage(&self) -> &dyn SlotStorage {
        self.manager.storage()
    }

    pub fn storage_mut(&mut self) -> &mut dyn SlotStorage {
        self.manager.storage_mut()
    }

    /// Drop all pending timers and cached states.
    pub fn shutdown(&mut self) {
        self.timers.clear();
        self.cache.clear();
        debug!(item = %self.fsm.item(), "engine shut down");
    }
}
