//! Toolstate: declarative per-item state machines for game tools and weapons.
//!
//! An item (a bow, a crossbow, a lamp) has a state made of a few symbolic
//! dimensions, e.g. `idle-loaded`. Players send inputs; inputs drive
//! operations; operations verify and process pluggable systems (sound,
//! animation, inventory) and move the item to a new state, possibly
//! through an intermediate state that is left when a timer fires.
//!
//! The crate follows a "pure core, imperative shell" split:
//!
//! - [`core`]: states, wildcard resolution, outcomes, history. No side effects.
//! - [`builder`]: item definitions and their expansion into concrete transitions.
//! - [`effects`]: systems, compiled operations, the transition graph, timers
//!   and the [`Engine`](effects::Engine).
//! - [`sync`]: authoritative and predicted copies of per-slot state.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use toolstate::builder::{
//!     ItemDefinition, ItemFsmBuilder, InputDefinition, InputKind,
//!     OperationDefinition, OperationKind, StageDefinition, StateEntry,
//! };
//! use toolstate::core::{PlayerId, SlotId};
//! use toolstate::effects::{Engine, ManualClock};
//! use toolstate::sync::{Inventory, ItemStack};
//!
//! let item = ItemDefinition::new("crossbow", vec![vec!["idle".into()]], "idle")
//!     .input(InputDefinition::new("start_reload", InputKind::KeyPress))
//!     .operation(
//!         OperationDefinition::new("reload", OperationKind::Delayed)
//!             .delay_ms(1000)
//!             .state(StateEntry::staged("idle").timeout("idle").label("reloading"))
//!             .stage("initial", StageDefinition::new().input("start_reload")),
//!     );
//!
//! let clock = Arc::new(ManualClock::default());
//! let mut engine = Engine::builder(ItemFsmBuilder::new(item).build().unwrap())
//!     .clock(clock.clone())
//!     .storage(Inventory::new().with(SlotId(0), ItemStack::new("crossbow")))
//!     .build();
//!
//! engine.handle_input(SlotId(0), PlayerId(1), "start_reload");
//! assert_eq!(engine.state(SlotId(0)).to_string(), "reloading_to_idle_op.reload");
//!
//! clock.advance(Duration::from_millis(1000));
//! engine.tick();
//! assert_eq!(engine.state(SlotId(0)).to_string(), "idle");
//! ```

pub mod builder;
pub mod core;
pub mod effects;
pub mod sync;

// Re-export commonly used types
pub use builder::{ItemDefinition, ItemFsmBuilder};
pub use core::{State, StateCache, StateResolver};
pub use effects::{Engine, ItemFsm, System, SystemRegistry};
pub use sync::{Side, StateManager};
