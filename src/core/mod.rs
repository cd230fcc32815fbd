//! Core state machine types and logic.
//!
//! This module contains the pure part of the engine:
//! - `State` values and the wildcard algebra over them
//! - the `StateResolver` that expands patterns into concrete states
//! - guard predicates, outcomes and transition history
//!
//! Nothing in here calls into systems or touches timers.

mod cache;
mod context;
mod guard;
mod history;
mod outcome;
mod resolver;
mod state;

pub use cache::StateCache;
pub use context::{GuardContext, InputId, PlayerId, SlotId, Trigger};
pub use guard::Guard;
pub use history::{StateHistory, TransitionRecord};
pub use outcome::{Outcome, TimeoutDirective};
pub use resolver::{ResolveError, StateResolver, TransitionMap};
pub use state::{State, StateError, SEPARATOR, WILDCARD};
