//! Effectful shell around the pure core.
//!
//! Everything here either calls out to pluggable systems or owns mutable
//! runtime data: compiled operations, the transition graph, timers and the
//! [`Engine`] that ties them to per-slot state.

mod clock;
mod engine;
mod fsm;
mod graph;
mod operation;
mod system;
mod timer;
mod transition;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Engine, EngineBuilder, EngineConfig};
pub use fsm::ItemFsm;
pub use graph::{EdgeGuard, FsmEdge, FsmGraph, FsmNode, Inspection, Step, Traversal};
pub use operation::{DelayModifier, Operation, TransitionEntry, TransitionTable, Unscaled};
pub use system::{BoundRequest, System, SystemError, SystemRegistry};
pub use timer::{PendingTimer, TimerQueue};
pub use transition::{Handler, PerformResult, PredicateHandler};
