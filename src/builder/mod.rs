//! Turning declarative item definitions into runnable state machines.
//!
//! [`ItemDefinition`] describes an item in data. [`ItemFsmBuilder`] binds it
//! to systems and extra handlers, expands every operation into concrete
//! transitions and produces an [`ItemFsm`](crate::effects::ItemFsm).

pub mod definition;
pub mod error;
pub mod machine;
pub mod operation;
pub mod validation;

pub use definition::{
    is_reserved_stage, InputDefinition, InputKind, ItemDefinition, OperationDefinition,
    OperationKind, StageDefinition, StateEntry, SystemRequest, Target, STAGE_CONTINUE,
    STAGE_INITIAL, STAGE_TIMEOUT,
};
pub use error::{BuildError, DefinitionError};
pub use machine::ItemFsmBuilder;
pub use operation::{intermediate_state, plan_operation, Bindings, OperationPlan};
pub use validation::Diagnostics;
