//! Operation outcomes and timeout directives.

use serde::{Deserialize, Serialize};

/// Result of verifying or performing one operation transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Handled without moving: a `continue` self loop.
    None,
    /// The operation entered its intermediate state.
    Started,
    /// A precondition or system declined.
    Failed,
    /// The operation left its intermediate state.
    Finished,
    /// An instant operation ran start to finish in one step.
    StartedAndFinished,
}

impl Outcome {
    /// Whether a guard returning this outcome lets the edge be traversed.
    pub fn advances(self) -> bool {
        matches!(self, Self::Started | Self::Finished | Self::StartedAndFinished)
    }

    /// Whether the input counts as consumed by the state machine.
    pub fn handled(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// What the engine should do with the operation timer after a perform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutDirective {
    /// Leave any pending timer untouched.
    #[default]
    Ignore,
    /// Schedule a timer for the new state.
    Start,
    /// Cancel the pending timer of this operation.
    Stop,
}
