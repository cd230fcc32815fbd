//! Two-phase guarded transitions.

use crate::core::{Guard, GuardContext, Outcome, State, TimeoutDirective, TransitionMap};
use std::time::Duration;

/// Result of performing a transition.
#[derive(Clone, Debug, PartialEq)]
pub struct PerformResult {
    /// State the entity should be in afterwards
    pub state: State,
    pub outcome: Outcome,
    pub timeout: TimeoutDirective,
    /// Timer delay, present when `timeout` is `Start`
    pub delay: Option<Duration>,
}

impl PerformResult {
    /// The transition did not happen; the entity keeps `state`.
    pub fn declined(state: &State) -> Self {
        Self {
            state: state.clone(),
            outcome: Outcome::Failed,
            timeout: TimeoutDirective::Ignore,
            delay: None,
        }
    }
}

/// Compiled guard stored on a graph edge.
///
/// `verify` must be side-effect free and re-entrant. `perform` is only
/// called when `verify` did not return [`Outcome::Failed`] and may change the
/// world through systems.
pub trait Handler: Send + Sync {
    fn verify(&self, ctx: &GuardContext<'_>) -> Outcome;

    fn perform(&self, ctx: &GuardContext<'_>) -> PerformResult;
}

/// Handler backed by a pure [`Guard`] predicate and a resolved mapping.
///
/// Used for transitions registered directly by callers instead of through
/// an operation definition.
#[derive(Debug, Clone)]
pub struct PredicateHandler {
    guard: Guard,
    targets: TransitionMap,
}

impl PredicateHandler {
    pub fn new(guard: Guard, targets: TransitionMap) -> Self {
        Self { guard, targets }
    }
}

impl Handler for PredicateHandler {
    fn verify(&self, ctx: &GuardContext<'_>) -> Outcome {
        if self.targets.contains_key(ctx.state) && self.guard.check(ctx) {
            Outcome::StartedAndFinished
        } else {
            Outcome::Failed
        }
    }

    fn perform(&self, ctx: &GuardContext<'_>) -> PerformResult {
        match self.targets.get(ctx.state) {
            Some(to) if self.guard.check(ctx) => PerformResult {
                state: to.clone(),
                outcome: Outcome::StartedAndFinished,
                timeout: TimeoutDirective::Ignore,
                delay: None,
            },
            _ => PerformResult::declined(ctx.state),
        }
    }
}
