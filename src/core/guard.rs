//! Guard predicates for transitions registered without an operation.
//!
//! Guards are pure boolean functions over a [`GuardContext`]. They are the
//! building block for handlers registered directly through
//! [`ItemFsmBuilder::handler`](crate::builder::ItemFsmBuilder::handler).

use super::context::GuardContext;
use std::fmt;
use std::sync::Arc;

/// Pure predicate that determines if a transition can execute.
///
/// The predicate may be evaluated more than once for the same event,
/// including by inspection tooling, so it must not have side effects.
///
/// # Example
///
/// ```rust
/// use toolstate::core::{Guard, GuardContext, InputId, PlayerId, SlotId, State, Trigger};
///
/// let only_first_slot = Guard::new(|ctx: &GuardContext<'_>| ctx.slot == SlotId(0));
///
/// let idle: State = "idle".parse().unwrap();
/// let ctx = GuardContext::new(SlotId(0), PlayerId(7), &idle, Trigger::Input(InputId(0)));
/// assert!(only_first_slot.check(&ctx));
/// ```
#[derive(Clone)]
pub struct Guard {
    predicate: Arc<dyn Fn(&GuardContext<'_>) -> bool + Send + Sync>,
}

impl Guard {
    /// Create a guard from a pure predicate function.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&GuardContext<'_>) -> bool + Send + Sync + 'static,
    {
        Guard {
            predicate: Arc::new(predicate),
        }
    }

    /// Guard that always allows the transition.
    pub fn always() -> Self {
        Self::new(|_| true)
    }

    pub fn check(&self, ctx: &GuardContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}
