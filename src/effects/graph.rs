//! Runtime transition graph.
//!
//! One node per state, one edge per `(state, trigger)`. An edge keeps an
//! ordered list of guarded transitions; executing the edge tries them in
//! registration order and the first one that advances wins.

use crate::core::{GuardContext, Outcome, State, Trigger};
use crate::effects::transition::{Handler, PerformResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A guarded transition registered on an edge.
#[derive(Clone)]
pub struct EdgeGuard {
    /// Operation code or handler label, for logs and history
    pub label: String,
    /// Destination when this guard succeeds
    pub head: State,
    pub handler: Arc<dyn Handler>,
}

impl fmt::Debug for EdgeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeGuard")
            .field("label", &self.label)
            .field("head", &self.head)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FsmEdge {
    pub trigger: Trigger,
    pub tail: State,
    pub guards: Vec<EdgeGuard>,
}

#[derive(Debug, Clone)]
pub struct FsmNode {
    pub state: State,
    pub edges: HashMap<Trigger, FsmEdge>,
}

/// Successful guard of a traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub label: String,
    pub result: PerformResult,
}

/// Result of processing one trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    /// State after processing; the input state when nothing advanced
    pub state: State,
    /// Whether any guard consumed the trigger
    pub handled: bool,
    /// The guard that advanced, if any
    pub step: Option<Step>,
}

impl Traversal {
    fn unchanged(state: &State, handled: bool) -> Self {
        Self {
            state: state.clone(),
            handled,
            step: None,
        }
    }
}

/// Verify-only view of one guard, for inspection tooling.
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    pub label: String,
    pub head: State,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default)]
pub struct FsmGraph {
    nodes: HashMap<State, FsmNode>,
}

impl FsmGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a node exists for `state`.
    pub fn add_state(&mut self, state: State) {
        self.nodes
            .entry(state.clone())
            .or_insert_with(|| FsmNode {
                state,
                edges: HashMap::new(),
            });
    }

    /// Append a guarded transition to the `(tail, trigger)` edge.
    pub fn register(
        &mut self,
        tail: State,
        trigger: Trigger,
        head: State,
        label: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) {
        self.add_state(head.clone());
        self.add_state(tail.clone());

        if let Some(node) = self.nodes.get_mut(&tail) {
            node.edges
                .entry(trigger)
                .or_insert_with(|| FsmEdge {
                    trigger,
                    tail: tail.clone(),
                    guards: Vec::new(),
                })
                .guards
                .push(EdgeGuard {
                    label: label.into(),
                    head,
                    handler,
                });
        }
    }

    pub fn node(&self, state: &State) -> Option<&FsmNode> {
        self.nodes.get(state)
    }

    pub fn edge(&self, state: &State, trigger: Trigger) -> Option<&FsmEdge> {
        self.nodes.get(state)?.edges.get(&trigger)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|node| node.edges.len()).sum()
    }

    /// Execute the edge for `ctx.state` and `ctx.trigger`.
    ///
    /// Missing nodes or edges leave the state unchanged. Otherwise each
    /// guard is verified and, unless it failed, performed; the first one
    /// whose outcome advances decides the destination.
    pub fn process(&self, ctx: &GuardContext<'_>) -> Traversal {
        let Some(edge) = self.edge(ctx.state, ctx.trigger) else {
            return Traversal::unchanged(ctx.state, false);
        };

        let mut handled = false;
        for guard in &edge.guards {
            if guard.handler.verify(ctx) == Outcome::Failed {
                continue;
            }

            let result = guard.handler.perform(ctx);
            handled |= result.outcome.handled();
            if result.outcome.advances() {
                return Traversal {
                    state: guard.head.clone(),
                    handled: true,
                    step: Some(Step {
                        label: guard.label.clone(),
                        result,
                    }),
                };
            }
        }

        Traversal::unchanged(ctx.state, handled)
    }

    /// Run only `verify` on every guard of the edge.
    pub fn inspect(&self, ctx: &GuardContext<'_>) -> Vec<Inspection> {
        self.edge(ctx.state, ctx.trigger)
            .map(|edge| {
                edge.guards
                    .iter()
                    .map(|guard| Inspection {
                        label: guard.label.clone(),
                        head: guard.head.clone(),
                        outcome: guard.handler.verify(ctx),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
