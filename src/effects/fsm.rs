//! A fully bound item state machine.

use crate::builder::{DefinitionError, InputDefinition, InputKind};
use crate::core::{GuardContext, InputId, State, StateResolver};
use crate::effects::graph::{FsmGraph, Inspection, Traversal};
use crate::effects::operation::Operation;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable result of [`ItemFsmBuilder::build`](crate::builder::ItemFsmBuilder::build).
///
/// Holds the final state space (declared values plus synthesized
/// intermediate tokens), the transition graph and the input vocabulary.
/// Per-slot state is not stored here; see [`Engine`](crate::effects::Engine).
#[derive(Debug)]
pub struct ItemFsm {
    pub(crate) item: String,
    pub(crate) fsm_id: String,
    pub(crate) initial: State,
    pub(crate) resolver: StateResolver,
    pub(crate) graph: FsmGraph,
    pub(crate) inputs: Vec<InputDefinition>,
    pub(crate) input_ids: HashMap<String, InputId>,
    pub(crate) operations: Vec<Arc<Operation>>,
    pub(crate) diagnostics: Vec<DefinitionError>,
}

impl ItemFsm {
    pub fn item(&self) -> &str {
        &self.item
    }

    pub fn fsm_id(&self) -> &str {
        &self.fsm_id
    }

    pub fn initial(&self) -> &State {
        &self.initial
    }

    pub fn resolver(&self) -> &StateResolver {
        &self.resolver
    }

    pub fn graph(&self) -> &FsmGraph {
        &self.graph
    }

    pub fn input_id(&self, code: &str) -> Option<InputId> {
        self.input_ids.get(code).copied()
    }

    pub fn input_code(&self, id: InputId) -> Option<&str> {
        self.inputs
            .get(id.0 as usize)
            .map(|input| input.code.as_str())
    }

    pub fn inputs(&self) -> &[InputDefinition] {
        &self.inputs
    }

    /// Ids of every input bound to the host event class `kind`.
    pub fn inputs_of_kind(&self, kind: InputKind) -> impl Iterator<Item = InputId> + '_ {
        self.inputs
            .iter()
            .enumerate()
            .filter(move |(_, input)| input.kind == kind)
            .map(|(index, _)| InputId(index as u32))
    }

    pub fn operations(&self) -> &[Arc<Operation>] {
        &self.operations
    }

    pub fn operation(&self, code: &str) -> Option<&Arc<Operation>> {
        self.operations.iter().find(|op| op.code() == code)
    }

    /// Content errors found while building; the rules they name were dropped.
    pub fn diagnostics(&self) -> &[DefinitionError] {
        &self.diagnostics
    }

    pub fn process(&self, ctx: &GuardContext<'_>) -> Traversal {
        self.graph.process(ctx)
    }

    pub fn inspect(&self, ctx: &GuardContext<'_>) -> Vec<Inspection> {
        self.graph.inspect(ctx)
    }
}
