//! Builder for item state machines.

use crate::builder::definition::ItemDefinition;
use crate::builder::error::{BuildError, DefinitionError};
use crate::builder::operation::{plan_operation, Bindings, OperationPlan};
use crate::builder::validation::{check_input, check_operation, Diagnostics};
use crate::core::{Guard, GuardContext, InputId, State, StateResolver, Trigger};
use crate::effects::{
    DelayModifier, FsmGraph, Handler, ItemFsm, Operation, PredicateHandler, SystemRegistry,
    Unscaled,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

enum HandlerSource {
    Predicate(Guard),
    Custom(Arc<dyn Handler>),
}

struct HandlerRegistration {
    from: String,
    input: String,
    to: String,
    label: String,
    source: HandlerSource,
}

/// Binds an [`ItemDefinition`] to systems and caller-registered handlers.
///
/// Operations are registered on the graph first, in definition order, then
/// handlers in call order. On an edge shared by several of them the one
/// registered first wins when more than one guard would pass.
///
/// # Example
///
/// ```rust
/// use toolstate::builder::{
///     ItemDefinition, ItemFsmBuilder, InputDefinition, InputKind,
///     OperationDefinition, OperationKind, StageDefinition, StateEntry,
/// };
///
/// let item = ItemDefinition::new("lamp", vec![vec!["off".into(), "on".into()]], "off")
///     .input(InputDefinition::new("toggle", InputKind::KeyPress))
///     .operation(
///         OperationDefinition::new("switch_on", OperationKind::Instant)
///             .state(StateEntry::instant("off", "on"))
///             .stage("initial", StageDefinition::new().input("toggle")),
///     );
///
/// let fsm = ItemFsmBuilder::new(item)
///     .handler("on", "toggle", "off", "switch_off", |_| true)
///     .build()
///     .unwrap();
///
/// assert!(fsm.diagnostics().is_empty());
/// assert_eq!(fsm.graph().edge_count(), 2);
/// ```
pub struct ItemFsmBuilder {
    definition: ItemDefinition,
    systems: SystemRegistry,
    modifier: Arc<dyn DelayModifier>,
    handlers: Vec<HandlerRegistration>,
}

impl ItemFsmBuilder {
    pub fn new(definition: ItemDefinition) -> Self {
        Self {
            definition,
            systems: SystemRegistry::new(),
            modifier: Arc::new(Unscaled),
            handlers: Vec::new(),
        }
    }

    /// Systems operation stages may call.
    pub fn systems(mut self, systems: SystemRegistry) -> Self {
        self.systems = systems;
        self
    }

    /// Scaling applied to operation delays when a timer is started.
    pub fn delay_modifier(mut self, modifier: Arc<dyn DelayModifier>) -> Self {
        self.modifier = modifier;
        self
    }

    /// Register a transition guarded by a pure predicate.
    ///
    /// `from` and `to` are patterns; wildcards in `to` keep the token of the
    /// start state.
    pub fn handler<F>(
        mut self,
        from: impl Into<String>,
        input: impl Into<String>,
        to: impl Into<String>,
        label: impl Into<String>,
        predicate: F,
    ) -> Self
    where
        F: Fn(&GuardContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.handlers.push(HandlerRegistration {
            from: from.into(),
            input: input.into(),
            to: to.into(),
            label: label.into(),
            source: HandlerSource::Predicate(Guard::new(predicate)),
        });
        self
    }

    /// Register a transition backed by any verify/perform implementation.
    pub fn guard(
        mut self,
        from: impl Into<String>,
        input: impl Into<String>,
        to: impl Into<String>,
        label: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        self.handlers.push(HandlerRegistration {
            from: from.into(),
            input: input.into(),
            to: to.into(),
            label: label.into(),
            source: HandlerSource::Custom(handler),
        });
        self
    }

    /// Build the state machine.
    ///
    /// Fails only when the item itself is unusable: no or invalid
    /// dimensions, or an initial state outside the declared state space.
    /// Content errors are logged, the rules they concern are dropped and the
    /// errors are kept as [`ItemFsm::diagnostics`].
    pub fn build(self) -> Result<ItemFsm, BuildError> {
        let Self {
            definition,
            systems,
            modifier,
            handlers,
        } = self;
        let item = definition.code.clone();

        if definition.dimensions.is_empty() {
            return Err(BuildError::NoDimensions { item });
        }
        let declared = StateResolver::new(definition.dimensions.clone()).map_err(|source| {
            BuildError::InvalidDimensions {
                item: item.clone(),
                source,
            }
        })?;

        let initial =
            State::parse(&definition.initial).map_err(|source| BuildError::InvalidInitialState {
                item: item.clone(),
                initial: definition.initial.clone(),
                source,
            })?;
        if !declared.contains(&initial) {
            return Err(BuildError::UnknownInitialState {
                item,
                initial: definition.initial,
            });
        }

        let mut diagnostics = Diagnostics::new(item.clone());

        let mut inputs = Vec::new();
        let mut input_ids = HashMap::new();
        let mut seen = HashSet::new();
        for input in definition.inputs {
            if !diagnostics.absorb(check_input(&input, &seen)) {
                continue;
            }
            seen.insert(input.code.clone());
            input_ids.insert(input.code.clone(), InputId(inputs.len() as u32));
            inputs.push(input);
        }

        let bindings = Bindings {
            item: &item,
            inputs: &input_ids,
            systems: &systems,
        };
        let mut plans: Vec<OperationPlan> = Vec::new();
        let mut seen = HashSet::new();
        for op in &definition.operations {
            if !diagnostics.absorb(check_operation(op, &seen)) {
                continue;
            }
            seen.insert(op.code.clone());
            plans.push(plan_operation(op, &declared, &bindings, &mut diagnostics));
        }

        let mut dimensions = declared.dimensions().to_vec();
        for plan in &plans {
            for (values, tokens) in dimensions.iter_mut().zip(&plan.synthesized) {
                values.extend(tokens.iter().cloned());
            }
        }
        let resolver =
            StateResolver::new(dimensions).map_err(|source| BuildError::InvalidDimensions {
                item: item.clone(),
                source,
            })?;

        let mut graph = FsmGraph::new();
        for state in resolver.states() {
            graph.add_state(state.clone());
        }

        let mut operations = Vec::with_capacity(plans.len());
        for plan in plans {
            let operation = Arc::new(Operation::new(
                plan.code,
                item.clone(),
                plan.kind,
                plan.table,
                modifier.clone(),
            ));
            for entry in operation.table().entries() {
                graph.register(
                    entry.from.clone(),
                    entry.trigger,
                    entry.to.clone(),
                    operation.code(),
                    operation.clone(),
                );
            }
            operations.push(operation);
        }

        for registration in handlers {
            register_handler(&mut graph, &resolver, &input_ids, registration, &mut diagnostics);
        }

        debug!(
            item = %item,
            states = graph.len(),
            edges = graph.edge_count(),
            operations = operations.len(),
            diagnostics = diagnostics.len(),
            "built item state machine"
        );

        Ok(ItemFsm {
            item,
            fsm_id: definition.fsm_id,
            initial,
            resolver,
            graph,
            inputs,
            input_ids,
            operations,
            diagnostics: diagnostics.into_errors(),
        })
    }
}

fn register_handler(
    graph: &mut FsmGraph,
    resolver: &StateResolver,
    input_ids: &HashMap<String, InputId>,
    registration: HandlerRegistration,
    diagnostics: &mut Diagnostics,
) {
    let HandlerRegistration {
        from,
        input,
        to,
        label,
        source,
    } = registration;

    let Some(&id) = input_ids.get(&input) else {
        diagnostics.report(DefinitionError::UnknownInput {
            operation: label,
            stage: "handler".to_string(),
            input,
        });
        return;
    };

    let parse = |pattern: &str| {
        State::parse(pattern).map_err(|source| DefinitionError::InvalidPattern {
            operation: label.clone(),
            pattern: pattern.to_string(),
            source,
        })
    };
    let mapping = parse(&from)
        .and_then(|from_pattern| Ok((from_pattern, parse(&to)?)))
        .and_then(|(from_pattern, to_pattern)| {
            resolver
                .resolve_transition(&from_pattern, &to_pattern)
                .map_err(|source| DefinitionError::Unresolvable {
                    rule: format!("{label}[{from}]"),
                    source,
                })
        });

    let mapping = match mapping {
        Ok(mapping) => mapping,
        Err(error) => {
            diagnostics.report(error);
            return;
        }
    };

    let handler: Arc<dyn Handler> = match source {
        HandlerSource::Predicate(guard) => Arc::new(PredicateHandler::new(guard, mapping.clone())),
        HandlerSource::Custom(handler) => handler,
    };

    for (tail, head) in mapping {
        graph.register(tail, Trigger::Input(id), head, label.as_str(), handler.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::definition::{
        InputDefinition, InputKind, OperationDefinition, OperationKind, StageDefinition,
        StateEntry, STAGE_INITIAL,
    };
    use crate::core::{PlayerId, SlotId};

    fn state(text: &str) -> State {
        text.parse().unwrap()
    }

    fn lamp() -> ItemDefinition {
        ItemDefinition::new("lamp", vec![vec!["off".into(), "on".into()]], "off")
            .input(InputDefinition::new("toggle", InputKind::KeyPress))
    }

    #[test]
    fn build_requires_dimensions() {
        let result = ItemFsmBuilder::new(ItemDefinition::new("void", Vec::new(), "x")).build();
        assert!(matches!(result, Err(BuildError::NoDimensions { .. })));
    }

    #[test]
    fn build_requires_declared_initial_state() {
        let mut item = lamp();
        item.initial = "dim".to_string();
        assert!(matches!(
            ItemFsmBuilder::new(item).build(),
            Err(BuildError::UnknownInitialState { .. })
        ));

        let mut item = lamp();
        item.initial = "a-".to_string();
        assert!(matches!(
            ItemFsmBuilder::new(item).build(),
            Err(BuildError::InvalidInitialState { .. })
        ));
    }

    #[test]
    fn synthesized_states_join_the_state_space() {
        let item = lamp().operation(
            OperationDefinition::new("warm_up", OperationKind::Delayed)
                .delay_ms(200)
                .state(StateEntry::staged("off").timeout("on").label("warming"))
                .stage(STAGE_INITIAL, StageDefinition::new().input("toggle")),
        );

        let fsm = ItemFsmBuilder::new(item).build().unwrap();

        assert!(fsm.resolver().contains(&state("warming_to_on_op.warm_up")));
        assert_eq!(fsm.resolver().states().len(), 3);
        assert!(fsm.graph().node(&state("warming_to_on_op.warm_up")).is_some());
    }

    #[test]
    fn operations_register_before_handlers() {
        let item = lamp().operation(
            OperationDefinition::new("switch_on", OperationKind::Instant)
                .state(StateEntry::instant("off", "on"))
                .stage(STAGE_INITIAL, StageDefinition::new().input("toggle")),
        );

        let fsm = ItemFsmBuilder::new(item)
            .handler("off", "toggle", "off", "stay_off", |_| true)
            .build()
            .unwrap();

        let off = state("off");
        let ctx = GuardContext::new(
            SlotId(0),
            PlayerId(0),
            &off,
            Trigger::Input(fsm.input_id("toggle").unwrap()),
        );
        let labels: Vec<String> = fsm.inspect(&ctx).into_iter().map(|i| i.label).collect();

        assert_eq!(labels, vec!["switch_on", "stay_off"]);
        assert_eq!(fsm.process(&ctx).state, state("on"));
    }

    #[test]
    fn invalid_content_is_reported_not_fatal() {
        let item = lamp()
            .input(InputDefinition::new("toggle", InputKind::KeyRelease))
            .operation(OperationDefinition::new("broken", OperationKind::Delayed))
            .operation(
                OperationDefinition::new("switch_on", OperationKind::Instant)
                    .state(StateEntry::instant("off", "on"))
                    .stage(STAGE_INITIAL, StageDefinition::new().input("toggle")),
            );

        let fsm = ItemFsmBuilder::new(item)
            .handler("on", "missing", "off", "switch_off", |_| true)
            .build()
            .unwrap();

        assert!(fsm
            .diagnostics()
            .iter()
            .any(|e| matches!(e, DefinitionError::DuplicateInput { .. })));
        assert!(fsm
            .diagnostics()
            .iter()
            .any(|e| matches!(e, DefinitionError::MissingDelay { .. })));
        assert!(fsm
            .diagnostics()
            .iter()
            .any(|e| matches!(e, DefinitionError::UnknownInput { .. })));

        assert_eq!(fsm.operations().len(), 1);
        assert_eq!(fsm.inputs().len(), 1);
        assert_eq!(fsm.graph().edge_count(), 1);
    }

    #[test]
    fn inputs_are_grouped_by_kind() {
        let item = lamp()
            .input(InputDefinition::new("slot", InputKind::SlotChanged))
            .input(InputDefinition::new("swap", InputKind::SlotChanged));
        let fsm = ItemFsmBuilder::new(item).build().unwrap();

        let ids: Vec<InputId> = fsm.inputs_of_kind(InputKind::SlotChanged).collect();
        assert_eq!(ids, vec![InputId(1), InputId(2)]);
        assert_eq!(fsm.input_code(InputId(2)), Some("swap"));
    }
}
