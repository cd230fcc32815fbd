//! Expands an operation definition into its concrete transition table.
//!
//! Staged operations pass through an intermediate state per start state.
//! Its tokens are synthesized from the start state, the timeout
//! destination and the operation code, so intermediate states of different
//! operations never collide. The synthesized tokens are returned with the
//! plan and must be added to the dimension values before the final state
//! space is built.

use crate::builder::definition::{
    OperationDefinition, OperationKind, StageDefinition, StateEntry, Target, STAGE_CONTINUE,
    STAGE_INITIAL, STAGE_TIMEOUT,
};
use crate::builder::error::DefinitionError;
use crate::builder::validation::{check_entry, Diagnostics};
use crate::core::{
    InputId, Outcome, State, StateError, StateResolver, TimeoutDirective, TransitionMap, Trigger,
    WILDCARD,
};
use crate::effects::{BoundRequest, SystemRegistry, TransitionEntry, TransitionTable};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::debug;

/// Item-level names an operation may refer to.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub item: &'a str,
    pub inputs: &'a HashMap<String, InputId>,
    pub systems: &'a SystemRegistry,
}

/// Transition table of one operation plus the tokens it synthesized.
#[derive(Debug, Clone)]
pub struct OperationPlan {
    pub code: String,
    pub kind: OperationKind,
    pub table: TransitionTable,
    /// New values per dimension, introduced by intermediate states
    pub synthesized: Vec<BTreeSet<String>>,
}

#[derive(Debug, Clone, Default)]
struct BoundStage {
    triggers: Vec<Trigger>,
    requests: Vec<BoundRequest>,
}

/// Rules contributed by one state entry, keyed by stage.
#[derive(Debug, Default)]
struct EntryRules {
    batches: BTreeMap<String, TransitionMap>,
    timed: BTreeSet<State>,
    synthesized: Vec<(usize, String)>,
}

/// Intermediate state of an operation started in `start`.
///
/// Dimensions where `start` and `tail` differ get a synthesized token; when
/// none differ, the last dimension the start pattern fixes (or the last
/// dimension) does. The token is `{lead}_to_{tail}_op.{code}`, where `lead`
/// is the start token, or the label when one is given. A label on a
/// wildcard dimension keeps the start token as `{label}.{start}`.
///
/// Returns the state and the `(dimension, token)` pairs it introduced.
pub fn intermediate_state(
    start: &State,
    tail: &State,
    pattern: &State,
    label: Option<&str>,
    code: &str,
) -> Result<(State, Vec<(usize, String)>), StateError> {
    let from: Vec<&str> = start.tokens().collect();
    let to: Vec<&str> = tail.tokens().collect();
    let fixed: Vec<bool> = pattern.tokens().map(|token| token != WILDCARD).collect();

    if from.len() != to.len() || from.len() != fixed.len() {
        return Err(StateError::DimensionMismatch {
            expected: from.len(),
            found: if from.len() != to.len() { to.len() } else { fixed.len() },
        });
    }

    let mut changed: Vec<usize> = (0..from.len()).filter(|&d| from[d] != to[d]).collect();
    if changed.is_empty() {
        let fallback = (0..from.len())
            .rev()
            .find(|&d| fixed[d])
            .unwrap_or(from.len().saturating_sub(1));
        changed.push(fallback);
    }

    let mut synthesized = Vec::with_capacity(changed.len());
    let tokens: Vec<String> = (0..from.len())
        .map(|d| {
            if !changed.contains(&d) {
                return from[d].to_string();
            }
            let lead = match label {
                Some(label) if fixed[d] => label.to_string(),
                Some(label) => format!("{label}.{}", from[d]),
                None => from[d].to_string(),
            };
            let token = format!("{lead}_to_{}_op.{code}", to[d]);
            synthesized.push((d, token.clone()));
            token
        })
        .collect();

    Ok((State::vector(tokens)?, synthesized))
}

/// Build the transition table of `op` against the declared state space.
///
/// The operation itself must have passed
/// [`check_operation`](crate::builder::validation::check_operation).
/// Dangling inputs and systems, invalid entries and entries conflicting
/// with earlier entries are reported to `diagnostics` and left out.
pub fn plan_operation(
    op: &OperationDefinition,
    resolver: &StateResolver,
    bindings: &Bindings<'_>,
    diagnostics: &mut Diagnostics,
) -> OperationPlan {
    let stages: BTreeMap<&str, BoundStage> = op
        .stages
        .iter()
        .map(|(name, stage)| (name.as_str(), bind_stage(op, name, stage, bindings, diagnostics)))
        .collect();

    let mut accepted: BTreeMap<String, Vec<(String, TransitionMap)>> = BTreeMap::new();
    let mut merged: BTreeMap<String, TransitionMap> = BTreeMap::new();
    let mut timed = BTreeSet::new();
    let mut synthesized = vec![BTreeSet::new(); resolver.dimension()];

    for entry in &op.states {
        if !diagnostics.absorb(check_entry(op, entry)) {
            continue;
        }

        let rule = format!("{}[{}]", op.code, entry.initial);
        let rules = match entry_rules(op, entry, resolver) {
            Ok(rules) => rules,
            Err(error) => {
                diagnostics.report(error);
                continue;
            }
        };

        let mut candidate = BTreeMap::new();
        let mut conflict = None;
        for (stage, batch) in &rules.batches {
            let mut batches = accepted.get(stage).cloned().unwrap_or_default();
            batches.push((rule.clone(), batch.clone()));
            match StateResolver::merge_transitions(batches) {
                Ok(map) => {
                    candidate.insert(stage.clone(), map);
                }
                Err(source) => {
                    conflict = Some(source);
                    break;
                }
            }
        }

        if let Some(source) = conflict {
            diagnostics.report(DefinitionError::Unresolvable { rule, source });
            continue;
        }

        for (stage, batch) in rules.batches {
            accepted.entry(stage).or_default().push((rule.clone(), batch));
        }
        merged.extend(candidate);
        timed.extend(rules.timed);
        for (dimension, token) in rules.synthesized {
            if let Some(values) = synthesized.get_mut(dimension) {
                values.insert(token);
            }
        }
    }

    let delay = op.delay_ms.map(Duration::from_millis);
    let mut table = TransitionTable::new();

    let finals: Vec<&str> = op.final_stages().map(|(name, _)| name).collect();
    let order = std::iter::once(STAGE_INITIAL)
        .chain(std::iter::once(STAGE_TIMEOUT))
        .chain(finals)
        .chain(std::iter::once(STAGE_CONTINUE));

    for stage_name in order {
        let Some(map) = merged.get(stage_name) else {
            continue;
        };
        let stage = stages.get(stage_name).cloned().unwrap_or_else(|| BoundStage {
            triggers: if stage_name == STAGE_TIMEOUT {
                vec![Trigger::Timeout]
            } else {
                Vec::new()
            },
            requests: Vec::new(),
        });

        for (from, to) in map {
            let (outcome, timeout) = stage_effect(op.kind, stage_name, timed.contains(from) && delay.is_some());
            for &trigger in &stage.triggers {
                let inserted = table.insert(TransitionEntry {
                    from: from.clone(),
                    trigger,
                    to: to.clone(),
                    stage: stage_name.to_string(),
                    requests: stage.requests.clone(),
                    outcome,
                    timeout,
                });
                if inserted.is_err() {
                    diagnostics.report(DefinitionError::DuplicateTransition {
                        operation: op.code.clone(),
                        from: from.clone(),
                        trigger,
                    });
                    continue;
                }
                if let (TimeoutDirective::Start, Some(delay)) = (timeout, delay) {
                    table.set_timer(from.clone(), trigger, delay);
                }
            }
        }
    }

    debug!(
        item = %bindings.item,
        operation = %op.code,
        kind = ?op.kind,
        transitions = table.len(),
        "planned operation"
    );

    OperationPlan {
        code: op.code.clone(),
        kind: op.kind,
        table,
        synthesized,
    }
}

fn stage_effect(kind: OperationKind, stage: &str, timed: bool) -> (Outcome, TimeoutDirective) {
    match (kind, stage) {
        _ if !kind.is_staged() => (Outcome::StartedAndFinished, TimeoutDirective::Ignore),
        (_, STAGE_INITIAL) if timed => (Outcome::Started, TimeoutDirective::Start),
        (_, STAGE_INITIAL) => (Outcome::Started, TimeoutDirective::Ignore),
        (_, STAGE_CONTINUE) => (Outcome::None, TimeoutDirective::Ignore),
        _ => (Outcome::Finished, TimeoutDirective::Stop),
    }
}

fn bind_stage(
    op: &OperationDefinition,
    name: &str,
    stage: &StageDefinition,
    bindings: &Bindings<'_>,
    diagnostics: &mut Diagnostics,
) -> BoundStage {
    // The timeout stage is driven by the timer only.
    let triggers = if name == STAGE_TIMEOUT {
        vec![Trigger::Timeout]
    } else {
        stage
            .inputs
            .iter()
            .filter_map(|input| match bindings.inputs.get(input) {
                Some(&id) => Some(Trigger::Input(id)),
                None => {
                    diagnostics.report(DefinitionError::UnknownInput {
                        operation: op.code.clone(),
                        stage: name.to_string(),
                        input: input.clone(),
                    });
                    None
                }
            })
            .collect()
    };

    let requests = stage
        .systems
        .iter()
        .filter_map(|request| match bindings.systems.get(&request.system) {
            Some(system) => Some(BoundRequest {
                system_code: request.system.clone(),
                system,
                payload: request.request.clone(),
            }),
            None => {
                diagnostics.report(DefinitionError::UnknownSystem {
                    operation: op.code.clone(),
                    stage: name.to_string(),
                    system: request.system.clone(),
                });
                None
            }
        })
        .collect();

    BoundStage { triggers, requests }
}

fn parse_pattern(op: &OperationDefinition, pattern: &str) -> Result<State, DefinitionError> {
    State::parse(pattern).map_err(|source| DefinitionError::InvalidPattern {
        operation: op.code.clone(),
        pattern: pattern.to_string(),
        source,
    })
}

fn resolve_target(
    op: &OperationDefinition,
    resolver: &StateResolver,
    from: &State,
    target: &Target,
    rule: &str,
) -> Result<TransitionMap, DefinitionError> {
    let patterns = target
        .patterns()
        .into_iter()
        .map(|pattern| parse_pattern(op, pattern))
        .collect::<Result<Vec<_>, _>>()?;

    resolver
        .resolve_transition_to_any(from, &patterns)
        .map_err(|source| DefinitionError::Unresolvable {
            rule: rule.to_string(),
            source,
        })
}

fn entry_rules(
    op: &OperationDefinition,
    entry: &StateEntry,
    resolver: &StateResolver,
) -> Result<EntryRules, DefinitionError> {
    let rule = format!("{}[{}]", op.code, entry.initial);
    let pattern = parse_pattern(op, &entry.initial)?;
    let unresolvable = |source| DefinitionError::Unresolvable {
        rule: rule.clone(),
        source,
    };

    let mut rules = EntryRules::default();

    if !op.kind.is_staged() {
        if let Some(target) = &entry.target {
            let map = resolve_target(op, resolver, &pattern, target, &rule)?;
            rules.batches.insert(STAGE_INITIAL.to_string(), map);
        }
        return Ok(rules);
    }

    let timeouts = match &entry.timeout {
        Some(target) => resolve_target(op, resolver, &pattern, target, &rule)?,
        None => TransitionMap::new(),
    };
    let finals = entry
        .finals
        .iter()
        .map(|(stage, target)| {
            resolve_target(op, resolver, &pattern, target, &rule).map(|map| (stage.clone(), map))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    for start in resolver.resolve_states(&pattern).map_err(unresolvable)? {
        let tail = timeouts.get(&start);
        let exits = tail.is_some() || finals.values().any(|map| map.contains_key(&start));
        if !exits {
            continue;
        }

        let (inter, tokens) = intermediate_state(
            &start,
            tail.unwrap_or(&start),
            &pattern,
            entry.label.as_deref(),
            &op.code,
        )
        .map_err(|source| DefinitionError::InvalidPattern {
            operation: op.code.clone(),
            pattern: entry.initial.clone(),
            source,
        })?;
        rules.synthesized.extend(tokens);

        if let Some(tail) = tail {
            rules.timed.insert(start.clone());
            rules
                .batches
                .entry(STAGE_TIMEOUT.to_string())
                .or_default()
                .insert(inter.clone(), tail.clone());
        }
        for (stage, map) in &finals {
            if let Some(destination) = map.get(&start) {
                rules
                    .batches
                    .entry(stage.clone())
                    .or_default()
                    .insert(inter.clone(), destination.clone());
            }
        }
        if op.kind == OperationKind::Continuous {
            rules
                .batches
                .entry(STAGE_CONTINUE.to_string())
                .or_default()
                .insert(inter.clone(), inter.clone());
        }
        rules
            .batches
            .entry(STAGE_INITIAL.to_string())
            .or_default()
            .insert(start, inter);
    }

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::definition::StageDefinition;
    use crate::core::{GuardContext, ResolveError};
    use crate::effects::{System, SystemError};
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct Allow;

    impl System for Allow {
        fn verify(&self, _ctx: &GuardContext<'_>, _request: &Value) -> Result<bool, SystemError> {
            Ok(true)
        }

        fn process(&self, _ctx: &GuardContext<'_>, _request: &Value) -> Result<bool, SystemError> {
            Ok(true)
        }
    }

    fn state(text: &str) -> State {
        text.parse().unwrap()
    }

    fn dims(values: &[&[&str]]) -> StateResolver {
        StateResolver::new(
            values
                .iter()
                .map(|dim| dim.iter().map(|v| v.to_string()).collect())
                .collect(),
        )
        .unwrap()
    }

    fn inputs(codes: &[&str]) -> HashMap<String, InputId> {
        codes
            .iter()
            .enumerate()
            .map(|(i, code)| (code.to_string(), InputId(i as u32)))
            .collect()
    }

    fn build_plan(op: &OperationDefinition, resolver: &StateResolver, codes: &[&str]) -> (OperationPlan, Diagnostics) {
        let inputs = inputs(codes);
        let systems = SystemRegistry::new().with("ammo", Arc::new(Allow));
        let bindings = Bindings {
            item: "test",
            inputs: &inputs,
            systems: &systems,
        };
        let mut diagnostics = Diagnostics::new("test");
        let plan = plan_operation(op, resolver, &bindings, &mut diagnostics);
        (plan, diagnostics)
    }

    #[test]
    fn intermediate_uses_label_when_nothing_changes() {
        let (inter, tokens) =
            intermediate_state(&state("idle"), &state("idle"), &state("idle"), Some("reloading"), "reload")
                .unwrap();

        assert_eq!(inter, state("reloading_to_idle_op.reload"));
        assert_eq!(tokens, vec![(0, "reloading_to_idle_op.reload".to_string())]);
    }

    #[test]
    fn intermediate_synthesizes_changed_dimensions_only() {
        let (inter, _) = intermediate_state(
            &state("idle-empty"),
            &state("idle-loaded"),
            &state("*-empty"),
            None,
            "load",
        )
        .unwrap();
        assert_eq!(inter, state("idle-empty_to_loaded_op.load"));

        let (labelled, _) = intermediate_state(
            &state("idle-empty"),
            &state("idle-loaded"),
            &state("*-empty"),
            Some("reload"),
            "load",
        )
        .unwrap();
        assert_eq!(labelled, state("idle-reload_to_loaded_op.load"));
    }

    #[test]
    fn labelled_wildcard_dimension_keeps_start_token() {
        let (inter, _) =
            intermediate_state(&state("idle"), &state("idle"), &state("*"), Some("swing"), "attack")
                .unwrap();
        assert_eq!(inter, state("swing.idle_to_idle_op.attack"));
    }

    #[test]
    fn delayed_operation_starts_and_times_out() {
        let resolver = dims(&[&["idle", "ready"], &["empty", "loaded"]]);
        let op = OperationDefinition::new("load", OperationKind::Delayed)
            .delay_ms(750)
            .state(StateEntry::staged("*-empty").timeout("*-loaded"))
            .stage(
                STAGE_INITIAL,
                StageDefinition::new().input("load").system("ammo", json!({})),
            );

        let (plan, diagnostics) = build_plan(&op, &resolver, &["load"]);
        assert!(diagnostics.is_empty());

        let load = Trigger::Input(InputId(0));
        let start = plan.table.get(&state("ready-empty"), load).unwrap();
        assert_eq!(start.to, state("ready-empty_to_loaded_op.load"));
        assert_eq!(start.outcome, Outcome::Started);
        assert_eq!(start.timeout, TimeoutDirective::Start);
        assert_eq!(start.requests.len(), 1);
        assert_eq!(
            plan.table.timer(&state("ready-empty"), load),
            Some(Duration::from_millis(750))
        );

        let finish = plan
            .table
            .get(&state("ready-empty_to_loaded_op.load"), Trigger::Timeout)
            .unwrap();
        assert_eq!(finish.to, state("ready-loaded"));
        assert_eq!(finish.outcome, Outcome::Finished);
        assert_eq!(finish.timeout, TimeoutDirective::Stop);

        assert_eq!(plan.table.len(), 4);
        assert!(plan.synthesized[1].contains("empty_to_loaded_op.load"));
        assert!(plan.synthesized[0].is_empty());
    }

    #[test]
    fn instant_operation_maps_directly() {
        let resolver = dims(&[&["sheathed", "drawn"]]);
        let op = OperationDefinition::new("draw", OperationKind::Instant)
            .state(StateEntry::instant("sheathed", "drawn"))
            .stage(STAGE_INITIAL, StageDefinition::new().input("draw"));

        let (plan, _) = build_plan(&op, &resolver, &["draw"]);
        let entry = plan.table.get(&state("sheathed"), Trigger::Input(InputId(0))).unwrap();

        assert_eq!(entry.to, state("drawn"));
        assert_eq!(entry.outcome, Outcome::StartedAndFinished);
        assert_eq!(entry.timeout, TimeoutDirective::Ignore);
        assert!(plan.synthesized.iter().all(BTreeSet::is_empty));
    }

    #[test]
    fn continuous_operation_loops_on_continue_inputs() {
        let resolver = dims(&[&["idle"]]);
        let op = OperationDefinition::new("swing", OperationKind::Continuous)
            .delay_ms(300)
            .state(StateEntry::staged("idle").timeout("idle").label("swinging"))
            .stage(STAGE_INITIAL, StageDefinition::new().input("attack"))
            .stage(STAGE_CONTINUE, StageDefinition::new().input("attack"));

        let (plan, _) = build_plan(&op, &resolver, &["attack"]);
        let inter = state("swinging_to_idle_op.swing");
        let again = plan.table.get(&inter, Trigger::Input(InputId(0))).unwrap();

        assert_eq!(again.to, inter);
        assert_eq!(again.outcome, Outcome::None);
        assert_eq!(again.timeout, TimeoutDirective::Ignore);
    }

    #[test]
    fn branched_operation_without_delay_waits_for_final_input() {
        let resolver = dims(&[&["idle", "fired"]]);
        let op = OperationDefinition::new("aim", OperationKind::Branched)
            .state(
                StateEntry::staged("idle")
                    .finish("release", "fired")
                    .finish("cancel", "idle")
                    .label("aiming"),
            )
            .stage(STAGE_INITIAL, StageDefinition::new().input("aim"))
            .stage("release", StageDefinition::new().input("release"))
            .stage("cancel", StageDefinition::new().input("cancel"));

        let (plan, diagnostics) = build_plan(&op, &resolver, &["aim", "release", "cancel"]);
        assert!(diagnostics.is_empty());

        let start = plan.table.get(&state("idle"), Trigger::Input(InputId(0))).unwrap();
        assert_eq!(start.timeout, TimeoutDirective::Ignore);

        let inter = start.to.clone();
        assert_eq!(inter, state("aiming_to_idle_op.aim"));
        assert_eq!(
            plan.table.get(&inter, Trigger::Input(InputId(1))).unwrap().to,
            state("fired")
        );
        assert_eq!(
            plan.table.get(&inter, Trigger::Input(InputId(2))).unwrap().to,
            state("idle")
        );
        assert!(plan.table.get(&inter, Trigger::Timeout).is_none());
    }

    #[test]
    fn dangling_references_drop_only_themselves() {
        let resolver = dims(&[&["sheathed", "drawn"]]);
        let op = OperationDefinition::new("draw", OperationKind::Instant)
            .state(StateEntry::instant("sheathed", "drawn"))
            .stage(
                STAGE_INITIAL,
                StageDefinition::new()
                    .input("draw")
                    .input("unknown")
                    .system("ammo", json!({}))
                    .system("sound", json!("draw.ogg")),
            );

        let (plan, diagnostics) = build_plan(&op, &resolver, &["draw"]);

        assert_eq!(diagnostics.len(), 2);
        assert!(matches!(diagnostics.errors()[0], DefinitionError::UnknownInput { .. }));
        assert!(matches!(diagnostics.errors()[1], DefinitionError::UnknownSystem { .. }));

        let entry = plan.table.get(&state("sheathed"), Trigger::Input(InputId(0))).unwrap();
        assert_eq!(entry.requests.len(), 1);
        assert_eq!(plan.table.len(), 1);
    }

    #[test]
    fn conflicting_entry_is_dropped() {
        let resolver = dims(&[&["a", "b", "c"]]);
        let op = OperationDefinition::new("flip", OperationKind::Instant)
            .state(StateEntry::instant("a", "b"))
            .state(StateEntry::instant("*", "c"))
            .stage(STAGE_INITIAL, StageDefinition::new().input("flip"));

        let (plan, diagnostics) = build_plan(&op, &resolver, &["flip"]);

        assert!(matches!(
            diagnostics.errors(),
            [DefinitionError::Unresolvable {
                source: ResolveError::ConflictingTransition { .. },
                ..
            }]
        ));
        assert_eq!(plan.table.len(), 1);
        assert_eq!(
            plan.table.get(&state("a"), Trigger::Input(InputId(0))).unwrap().to,
            state("b")
        );
    }

    #[test]
    fn ambiguous_alternatives_are_rejected() {
        let resolver = dims(&[&["idle", "busy"], &["x", "y"]]);
        let op = OperationDefinition::new("go", OperationKind::Instant)
            .state(StateEntry::instant("idle-*", vec!["busy-*", "*-y"]))
            .stage(STAGE_INITIAL, StageDefinition::new().input("go"));

        let (plan, diagnostics) = build_plan(&op, &resolver, &["go"]);

        assert!(matches!(
            diagnostics.errors(),
            [DefinitionError::Unresolvable {
                source: ResolveError::AmbiguousTransition { .. },
                ..
            }]
        ));
        assert!(plan.table.is_empty());
    }

    #[test]
    fn shared_input_keeps_first_stage_rule() {
        let resolver = dims(&[&["idle"]]);
        let op = OperationDefinition::new("spin", OperationKind::Continuous)
            .delay_ms(100)
            .state(StateEntry::staged("idle").timeout("idle").finish("stop", "idle"))
            .stage(STAGE_INITIAL, StageDefinition::new().input("spin"))
            .stage("stop", StageDefinition::new().input("spin"))
            .stage(STAGE_CONTINUE, StageDefinition::new().input("spin"));

        let (plan, diagnostics) = build_plan(&op, &resolver, &["spin"]);

        assert!(matches!(
            diagnostics.errors(),
            [DefinitionError::DuplicateTransition { .. }]
        ));
        let inter = state("idle_to_idle_op.spin");
        assert_eq!(
            plan.table.get(&inter, Trigger::Input(InputId(0))).unwrap().stage,
            "stop"
        );
    }

    #[test]
    fn invalid_pattern_drops_entry() {
        let resolver = dims(&[&["idle"]]);
        let op = OperationDefinition::new("draw", OperationKind::Instant)
            .state(StateEntry::instant("", "idle"))
            .stage(STAGE_INITIAL, StageDefinition::new().input("draw"));

        let (plan, diagnostics) = build_plan(&op, &resolver, &["draw"]);
        assert!(matches!(
            diagnostics.errors(),
            [DefinitionError::InvalidPattern { .. }]
        ));
        assert!(plan.table.is_empty());
    }
}
