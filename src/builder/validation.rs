//! Bind-time checks of item content.
//!
//! Checks accumulate every problem they find with [`Validation`] instead of
//! stopping at the first one, so content authors see all of them in one
//! pass. Failures never abort a build: [`Diagnostics`] logs each error and
//! the caller drops whatever the error refers to.

use crate::builder::definition::{
    InputDefinition, OperationDefinition, OperationKind, StateEntry, STAGE_CONTINUE,
    STAGE_INITIAL, STAGE_TIMEOUT,
};
use crate::builder::error::DefinitionError;
use crate::core::{SEPARATOR, WILDCARD};
use std::collections::HashSet;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use tracing::warn;

pub type Check = Validation<(), NonEmptyVec<DefinitionError>>;

fn check(passed: bool, error: impl FnOnce() -> DefinitionError) -> Check {
    if passed {
        Validation::success(())
    } else {
        Validation::fail(error())
    }
}

/// Operation codes and labels end up inside state tokens.
pub fn check_code(code: &str) -> Check {
    check(
        !code.is_empty() && !code.contains(SEPARATOR) && !code.contains(WILDCARD),
        || DefinitionError::InvalidCode {
            code: code.to_string(),
        },
    )
}

/// Code and uniqueness of one input among the inputs accepted so far.
/// Input codes never appear in states and may contain separators.
pub fn check_input(input: &InputDefinition, seen: &HashSet<String>) -> Check {
    Validation::all_vec(vec![
        check(!input.code.is_empty(), || DefinitionError::InvalidCode {
            code: input.code.clone(),
        }),
        check(!seen.contains(&input.code), || DefinitionError::DuplicateInput {
            input: input.code.clone(),
        }),
    ])
    .map(|_| ())
}

/// Structural requirements of an operation and its flavor.
///
/// An operation failing any of these is dropped as a whole.
pub fn check_operation(op: &OperationDefinition, seen: &HashSet<String>) -> Check {
    let code = &op.code;
    let has_finals = op.final_stages().next().is_some();

    let mut checks = vec![
        check_code(code),
        check(!seen.contains(code), || DefinitionError::DuplicateOperation {
            operation: code.clone(),
        }),
        check(op.stages.contains_key(STAGE_INITIAL), || {
            DefinitionError::MissingStage {
                operation: code.clone(),
                stage: STAGE_INITIAL.to_string(),
            }
        }),
        check(
            op.kind == OperationKind::Continuous || !op.stages.contains_key(STAGE_CONTINUE),
            || DefinitionError::UnexpectedStage {
                operation: code.clone(),
                stage: STAGE_CONTINUE.to_string(),
                kind: op.kind,
            },
        ),
    ];

    match op.kind {
        OperationKind::Instant => {
            checks.extend(
                op.stages
                    .keys()
                    .filter(|stage| stage.as_str() != STAGE_INITIAL)
                    .map(|stage| {
                        Validation::fail(DefinitionError::UnexpectedStage {
                            operation: code.clone(),
                            stage: stage.clone(),
                            kind: op.kind,
                        })
                    }),
            );
        }
        OperationKind::Delayed | OperationKind::Continuous => {
            checks.push(check(op.delay_ms.is_some(), || {
                DefinitionError::MissingDelay {
                    operation: code.clone(),
                }
            }));
        }
        OperationKind::Branched => {
            checks.push(check(has_finals, || DefinitionError::MissingStage {
                operation: code.clone(),
                stage: "final".to_string(),
            }));
        }
    }

    Validation::all_vec(checks).map(|_| ())
}

/// Requirements of one state entry of an operation.
///
/// An entry failing any of these is dropped; the rest of the operation is
/// kept.
pub fn check_entry(op: &OperationDefinition, entry: &StateEntry) -> Check {
    let missing = |field: &'static str| DefinitionError::MissingTarget {
        operation: op.code.clone(),
        initial: entry.initial.clone(),
        field,
    };

    let mut checks = Vec::new();
    match op.kind {
        OperationKind::Instant => {
            checks.push(check(entry.target.is_some(), || missing("target")));
        }
        OperationKind::Delayed | OperationKind::Continuous => {
            checks.push(check(entry.timeout.is_some(), || missing(STAGE_TIMEOUT)));
        }
        OperationKind::Branched => {
            checks.push(check(
                entry.timeout.is_some() || !entry.finals.is_empty(),
                || missing("final"),
            ));
            // A timeout destination is only reachable through the timer.
            checks.push(check(entry.timeout.is_none() || op.delay_ms.is_some(), || {
                DefinitionError::MissingDelay {
                    operation: op.code.clone(),
                }
            }));
        }
    }

    checks.extend(entry.finals.keys().map(|stage| {
        check(
            op.final_stages().any(|(name, _)| name == stage),
            || DefinitionError::UnknownStage {
                operation: op.code.clone(),
                stage: stage.clone(),
            },
        )
    }));

    if let Some(label) = &entry.label {
        checks.push(check_code(label));
    }

    Validation::all_vec(checks).map(|_| ())
}

/// Collects and logs content errors of one item.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    item: String,
    errors: Vec<DefinitionError>,
}

impl Diagnostics {
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            errors: Vec::new(),
        }
    }

    pub fn report(&mut self, error: DefinitionError) {
        warn!(item = %self.item, error = %error, "dropping invalid definition");
        self.errors.push(error);
    }

    /// Report every failure of `validation`; returns whether it passed.
    pub fn absorb(&mut self, validation: Check) -> bool {
        match validation {
            Validation::Success(_) => true,
            Validation::Failure(errors) => {
                for error in errors.iter().cloned() {
                    self.report(error);
                }
                false
            }
        }
    }

    pub fn errors(&self) -> &[DefinitionError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<DefinitionError> {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::definition::{InputKind, StageDefinition};

    fn failures(validation: Check) -> Vec<DefinitionError> {
        match validation {
            Validation::Success(_) => Vec::new(),
            Validation::Failure(errors) => errors.iter().cloned().collect(),
        }
    }

    #[test]
    fn codes_reject_separator_and_wildcard() {
        assert!(check_code("start_reload").is_success());
        assert!(check_code("start-reload").is_failure());
        assert!(check_code("*").is_failure());
        assert!(check_code("").is_failure());
    }

    #[test]
    fn duplicate_inputs_are_reported() {
        let mut seen = HashSet::new();
        seen.insert("fire".to_string());

        let errors = failures(check_input(
            &InputDefinition::new("fire", InputKind::KeyPress),
            &seen,
        ));
        assert_eq!(
            errors,
            vec![DefinitionError::DuplicateInput {
                input: "fire".to_string()
            }]
        );
    }

    #[test]
    fn operation_checks_accumulate_all_errors() {
        let op = OperationDefinition::new("bad-code", OperationKind::Delayed)
            .stage(STAGE_CONTINUE, StageDefinition::new());

        let errors = failures(check_operation(&op, &HashSet::new()));

        assert_eq!(errors.len(), 4);
        assert!(errors
            .iter()
            .any(|e| matches!(e, DefinitionError::InvalidCode { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, DefinitionError::MissingStage { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, DefinitionError::UnexpectedStage { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, DefinitionError::MissingDelay { .. })));
    }

    #[test]
    fn instant_operations_only_declare_initial() {
        let op = OperationDefinition::new("toggle", OperationKind::Instant)
            .stage(STAGE_INITIAL, StageDefinition::new())
            .stage("finish", StageDefinition::new());

        let errors = failures(check_operation(&op, &HashSet::new()));
        assert!(matches!(
            errors.as_slice(),
            [DefinitionError::UnexpectedStage { stage, .. }] if stage == "finish"
        ));
    }

    #[test]
    fn branched_operation_needs_a_final_stage() {
        let op = OperationDefinition::new("aim", OperationKind::Branched)
            .stage(STAGE_INITIAL, StageDefinition::new());
        assert!(check_operation(&op, &HashSet::new()).is_failure());

        let op = op.stage("release", StageDefinition::new());
        assert!(check_operation(&op, &HashSet::new()).is_success());
    }

    #[test]
    fn entries_need_flavor_destinations_and_known_stages() {
        let op = OperationDefinition::new("aim", OperationKind::Branched)
            .stage(STAGE_INITIAL, StageDefinition::new())
            .stage("release", StageDefinition::new());

        assert!(check_entry(&op, &StateEntry::staged("idle")).is_failure());
        assert!(check_entry(&op, &StateEntry::staged("idle").finish("release", "idle")).is_success());

        let errors = failures(check_entry(
            &op,
            &StateEntry::staged("idle").finish("throw", "idle"),
        ));
        assert!(matches!(
            errors.as_slice(),
            [DefinitionError::UnknownStage { stage, .. }] if stage == "throw"
        ));
    }

    #[test]
    fn branched_timeout_needs_a_delay() {
        let op = OperationDefinition::new("reload", OperationKind::Branched)
            .stage(STAGE_INITIAL, StageDefinition::new())
            .stage("cancel", StageDefinition::new());
        let entry = StateEntry::staged("idle")
            .timeout("idle")
            .finish("cancel", "idle");

        let errors = failures(check_entry(&op, &entry));
        assert_eq!(
            errors,
            vec![DefinitionError::MissingDelay {
                operation: "reload".to_string()
            }]
        );

        assert!(check_entry(&op.clone().delay_ms(1000), &entry).is_success());
        assert!(check_entry(&op, &StateEntry::staged("idle").finish("cancel", "idle")).is_success());
    }

    #[test]
    fn diagnostics_keep_every_failure() {
        let mut diagnostics = Diagnostics::new("crossbow");
        assert!(diagnostics.absorb(check_code("ok")));
        assert!(!diagnostics.absorb(check_code("not-ok")));
        assert_eq!(diagnostics.len(), 1);
    }
}
