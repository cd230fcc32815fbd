//! Errors raised while building an item state machine.

use crate::builder::definition::OperationKind;
use crate::core::{ResolveError, State, StateError, Trigger};
use thiserror::Error;

/// Problems that prevent an item state machine from being built at all.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Item '{item}' declares no state dimensions")]
    NoDimensions { item: String },

    #[error("Item '{item}' has invalid dimensions: {source}")]
    InvalidDimensions {
        item: String,
        #[source]
        source: ResolveError,
    },

    #[error("Initial state '{initial}' of item '{item}' is invalid: {source}")]
    InvalidInitialState {
        item: String,
        initial: String,
        #[source]
        source: StateError,
    },

    #[error("Initial state '{initial}' of item '{item}' is not a declared concrete state")]
    UnknownInitialState { item: String, initial: String },

    #[error("Failed to parse item definition: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Content errors. The offending input, request, entry or operation is
/// dropped and the build continues.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DefinitionError {
    #[error("Operation '{operation}' stage '{stage}' references unknown input '{input}'")]
    UnknownInput {
        operation: String,
        stage: String,
        input: String,
    },

    #[error("Operation '{operation}' stage '{stage}' references unknown system '{system}'")]
    UnknownSystem {
        operation: String,
        stage: String,
        system: String,
    },

    #[error("Operation '{operation}' targets undeclared stage '{stage}'")]
    UnknownStage { operation: String, stage: String },

    #[error("Operation '{operation}' has invalid state pattern '{pattern}': {source}")]
    InvalidPattern {
        operation: String,
        pattern: String,
        #[source]
        source: StateError,
    },

    #[error("Operation '{operation}' requires a '{stage}' stage")]
    MissingStage { operation: String, stage: String },

    #[error("Operation '{operation}' requires a delay")]
    MissingDelay { operation: String },

    #[error("Operation '{operation}' entry '{initial}' requires a '{field}' destination")]
    MissingTarget {
        operation: String,
        initial: String,
        field: &'static str,
    },

    #[error("Operation '{operation}' of kind {kind:?} cannot declare stage '{stage}'")]
    UnexpectedStage {
        operation: String,
        stage: String,
        kind: OperationKind,
    },

    #[error("Input '{input}' is declared more than once")]
    DuplicateInput { input: String },

    #[error("Operation '{operation}' is declared more than once")]
    DuplicateOperation { operation: String },

    #[error("Invalid code '{code}'")]
    InvalidCode { code: String },

    #[error("Rule '{rule}' cannot be resolved: {source}")]
    Unresolvable {
        rule: String,
        #[source]
        source: ResolveError,
    },

    #[error("Operation '{operation}' maps '{from}' on {trigger} twice; the first rule is kept")]
    DuplicateTransition {
        operation: String,
        from: State,
        trigger: Trigger,
    },
}
