//! Declarative item definitions, loadable from JSON.
//!
//! An item declares its state dimensions, its initial state, the inputs
//! players can send and the operations those inputs drive. The fluent
//! helpers build the same structures from code.

use crate::builder::error::BuildError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Stage whose inputs start an operation.
pub const STAGE_INITIAL: &str = "initial";
/// Stage run when the operation timer fires.
pub const STAGE_TIMEOUT: &str = "timeout";
/// Stage whose inputs are consumed without leaving the intermediate state.
pub const STAGE_CONTINUE: &str = "continue";

/// Whether `stage` is one of the stage names with fixed meaning.
pub fn is_reserved_stage(stage: &str) -> bool {
    matches!(stage, STAGE_INITIAL | STAGE_TIMEOUT | STAGE_CONTINUE)
}

fn default_fsm_id() -> String {
    "main".to_string()
}

/// Complete state machine definition of one item.
///
/// # Example
///
/// ```rust
/// use toolstate::builder::ItemDefinition;
///
/// let item = ItemDefinition::from_json(r#"{
///     "code": "bow",
///     "dimensions": [["idle", "drawn"]],
///     "initial": "idle",
///     "inputs": [{ "code": "draw" }]
/// }"#).unwrap();
///
/// assert_eq!(item.fsm_id, "main");
/// assert_eq!(item.inputs[0].code, "draw");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub code: String,
    /// Instance id; namespaces the persisted state attribute
    #[serde(default = "default_fsm_id")]
    pub fsm_id: String,
    /// Allowed values of every state dimension
    pub dimensions: Vec<Vec<String>>,
    pub initial: String,
    #[serde(default)]
    pub inputs: Vec<InputDefinition>,
    #[serde(default)]
    pub operations: Vec<OperationDefinition>,
}

impl ItemDefinition {
    pub fn new(code: impl Into<String>, dimensions: Vec<Vec<String>>, initial: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            fsm_id: default_fsm_id(),
            dimensions,
            initial: initial.into(),
            inputs: Vec::new(),
            operations: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn fsm_id(mut self, fsm_id: impl Into<String>) -> Self {
        self.fsm_id = fsm_id.into();
        self
    }

    pub fn input(mut self, input: InputDefinition) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn operation(mut self, operation: OperationDefinition) -> Self {
        self.operations.push(operation);
        self
    }
}

/// Host event class an input is bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    #[default]
    KeyPress,
    KeyRelease,
    KeyHold,
    MouseHold,
    /// Raised by the host when the content of a slot changes
    SlotChanged,
    /// Raised by the host when a player status changes
    StatusChanged,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDefinition {
    pub code: String,
    #[serde(default)]
    pub kind: InputKind,
}

impl InputDefinition {
    pub fn new(code: impl Into<String>, kind: InputKind) -> Self {
        Self {
            code: code.into(),
            kind,
        }
    }
}

/// Flavor of an operation; decides which stages it may declare and which
/// transitions it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// `initial -> target` in one step
    Instant,
    /// Start, wait for the timer, finish
    Delayed,
    /// Start, then finish on one of several final inputs
    Branched,
    /// Like delayed, consuming `continue` inputs while in progress
    Continuous,
}

impl OperationKind {
    /// Whether the operation passes through an intermediate state.
    pub fn is_staged(self) -> bool {
        !matches!(self, Self::Instant)
    }
}

/// Destination of a stage: one pattern or a list of alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    One(String),
    Any(Vec<String>),
}

impl Target {
    pub fn patterns(&self) -> Vec<&str> {
        match self {
            Self::One(pattern) => vec![pattern.as_str()],
            Self::Any(patterns) => patterns.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for Target {
    fn from(pattern: &str) -> Self {
        Self::One(pattern.to_string())
    }
}

impl From<Vec<&str>> for Target {
    fn from(patterns: Vec<&str>) -> Self {
        Self::Any(patterns.into_iter().map(str::to_string).collect())
    }
}

/// One group of states an operation acts on.
///
/// `initial` is the start pattern. Instant operations move to `target`;
/// staged operations move to an intermediate state and from there to
/// `timeout` when the timer fires, or to `finals[stage]` when an input of
/// that final stage arrives. `label` names the intermediate state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub initial: String,
    #[serde(default)]
    pub target: Option<Target>,
    #[serde(default)]
    pub timeout: Option<Target>,
    #[serde(default)]
    pub finals: BTreeMap<String, Target>,
    #[serde(default)]
    pub label: Option<String>,
}

impl StateEntry {
    pub fn instant(initial: impl Into<String>, target: impl Into<Target>) -> Self {
        Self {
            initial: initial.into(),
            target: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn staged(initial: impl Into<String>) -> Self {
        Self {
            initial: initial.into(),
            ..Self::default()
        }
    }

    pub fn timeout(mut self, target: impl Into<Target>) -> Self {
        self.timeout = Some(target.into());
        self
    }

    pub fn finish(mut self, stage: impl Into<String>, target: impl Into<Target>) -> Self {
        self.finals.insert(stage.into(), target.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A system call made when a stage's transition is taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemRequest {
    pub system: String,
    #[serde(default)]
    pub request: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub systems: Vec<SystemRequest>,
}

impl StageDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, code: impl Into<String>) -> Self {
        self.inputs.push(code.into());
        self
    }

    pub fn system(mut self, system: impl Into<String>, request: Value) -> Self {
        self.systems.push(SystemRequest {
            system: system.into(),
            request,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDefinition {
    pub code: String,
    pub kind: OperationKind,
    #[serde(default)]
    pub states: Vec<StateEntry>,
    #[serde(default)]
    pub stages: BTreeMap<String, StageDefinition>,
    /// Raw timer delay started by the `initial` stage
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

impl OperationDefinition {
    pub fn new(code: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            code: code.into(),
            kind,
            states: Vec::new(),
            stages: BTreeMap::new(),
            delay_ms: None,
        }
    }

    pub fn state(mut self, entry: StateEntry) -> Self {
        self.states.push(entry);
        self
    }

    pub fn stage(mut self, name: impl Into<String>, stage: StageDefinition) -> Self {
        self.stages.insert(name.into(), stage);
        self
    }

    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    /// Declared stages other than `initial`, `timeout` and `continue`.
    pub fn final_stages(&self) -> impl Iterator<Item = (&str, &StageDefinition)> + '_ {
        self.stages
            .iter()
            .filter(|(name, _)| !is_reserved_stage(name))
            .map(|(name, stage)| (name.as_str(), stage))
    }
}
