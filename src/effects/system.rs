//! Contract for the pluggable systems operations call into.
//!
//! Sound, animation, damage, inventory requirements and the like live
//! outside this crate. Operations only see them through [`System`].

use crate::core::GuardContext;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure raised from inside a system. The engine treats it as the system
/// declining; it never aborts the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SystemError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("System failed: {0}")]
    Failed(String),
}

/// Effect-performing plugin.
///
/// `verify` is a dry run and must not have side effects: it can be called
/// several times per event and by inspection tooling. `process` applies the
/// request and reports whether it did. A `false` or an error from `process`
/// is logged, but the transition admitted by `verify` still commits.
pub trait System: Send + Sync {
    fn verify(&self, ctx: &GuardContext<'_>, request: &Value) -> Result<bool, SystemError>;

    fn process(&self, ctx: &GuardContext<'_>, request: &Value) -> Result<bool, SystemError>;
}

/// Systems available to an item, looked up by code at bind time.
#[derive(Clone, Default)]
pub struct SystemRegistry {
    systems: BTreeMap<String, Arc<dyn System>>,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system under `code`, replacing any previous one.
    pub fn with(mut self, code: impl Into<String>, system: Arc<dyn System>) -> Self {
        self.register(code, system);
        self
    }

    pub fn register(&mut self, code: impl Into<String>, system: Arc<dyn System>) {
        self.systems.insert(code.into(), system);
    }

    pub fn get(&self, code: &str) -> Option<Arc<dyn System>> {
        self.systems.get(code).cloned()
    }
}

impl fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemRegistry")
            .field("systems", &self.systems.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A system request resolved against the registry.
#[derive(Clone)]
pub struct BoundRequest {
    pub system_code: String,
    pub system: Arc<dyn System>,
    pub payload: Value,
}

impl fmt::Debug for BoundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundRequest")
            .field("system", &self.system_code)
            .field("payload", &self.payload)
            .finish()
    }
}
