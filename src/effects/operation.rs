//! Compiled operations: a transition table plus the verify/perform runtime.

use crate::builder::OperationKind;
use crate::core::{GuardContext, Outcome, PlayerId, State, TimeoutDirective, Trigger};
use crate::effects::system::BoundRequest;
use crate::effects::transition::{Handler, PerformResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Scales raw operation delays, e.g. by a player's speed stats.
pub trait DelayModifier: Send + Sync {
    fn scale(&self, player: PlayerId, operation: &str, delay: Duration) -> Duration;
}

/// Leaves delays as declared.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unscaled;

impl DelayModifier for Unscaled {
    fn scale(&self, _player: PlayerId, _operation: &str, delay: Duration) -> Duration {
        delay
    }
}

impl<F> DelayModifier for F
where
    F: Fn(PlayerId, &str, Duration) -> Duration + Send + Sync,
{
    fn scale(&self, player: PlayerId, operation: &str, delay: Duration) -> Duration {
        self(player, operation, delay)
    }
}

/// One concrete `(state, trigger) -> state` rule of an operation.
#[derive(Debug, Clone)]
pub struct TransitionEntry {
    pub from: State,
    pub trigger: Trigger,
    pub to: State,
    /// Stage that declared the rule (`initial`, `timeout`, `continue` or a final stage)
    pub stage: String,
    pub requests: Vec<BoundRequest>,
    pub outcome: Outcome,
    pub timeout: TimeoutDirective,
}

/// Flat transition list of an operation with lookup by `(state, trigger)`
/// and the timer durations of the triggers that start a timer.
#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    entries: Vec<TransitionEntry>,
    index: HashMap<State, HashMap<Trigger, usize>>,
    timers: HashMap<(State, Trigger), Duration>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule. Returns the already registered rule if `(from, trigger)`
    /// is taken; the table is left unchanged in that case.
    pub fn insert(&mut self, entry: TransitionEntry) -> Result<(), &TransitionEntry> {
        let slot = self.index.entry(entry.from.clone()).or_default();
        if let Some(&existing) = slot.get(&entry.trigger) {
            return Err(&self.entries[existing]);
        }
        slot.insert(entry.trigger, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn set_timer(&mut self, from: State, trigger: Trigger, delay: Duration) {
        self.timers.insert((from, trigger), delay);
    }

    pub fn get(&self, from: &State, trigger: Trigger) -> Option<&TransitionEntry> {
        let index = *self.index.get(from)?.get(&trigger)?;
        self.entries.get(index)
    }

    pub fn timer(&self, from: &State, trigger: Trigger) -> Option<Duration> {
        self.timers.get(&(from.clone(), trigger)).copied()
    }

    pub fn entries(&self) -> &[TransitionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A bound operation of one item.
pub struct Operation {
    code: String,
    item: String,
    kind: OperationKind,
    table: TransitionTable,
    modifier: Arc<dyn DelayModifier>,
}

impl Operation {
    pub fn new(
        code: impl Into<String>,
        item: impl Into<String>,
        kind: OperationKind,
        table: TransitionTable,
        modifier: Arc<dyn DelayModifier>,
    ) -> Self {
        Self {
            code: code.into(),
            item: item.into(),
            kind,
            table,
            modifier,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Dry-run every system of the entry. All must agree.
    fn requests_pass(&self, entry: &TransitionEntry, ctx: &GuardContext<'_>) -> bool {
        entry.requests.iter().all(|request| {
            match request.system.verify(ctx, &request.payload) {
                Ok(passed) => passed,
                Err(err) => {
                    error!(
                        operation = %self.code,
                        item = %self.item,
                        system = %request.system_code,
                        request = %request.payload,
                        slot = %ctx.slot,
                        error = %err,
                        "system verify failed"
                    );
                    false
                }
            }
        })
    }
}

impl Handler for Operation {
    fn verify(&self, ctx: &GuardContext<'_>) -> Outcome {
        match self.table.get(ctx.state, ctx.trigger) {
            Some(entry) if self.requests_pass(entry, ctx) => entry.outcome,
            _ => Outcome::Failed,
        }
    }

    fn perform(&self, ctx: &GuardContext<'_>) -> PerformResult {
        let Some(entry) = self.table.get(ctx.state, ctx.trigger) else {
            return PerformResult::declined(ctx.state);
        };

        if !self.requests_pass(entry, ctx) {
            return PerformResult::declined(ctx.state);
        }

        // Verify already admitted the stage, so the transition commits even
        // if a system backs out here.
        for request in &entry.requests {
            match request.system.process(ctx, &request.payload) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        operation = %self.code,
                        item = %self.item,
                        system = %request.system_code,
                        request = %request.payload,
                        slot = %ctx.slot,
                        "system declined after successful verify"
                    );
                }
                Err(err) => {
                    error!(
                        operation = %self.code,
                        item = %self.item,
                        system = %request.system_code,
                        request = %request.payload,
                        slot = %ctx.slot,
                        error = %err,
                        "system process failed"
                    );
                }
            }
        }

        let delay = match entry.timeout {
            TimeoutDirective::Start => self
                .table
                .timer(&entry.from, entry.trigger)
                .map(|raw| self.modifier.scale(ctx.player, &self.code, raw)),
            _ => None,
        };

        debug!(
            operation = %self.code,
            stage = %entry.stage,
            from = %entry.from,
            to = %entry.to,
            outcome = ?entry.outcome,
            "operation performed"
        );

        PerformResult {
            state: entry.to.clone(),
            outcome: entry.outcome,
            timeout: entry.timeout,
            delay,
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("code", &self.code)
            .field("item", &self.item)
            .field("kind", &self.kind)
            .field("transitions", &self.table.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InputId, SlotId};
    use crate::effects::system::{System, SystemError};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        allow: bool,
        fail: bool,
        processed: AtomicUsize,
    }

    impl Counter {
        fn new(allow: bool, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                allow,
                fail,
                processed: AtomicUsize::new(0),
            })
        }
    }

    impl System for Counter {
        fn verify(&self, _ctx: &GuardContext<'_>, _request: &Value) -> Result<bool, SystemError> {
            if self.fail {
                return Err(SystemError::Failed("boom".to_string()));
            }
            Ok(self.allow)
        }

        fn process(&self, _ctx: &GuardContext<'_>, _request: &Value) -> Result<bool, SystemError> {
            self.processed.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    fn state(text: &str) -> State {
        text.parse().unwrap()
    }

    /// Passes verify, then backs out when asked to apply.
    struct Reluctant {
        fail: bool,
    }

    impl System for Reluctant {
        fn verify(&self, _ctx: &GuardContext<'_>, _request: &Value) -> Result<bool, SystemError> {
            Ok(true)
        }

        fn process(&self, _ctx: &GuardContext<'_>, _request: &Value) -> Result<bool, SystemError> {
            if self.fail {
                return Err(SystemError::Failed("jammed".to_string()));
            }
            Ok(false)
        }
    }

    fn request(code: &str, system: Arc<dyn System>) -> BoundRequest {
        BoundRequest {
            system_code: code.to_string(),
            system,
            payload: json!({ "amount": 1 }),
        }
    }

    fn operation(system: Arc<Counter>) -> Operation {
        operation_with(vec![request("counter", system)])
    }

    fn operation_with(requests: Vec<BoundRequest>) -> Operation {
        let mut table = TransitionTable::new();
        let trigger = Trigger::Input(InputId(0));
        table
            .insert(TransitionEntry {
                from: state("idle"),
                trigger,
                to: state("busy"),
                stage: "initial".to_string(),
                requests,
                outcome: Outcome::Started,
                timeout: TimeoutDirective::Start,
            })
            .unwrap();
        table.set_timer(state("idle"), trigger, Duration::from_millis(500));

        Operation::new(
            "work",
            "hammer",
            OperationKind::Delayed,
            table,
            Arc::new(|_: PlayerId, _: &str, delay: Duration| delay * 2),
        )
    }

    #[test]
    fn verify_has_no_side_effects() {
        let counter = Counter::new(true, false);
        let op = operation(counter.clone());
        let idle = state("idle");
        let ctx = GuardContext::new(SlotId(0), PlayerId(0), &idle, Trigger::Input(InputId(0)));

        assert_eq!(op.verify(&ctx), Outcome::Started);
        assert_eq!(op.verify(&ctx), Outcome::Started);
        assert_eq!(counter.processed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn perform_processes_and_scales_delay() {
        let counter = Counter::new(true, false);
        let op = operation(counter.clone());
        let idle = state("idle");
        let ctx = GuardContext::new(SlotId(0), PlayerId(0), &idle, Trigger::Input(InputId(0)));

        let result = op.perform(&ctx);
        assert_eq!(result.state, state("busy"));
        assert_eq!(result.timeout, TimeoutDirective::Start);
        assert_eq!(result.delay, Some(Duration::from_millis(1000)));
        assert_eq!(counter.processed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn declining_system_fails_the_operation() {
        let counter = Counter::new(false, false);
        let op = operation(counter.clone());
        let idle = state("idle");
        let ctx = GuardContext::new(SlotId(0), PlayerId(0), &idle, Trigger::Input(InputId(0)));

        assert_eq!(op.verify(&ctx), Outcome::Failed);
        assert_eq!(op.perform(&ctx).outcome, Outcome::Failed);
        assert_eq!(counter.processed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn system_errors_count_as_declining() {
        let op = operation(Counter::new(true, true));
        let idle = state("idle");
        let ctx = GuardContext::new(SlotId(0), PlayerId(0), &idle, Trigger::Input(InputId(0)));

        assert_eq!(op.verify(&ctx), Outcome::Failed);
    }

    #[test]
    fn verified_stage_commits_when_a_system_backs_out() {
        for fail in [false, true] {
            let counter = Counter::new(true, false);
            let op = operation_with(vec![
                request("counter", counter.clone()),
                request("sound", Arc::new(Reluctant { fail })),
                request("tally", counter.clone()),
            ]);
            let idle = state("idle");
            let ctx = GuardContext::new(SlotId(0), PlayerId(0), &idle, Trigger::Input(InputId(0)));

            let result = op.perform(&ctx);
            assert_eq!(result.state, state("busy"));
            assert_eq!(result.outcome, Outcome::Started);
            assert_eq!(counter.processed.load(Ordering::SeqCst), 2);
        }
    }

    #[test]
    fn unknown_rule_is_declined() {
        let op = operation(Counter::new(true, false));
        let idle = state("idle");
        let ctx = GuardContext::new(SlotId(0), PlayerId(0), &idle, Trigger::Timeout);

        assert_eq!(op.verify(&ctx), Outcome::Failed);
        assert_eq!(op.perform(&ctx), PerformResult::declined(&idle));
    }

    #[test]
    fn table_rejects_duplicate_rules() {
        let mut table = TransitionTable::new();
        let entry = TransitionEntry {
            from: state("idle"),
            trigger: Trigger::Timeout,
            to: state("busy"),
            stage: "timeout".to_string(),
            requests: Vec::new(),
            outcome: Outcome::Finished,
            timeout: TimeoutDirective::Stop,
        };
        assert!(table.insert(entry.clone()).is_ok());

        let duplicate = TransitionEntry {
            to: state("other"),
            ..entry
        };
        assert_eq!(table.insert(duplicate).unwrap_err().to, state("busy"));
        assert_eq!(table.len(), 1);
    }
}
