use std::fmt;
use std::mem;
use std::time::Instant;

use tracing::{debug, warn};

use crate::audit::AuditLog;
use crate::outcome::{IntoStepOutcome, IntoUndoOutcome};
use crate::step::{Step, StepState};

/// Ordered list of setup steps with guaranteed reverse-order teardown.
///
/// Steps run in registration order. If one fails, every step that already
/// succeeded is undone in reverse (LIFO) order. Teardown also runs when the
/// sequencer is dropped, so a resource set up through it cannot leak on any
/// exit path from the owning scope.
///
/// Initialization errors never escape: `false`, `Err` and panics all collapse
/// into a `false` result from [`initialize`](Self::initialize). Teardown never
/// fails. Panics can only be contained when the binary unwinds; under
/// `panic = "abort"` a panicking action aborts the process.
///
/// Closures may borrow from the enclosing scope for `'a`, which makes the
/// borrowed state outlive the sequencer:
///
/// ```compile_fail
/// use std::cell::Cell;
/// use seqraii::Sequencer;
///
/// let mut setup = Sequencer::new();
/// {
///     let closed = Cell::new(false);
///     setup.add_step_with_undo(|| true, || closed.set(true));
/// }
/// setup.initialize();
/// ```
#[derive(Default)]
pub struct Sequencer<'a> {
    steps: Vec<Step<'a>>,
}

impl<'a> Sequencer<'a> {
    /// Create an empty sequencer.
    #[must_use]
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step whose undo action is a no-op.
    pub fn add_step<I, R>(&mut self, init: I)
    where
        I: FnMut() -> R + 'a,
        R: IntoStepOutcome,
    {
        self.push(Step::new(init));
    }

    /// Append a step with an undo action that reverses `init`.
    pub fn add_step_with_undo<I, R, U, Q>(&mut self, init: I, undo: U)
    where
        I: FnMut() -> R + 'a,
        R: IntoStepOutcome,
        U: FnMut() -> Q + 'a,
        Q: IntoUndoOutcome,
    {
        self.push(Step::new(init).with_undo(undo));
    }

    /// Append a fully configured step.
    ///
    /// Steps belong at the end of the list and must be added before the
    /// forward run that is meant to cover them.
    pub fn push(&mut self, step: Step<'a>) {
        self.steps.push(step);
    }

    /// Run every fresh step's init action in registration order.
    ///
    /// Stops at the first failure, undoes the steps that succeeded, and
    /// returns `false`. A `false` result means the resource is fully cleaned
    /// up already; calling [`uninitialize`](Self::uninitialize) afterwards is
    /// harmless. Steps that are already succeeded are skipped, so a repeated
    /// call after full success does nothing and returns `true`.
    pub fn initialize(&mut self) -> bool {
        self.run_forward(None)
    }

    /// Same as [`initialize`](Self::initialize), also returning a record of
    /// every action invoked, including the rollback on failure.
    pub fn initialize_with_audit(&mut self) -> (bool, AuditLog) {
        let mut audit_log = AuditLog::new();
        let ready = self.run_forward(Some(&mut audit_log));
        (ready, audit_log)
    }

    /// Undo every succeeded step in reverse registration order.
    ///
    /// Undo errors and panics are logged and swallowed. Every step is fresh
    /// afterwards, so a second call does nothing.
    pub fn uninitialize(&mut self) {
        self.run_backward(None);
    }

    /// Same as [`uninitialize`](Self::uninitialize), also returning a record
    /// of every undo action invoked.
    pub fn uninitialize_with_audit(&mut self) -> AuditLog {
        let mut audit_log = AuditLog::new();
        self.run_backward(Some(&mut audit_log));
        audit_log
    }

    /// Take over another sequencer's steps.
    ///
    /// Tears down this sequencer first and discards its steps, then moves the
    /// source's steps over with their states intact. The source is left
    /// empty, so dropping it undoes nothing.
    pub fn transfer_from(&mut self, source: &mut Sequencer<'a>) {
        self.uninitialize();
        self.steps = mem::take(&mut source.steps);
        debug!(steps = self.steps.len(), "took over sequencer steps");
    }

    /// Move all steps into a new sequencer without running any action.
    ///
    /// `self` is left empty and becomes a no-op on drop.
    #[must_use]
    pub fn take(&mut self) -> Sequencer<'a> {
        Sequencer {
            steps: mem::take(&mut self.steps),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps whose undo action is currently owed.
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_succeeded()).count()
    }

    /// `true` when there is at least one step and all of them succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(Step::is_succeeded)
    }

    /// Per-step state in registration order.
    #[must_use]
    pub fn states(&self) -> Vec<StepState> {
        self.steps.iter().map(Step::state).collect()
    }

    fn run_forward(&mut self, mut audit_log: Option<&mut AuditLog>) -> bool {
        debug!(steps = self.steps.len(), "initializing");

        let mut failed = false;
        for (index, step) in self.steps.iter_mut().enumerate() {
            if step.is_succeeded() {
                continue;
            }

            let started_at = Instant::now();
            let outcome = step.run_init();
            let name = step.label(index);

            if let Some(log) = audit_log.as_deref_mut() {
                log.record_init(&name, index, started_at, &outcome);
            }

            match outcome {
                Ok(()) => debug!(step = %name, index, "step initialized"),
                Err(error) => {
                    warn!(step = %name, index, %error, "step failed, rolling back");
                    failed = true;
                    break;
                }
            }
        }

        if failed {
            self.run_backward(audit_log);
            return false;
        }
        true
    }

    fn run_backward(&mut self, mut audit_log: Option<&mut AuditLog>) {
        for (index, step) in self.steps.iter_mut().enumerate().rev() {
            if !step.is_succeeded() {
                continue;
            }

            let started_at = Instant::now();
            let outcome = step.run_undo();
            let name = step.label(index);

            if let Some(log) = audit_log.as_deref_mut() {
                log.record_undo(&name, index, started_at, &outcome);
            }

            match outcome {
                Ok(()) => debug!(step = %name, index, "step undone"),
                Err(error) => warn!(step = %name, index, %error, "undo failed, step reset anyway"),
            }
        }
    }
}

impl Drop for Sequencer<'_> {
    fn drop(&mut self) {
        self.uninitialize();
    }
}

impl fmt::Debug for Sequencer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequencer")
            .field("steps", &self.steps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::audit::StepStatus;
    use crate::error::StepError;

    fn assert_consecutive_prefix(states: &[StepState]) {
        let prefix = states
            .iter()
            .take_while(|s| **s == StepState::Succeeded)
            .count();
        assert!(
            states[prefix..].iter().all(|s| *s == StepState::Fresh),
            "succeeded steps must form a prefix: {states:?}"
        );
    }

    #[test]
    fn empty_sequencer_initializes_successfully() {
        let mut seq = Sequencer::new();

        assert!(seq.initialize());
        assert!(seq.is_empty());
        assert!(!seq.is_initialized());
    }

    #[test]
    fn steps_run_in_registration_order() {
        let log = RefCell::new(Vec::new());
        let log = &log;
        let mut seq = Sequencer::new();
        for i in 0..5 {
            seq.add_step(move || {
                log.borrow_mut().push(i);
                true
            });
        }

        assert!(seq.initialize());

        assert_eq!(*log.borrow(), vec![0, 1, 2, 3, 4]);
        assert!(seq.is_initialized());
        assert_eq!(seq.succeeded_count(), 5);
    }

    #[test]
    fn failure_stops_forward_run_and_unwinds_in_reverse() {
        let log = RefCell::new(Vec::new());
        let log = &log;
        let mut seq = Sequencer::new();
        for i in 0..3 {
            seq.add_step_with_undo(
                move || {
                    log.borrow_mut().push(format!("init {i}"));
                    true
                },
                move || log.borrow_mut().push(format!("undo {i}")),
            );
        }
        seq.add_step(move || {
            log.borrow_mut().push("init 3".to_string());
            false
        });
        seq.add_step(move || {
            log.borrow_mut().push("init 4".to_string());
            true
        });

        assert!(!seq.initialize());

        assert_eq!(
            *log.borrow(),
            vec!["init 0", "init 1", "init 2", "init 3", "undo 2", "undo 1", "undo 0"]
        );
        assert_eq!(seq.succeeded_count(), 0);
    }

    #[test]
    fn failing_step_is_not_undone() {
        let undone = Cell::new(false);
        let mut seq = Sequencer::new();
        seq.add_step_with_undo(|| false, || undone.set(true));

        assert!(!seq.initialize());

        assert!(!undone.get());
    }

    #[test]
    fn repeated_initialize_after_success_skips_succeeded_steps() {
        let calls = Cell::new(0);
        let mut seq = Sequencer::new();
        seq.add_step(|| {
            calls.set(calls.get() + 1);
            true
        });

        assert!(seq.initialize());
        assert!(seq.initialize());

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn steps_added_after_success_run_on_next_initialize() {
        let log = RefCell::new(Vec::new());
        let log = &log;
        let mut seq = Sequencer::new();
        seq.add_step(move || {
            log.borrow_mut().push(0);
            true
        });
        assert!(seq.initialize());

        seq.add_step(move || {
            log.borrow_mut().push(1);
            true
        });
        assert!(seq.initialize());

        assert_eq!(*log.borrow(), vec![0, 1]);
    }

    #[test]
    fn uninitialize_twice_runs_undo_once() {
        let calls = Cell::new(0);
        let mut seq = Sequencer::new();
        seq.add_step_with_undo(|| true, || calls.set(calls.get() + 1));
        assert!(seq.initialize());

        seq.uninitialize();
        seq.uninitialize();

        assert_eq!(calls.get(), 1);
        assert_eq!(seq.states(), vec![StepState::Fresh]);
    }

    #[test]
    fn undo_panic_is_contained_and_teardown_continues() {
        let log = RefCell::new(Vec::new());
        let log = &log;
        let mut seq = Sequencer::new();
        seq.add_step_with_undo(|| true, move || log.borrow_mut().push("undo 0"));
        seq.add_step_with_undo(|| true, || -> Result<(), String> { panic!("close exploded") });
        seq.add_step_with_undo(|| true, move || log.borrow_mut().push("undo 2"));
        assert!(seq.initialize());

        seq.uninitialize();

        assert_eq!(*log.borrow(), vec!["undo 2", "undo 0"]);
        assert_eq!(seq.succeeded_count(), 0);
    }

    #[test]
    fn prefix_invariant_holds_after_partial_failure() {
        let mut seq = Sequencer::new();
        seq.add_step(|| true);
        seq.add_step(|| true);
        seq.add_step(|| false);
        seq.add_step(|| true);

        assert!(!seq.initialize());
        assert_consecutive_prefix(&seq.states());
        assert_eq!(seq.succeeded_count(), 0);
    }

    #[test]
    fn prefix_invariant_holds_after_success() {
        let mut seq = Sequencer::new();
        for _ in 0..4 {
            seq.add_step(|| true);
        }

        assert!(seq.initialize());

        assert_consecutive_prefix(&seq.states());
        assert_eq!(seq.states(), vec![StepState::Succeeded; 4]);
    }

    #[test]
    fn transfer_tears_down_destination_first() {
        let log = RefCell::new(Vec::new());
        let log = &log;
        let mut destination = Sequencer::new();
        destination.add_step_with_undo(|| true, move || log.borrow_mut().push("old undo"));
        assert!(destination.initialize());

        let mut source = Sequencer::new();
        source.add_step_with_undo(|| true, move || log.borrow_mut().push("new undo"));
        assert!(source.initialize());

        destination.transfer_from(&mut source);

        assert_eq!(*log.borrow(), vec!["old undo"]);
        assert!(source.is_empty());
        assert_eq!(destination.states(), vec![StepState::Succeeded]);

        drop(source);
        assert_eq!(*log.borrow(), vec!["old undo"]);

        destination.uninitialize();
        assert_eq!(*log.borrow(), vec!["old undo", "new undo"]);
    }

    #[test]
    fn take_moves_steps_without_running_actions() {
        let calls = Cell::new(0);
        let mut seq = Sequencer::new();
        seq.add_step_with_undo(|| true, || calls.set(calls.get() + 1));
        assert!(seq.initialize());

        let mut moved = seq.take();

        assert_eq!(calls.get(), 0);
        assert!(seq.is_empty());
        assert!(moved.is_initialized());

        moved.uninitialize();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn drop_runs_teardown() {
        let closed = Cell::new(false);
        {
            let mut seq = Sequencer::new();
            seq.add_step_with_undo(|| true, || closed.set(true));
            assert!(seq.initialize());
        }

        assert!(closed.get());
    }

    #[test]
    fn audit_log_records_rollback() {
        let mut seq = Sequencer::new();
        seq.push(Step::new(|| true).named("open"));
        seq.push(Step::new(|| Ok::<_, String>(true)).named("configure"));
        seq.push(Step::new(|| Err::<(), _>("port taken")).named("bind"));

        let (ready, audit_log) = seq.initialize_with_audit();

        assert!(!ready);
        assert_eq!(
            audit_log.statuses(),
            vec![
                StepStatus::Initialized,
                StepStatus::Initialized,
                StepStatus::Failed,
                StepStatus::Undone,
                StepStatus::Undone,
            ]
        );
        let records = audit_log.records();
        assert_eq!(records[2].name, "bind");
        assert_eq!(
            records[2].error,
            Some(StepError::Failed("port taken".to_string()))
        );
        assert_eq!(records[3].name, "configure");
        assert_eq!(records[4].name, "open");
    }

    #[test]
    fn uninitialize_with_audit_only_lists_succeeded_steps() {
        let mut seq = Sequencer::new();
        seq.add_step(|| true);
        seq.add_step(|| true);
        assert!(seq.initialize());

        let audit_log = seq.uninitialize_with_audit();

        let indices: Vec<usize> = audit_log.records().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 0]);
        assert!(seq.uninitialize_with_audit().is_empty());
    }

    #[test]
    fn debug_lists_steps() {
        let mut seq = Sequencer::new();
        seq.push(Step::new(|| true).named("allocate"));

        let rendered = format!("{seq:?}");

        assert!(rendered.starts_with("Sequencer"));
        assert!(rendered.contains("allocate"));
    }
}
