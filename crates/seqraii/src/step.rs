use std::borrow::Cow;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::error::StepError;
use crate::outcome::{IntoStepOutcome, IntoUndoOutcome};

type Action<'a> = Box<dyn FnMut() -> Result<(), StepError> + 'a>;

/// Whether a step's init action is currently in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// Never initialized, failed to initialize, or already undone.
    Fresh,
    /// Init action reported success and undo has not run since.
    Succeeded,
}

/// One stage of staged resource setup: an init action, an undo action and
/// the flag recording whether the undo is owed.
///
/// The closures may borrow from the caller's scope for `'a`. Whatever they
/// borrow must outlive the [`Sequencer`](crate::Sequencer) holding the step,
/// since the undo action can run as late as the sequencer's drop.
pub struct Step<'a> {
    name: Option<String>,
    init: Action<'a>,
    undo: Action<'a>,
    state: StepState,
}

impl<'a> Step<'a> {
    /// Create a step with a no-op undo action.
    ///
    /// `init` may return `bool`, `Result<(), E>` or `Result<bool, E>`.
    #[must_use]
    pub fn new<I, R>(mut init: I) -> Self
    where
        I: FnMut() -> R + 'a,
        R: IntoStepOutcome,
    {
        Self {
            name: None,
            init: Box::new(move || IntoStepOutcome::into_outcome(init())),
            undo: Box::new(|| Ok(())),
            state: StepState::Fresh,
        }
    }

    /// Attach the action that reverses `init`.
    ///
    /// `undo` may return `()` or `Result<(), E>`.
    #[must_use]
    pub fn with_undo<U, R>(mut self, mut undo: U) -> Self
    where
        U: FnMut() -> R + 'a,
        R: IntoUndoOutcome,
    {
        self.undo = Box::new(move || IntoUndoOutcome::into_outcome(undo()));
        self
    }

    /// Label the step for logs and audit records.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn state(&self) -> StepState {
        self.state
    }

    pub(crate) fn label(&self, index: usize) -> Cow<'_, str> {
        match &self.name {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("step #{index}")),
        }
    }

    pub(crate) fn is_succeeded(&self) -> bool {
        self.state == StepState::Succeeded
    }

    /// Run the init action, marking the step succeeded only on success.
    pub(crate) fn run_init(&mut self) -> Result<(), StepError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.init)()))
            .unwrap_or_else(|payload| Err(StepError::from_panic(&*payload)));

        if outcome.is_ok() {
            self.state = StepState::Succeeded;
        }
        outcome
    }

    /// Run the undo action. The step is fresh afterwards whatever happens.
    pub(crate) fn run_undo(&mut self) -> Result<(), StepError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.undo)()))
            .unwrap_or_else(|payload| Err(StepError::from_panic(&*payload)));

        self.state = StepState::Fresh;
        outcome
    }
}

impl fmt::Debug for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
