use std::fmt::Display;

use crate::error::StepError;

/// Conversion from an init action's return value into a step outcome.
///
/// Implemented for `bool`, `Result<(), E>` and `Result<bool, E>`, so init
/// closures can return whatever their underlying API hands back.
pub trait IntoStepOutcome {
    /// Collapse the value into success or a [`StepError`].
    ///
    /// # Errors
    ///
    /// Returns `StepError::Rejected` for `false` and `StepError::Failed` for an
    /// `Err` value.
    fn into_outcome(self) -> Result<(), StepError>;
}

impl IntoStepOutcome for bool {
    fn into_outcome(self) -> Result<(), StepError> {
        if self {
            Ok(())
        } else {
            Err(StepError::Rejected)
        }
    }
}

impl<E: Display> IntoStepOutcome for Result<(), E> {
    fn into_outcome(self) -> Result<(), StepError> {
        self.map_err(|e| StepError::Failed(e.to_string()))
    }
}

impl<E: Display> IntoStepOutcome for Result<bool, E> {
    fn into_outcome(self) -> Result<(), StepError> {
        match self {
            Ok(ready) => ready.into_outcome(),
            Err(e) => Err(StepError::Failed(e.to_string())),
        }
    }
}

/// Conversion from an undo action's return value.
///
/// Undo failures are only ever logged, so `()` counts as success.
pub trait IntoUndoOutcome {
    /// Collapse the value into success or a [`StepError`].
    ///
    /// # Errors
    ///
    /// Returns `StepError::Failed` for an `Err` value.
    fn into_outcome(self) -> Result<(), StepError>;
}

impl IntoUndoOutcome for () {
    fn into_outcome(self) -> Result<(), StepError> {
        Ok(())
    }
}

impl<E: Display> IntoUndoOutcome for Result<(), E> {
    fn into_outcome(self) -> Result<(), StepError> {
        self.map_err(|e| StepError::Failed(e.to_string()))
    }
}
