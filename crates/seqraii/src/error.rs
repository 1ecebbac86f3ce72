use std::any::Any;

use thiserror::Error;

/// Why a single step action did not complete.
///
/// Never returned from [`Sequencer::initialize`](crate::Sequencer::initialize)
/// or [`Sequencer::uninitialize`](crate::Sequencer::uninitialize); it only
/// shows up in tracing events and in the [`AuditLog`](crate::AuditLog).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StepError {
    /// The init action returned `false`.
    #[error("step reported failure")]
    Rejected,

    /// The action returned an error.
    #[error("{0}")]
    Failed(String),

    /// The action panicked.
    #[error("step panicked: {0}")]
    Panicked(String),
}

impl StepError {
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}
