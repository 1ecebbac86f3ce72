use std::time::Instant;

use crate::error::StepError;

/// Outcome of one action invocation in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StepStatus {
    /// Init action succeeded.
    Initialized,
    /// Init action returned false, returned an error, or panicked.
    Failed,
    /// Undo action completed.
    Undone,
    /// Undo action returned an error or panicked. The step is fresh anyway.
    UndoFailed,
}

/// One init or undo invocation.
#[derive(Debug)]
pub struct StepRecord {
    /// Step label (its name, or `step #<index>`).
    pub name: String,
    /// Registration index of the step.
    pub index: usize,
    pub status: StepStatus,
    pub started_at: Instant,
    pub completed_at: Instant,
    /// Failure reason for `Failed` and `UndoFailed` records.
    pub error: Option<StepError>,
}

/// Chronological record of the actions a run invoked.
#[derive(Debug, Default)]
pub struct AuditLog {
    records: Vec<StepRecord>,
}

impl AuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an init invocation.
    pub(crate) fn record_init(
        &mut self,
        name: &str,
        index: usize,
        started_at: Instant,
        outcome: &Result<(), StepError>,
    ) {
        self.push(name, index, started_at, outcome, StepStatus::Initialized, StepStatus::Failed);
    }

    /// Record an undo invocation.
    pub(crate) fn record_undo(
        &mut self,
        name: &str,
        index: usize,
        started_at: Instant,
        outcome: &Result<(), StepError>,
    ) {
        self.push(name, index, started_at, outcome, StepStatus::Undone, StepStatus::UndoFailed);
    }

    fn push(
        &mut self,
        name: &str,
        index: usize,
        started_at: Instant,
        outcome: &Result<(), StepError>,
        on_success: StepStatus,
        on_failure: StepStatus,
    ) {
        let (status, error) = match outcome {
            Ok(()) => (on_success, None),
            Err(e) => (on_failure, Some(e.clone())),
        };
        self.records.push(StepRecord {
            name: name.to_string(),
            index,
            status,
            started_at,
            completed_at: Instant::now(),
            error,
        });
    }

    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Statuses in invocation order.
    #[must_use]
    pub fn statuses(&self) -> Vec<StepStatus> {
        self.records.iter().map(|r| r.status).collect()
    }

    /// One line per invocation, suitable for terminal output.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                StepStatus::Initialized => "✓",
                StepStatus::Failed => "✗",
                StepStatus::Undone => "↩",
                StepStatus::UndoFailed => "⚠",
            };
            match &record.error {
                Some(error) => lines.push(format!("{status} {}: {error}", record.name)),
                None => lines.push(format!("{status} {}", record.name)),
            }
        }
        lines.join("\n")
    }
}
