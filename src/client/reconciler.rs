//! Progress reconciliation.
//!
//! Every status snapshot carries the complete progress history of the task,
//! not a delta. New information is detected by comparing the history length
//! with the length seen last time; when it grew, the whole step list is
//! rebuilt from the snapshot.

use serde::{Deserialize, Serialize};

use crate::api::ProgressEntry;

/// Shown for steps the server reported without any reasoning text.
pub const THINKING_PLACEHOLDER: &str = "Processing...";

/// A progress step as presented to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub step_number: u32,
    pub thinking: String,
    pub action: Option<String>,
}

impl From<&ProgressEntry> for ExecutionStep {
    fn from(entry: &ProgressEntry) -> Self {
        Self {
            step_number: entry.step,
            thinking: entry
                .thinking
                .clone()
                .unwrap_or_else(|| THINKING_PLACEHOLDER.to_string()),
            action: entry.action.clone(),
        }
    }
}

/// Result of reconciling one snapshot.
///
/// When `changed` is false `steps` is empty and the previous list stays
/// authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub steps: Vec<ExecutionStep>,
    pub changed: bool,
}

/// Reconcile a snapshot's progress history against the previously seen count.
///
/// A history shorter than what was already seen is ignored so the step list
/// never shrinks while a task is running.
pub fn reconcile(previous_count: usize, incoming: &[ProgressEntry]) -> Reconciled {
    if incoming.len() == previous_count {
        return Reconciled::default();
    }

    if incoming.len() < previous_count {
        tracing::warn!(
            previous = previous_count,
            incoming = incoming.len(),
            "Progress history shrank between polls, keeping current steps"
        );
        return Reconciled::default();
    }

    Reconciled {
        steps: incoming.iter().map(ExecutionStep::from).collect(),
        changed: true,
    }
}

/// Stateful reconciler for the lifetime of one task.
#[derive(Debug, Clone, Default)]
pub struct ProgressReconciler {
    count: usize,
    steps: Vec<ExecutionStep>,
}

impl ProgressReconciler {
    /// Create an empty reconciler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all steps, for a new task.
    pub fn reset(&mut self) {
        self.count = 0;
        self.steps.clear();
    }

    /// Apply a snapshot's progress history. Returns whether the steps changed.
    pub fn apply(&mut self, incoming: &[ProgressEntry]) -> bool {
        let reconciled = reconcile(self.count, incoming);
        if reconciled.changed {
            self.count = incoming.len();
            self.steps = reconciled.steps;
        }
        reconciled.changed
    }

    /// Current steps.
    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    /// Length of the last accepted progress history.
    pub fn count(&self) -> usize {
        self.count
    }
}
