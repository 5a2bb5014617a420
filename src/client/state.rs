//! Observable client state and events.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::reconciler::ExecutionStep;
use super::ClientError;
use crate::api::{Device, StatusSnapshot};

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    /// The server finished the task and reported a message.
    Completed { message: String },
    /// The server reported an error for the task.
    Failed { error: String },
    /// The server finished the task without a message or error.
    Finished,
    /// Stopped on request.
    Stopped,
}

impl TaskOutcome {
    /// Resolve the outcome of a snapshot with `running == false`.
    pub fn from_terminal(snapshot: &StatusSnapshot) -> Self {
        match (&snapshot.error, &snapshot.message) {
            (Some(error), _) => TaskOutcome::Failed {
                error: error.clone(),
            },
            (None, Some(message)) => TaskOutcome::Completed {
                message: message.clone(),
            },
            (None, None) => TaskOutcome::Finished,
        }
    }

    /// Whether the task ended without an error.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. } | TaskOutcome::Finished)
    }
}

/// State of an [`ExecutionClient`](super::ExecutionClient).
///
/// Consumers only ever see copies; the client's actor is the single writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientState {
    /// Whether the last health check reported `status == "ok"`.
    pub is_connected: bool,
    /// Whether a task is submitted or running.
    pub is_executing: bool,
    /// Most recently submitted task.
    pub current_task: Option<String>,
    /// Most recent error, cleared by a successful health check or a new task.
    pub last_error: Option<ClientError>,
    /// Reconciled progress of the current task.
    pub steps: Vec<ExecutionStep>,
    /// Whether the server reported its agent as initialized.
    pub agent_initialized: bool,
    /// Devices reported by the last successful health check.
    pub devices: Vec<Device>,
    /// Outcome of the most recent task, `None` while it runs.
    pub outcome: Option<TaskOutcome>,
    /// When the current task was submitted.
    pub started_at: Option<DateTime<Local>>,
}

/// Discrete state changes, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    ConnectionChanged {
        connected: bool,
    },
    /// The server accepted a task.
    TaskSubmitted {
        task: String,
        message: String,
    },
    /// The step list of the current task grew.
    StepsUpdated {
        steps: Vec<ExecutionStep>,
    },
    TaskFinished {
        task: Option<String>,
        outcome: TaskOutcome,
        finished_at: DateTime<Local>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminal(message: Option<&str>, error: Option<&str>) -> StatusSnapshot {
        StatusSnapshot {
            running: false,
            message: message.map(str::to_string),
            error: error.map(str::to_string),
            ..StatusSnapshot::default()
        }
    }

    #[test]
    fn test_outcome_from_terminal_snapshot() {
        assert_eq!(
            TaskOutcome::from_terminal(&terminal(Some("done"), Some("X"))),
            TaskOutcome::Failed {
                error: "X".to_string()
            }
        );
        assert_eq!(
            TaskOutcome::from_terminal(&terminal(Some("Y"), None)),
            TaskOutcome::Completed {
                message: "Y".to_string()
            }
        );
        assert_eq!(
            TaskOutcome::from_terminal(&terminal(None, None)),
            TaskOutcome::Finished
        );
    }

    #[test]
    fn test_outcome_success() {
        assert!(TaskOutcome::Finished.is_success());
        assert!(!TaskOutcome::Stopped.is_success());
        assert!(!TaskOutcome::Failed {
            error: "boom".to_string()
        }
        .is_success());
    }
}
