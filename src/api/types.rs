//! Request and response bodies exchanged with the AutoGLM API server.

use serde::{Deserialize, Serialize};

/// A device the server can drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub status: String,
    /// `/health` reports this as `type`, `/devices` as `connection_type`.
    #[serde(alias = "type")]
    pub connection_type: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHealth {
    pub status: String,
    pub agent_initialized: bool,
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl ServerHealth {
    /// Whether the server reports itself healthy.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Response of `GET /devices`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Body of `POST /execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

impl TaskRequest {
    /// Create a non-streaming request for the given task.
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            device_id: None,
            stream: false,
        }
    }

    /// Target a specific device.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// Acknowledgment of an accepted `POST /execute`.
///
/// This only says the job was accepted, not that it finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: String,
    pub task: String,
    pub message: String,
}

/// Body of a rejected `POST /execute` (HTTP 400, 409 or 500).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRejection {
    pub error: String,
    /// Task that blocked the submission, reported with HTTP 409.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
}

/// Any well-formed reply to `POST /execute`.
///
/// A body with a non-null `error` is a rejection. Anything else must be a
/// complete acknowledgment, so `{}` or a proxy's `{"detail": ...}` fails to
/// decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecuteReply {
    Rejected(TaskRejection),
    Accepted(TaskResult),
}

/// One reasoning/action unit reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub step: u32,
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

/// Response of `GET /status`: the full current state of the remote job.
///
/// `progress` always holds the whole history, never a delta. The server also
/// sends a nested `action` object which is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub step: u32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub progress: Option<Vec<ProgressEntry>>,
}
