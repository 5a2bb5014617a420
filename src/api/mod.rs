//! Wire types for the AutoGLM API server.

mod types;

pub use types::{
    Device, DeviceList, ExecuteReply, ProgressEntry, ServerHealth, StatusSnapshot, TaskRejection,
    TaskRequest, TaskResult,
};

/// Health check endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Device listing endpoint.
pub const DEVICES_PATH: &str = "/devices";

/// Task submission endpoint.
pub const EXECUTE_PATH: &str = "/execute";

/// Task status endpoint, polled while a task runs.
pub const STATUS_PATH: &str = "/status";

/// Stop endpoint.
pub const STOP_PATH: &str = "/stop";
