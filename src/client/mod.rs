//! Task execution client for the AutoGLM API server.

mod actor;
mod handle;
pub mod reconciler;
mod state;

use std::time::Duration;

use thiserror::Error;

use crate::transport::{
    TransportError, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SUBMIT_TIMEOUT_SECS,
};

pub use handle::ExecutionClient;
pub use reconciler::{reconcile, ExecutionStep, ProgressReconciler, Reconciled};
pub use state::{ClientEvent, ClientState, TaskOutcome};

/// Default interval of the supervisory status poll in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default interval of consumer-driven progress refreshes in milliseconds.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 300;

/// Client errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{0}")]
    ServerReported(String),
    #[error("A task is already executing")]
    AlreadyExecuting,
    #[error("Task must not be empty")]
    InvalidTask,
    #[error("AutoGLM client is not running")]
    Closed,
}

impl ClientError {
    /// Whether the server could not be reached.
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Transport(e) if e.is_network())
    }
}

/// Configuration for the execution client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// AutoGLM API server base URL.
    pub base_url: String,
    /// Timeout for health, device, status and stop calls.
    pub request_timeout: Duration,
    /// Timeout for task submission.
    pub submit_timeout: Duration,
    /// Supervisory status poll interval while a task runs.
    pub poll_interval: Duration,
    /// Interval used by [`ExecutionClient::wait_for_completion`].
    pub progress_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            submit_timeout: Duration::from_secs(DEFAULT_SUBMIT_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            progress_interval: Duration::from_millis(DEFAULT_PROGRESS_INTERVAL_MS),
        }
    }
}

impl ClientConfig {
    /// Set the server base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the timeout for health, device, status and stop calls.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the task submission timeout.
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Set the supervisory poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the consumer progress refresh interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8765");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.progress_interval, Duration::from_millis(300));
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::default()
            .with_base_url("http://10.0.0.5:8765")
            .with_poll_interval(Duration::from_millis(500))
            .with_progress_interval(Duration::from_millis(100))
            .with_submit_timeout(Duration::from_secs(10));

        assert_eq!(config.base_url, "http://10.0.0.5:8765");
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.progress_interval, Duration::from_millis(100));
        assert_eq!(config.submit_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_network_classification() {
        let err = ClientError::from(TransportError::Timeout(Duration::from_secs(5)));
        assert!(err.is_network());
        assert!(!ClientError::ServerReported("Agent not initialized".to_string()).is_network());
        assert!(!ClientError::from(TransportError::Empty).is_network());
    }
}
