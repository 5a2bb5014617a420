//! Persisted client settings.
//! Stored in the platform-specific config directory via `directories::ProjectDirs`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::{ClientConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PROGRESS_INTERVAL_MS};
use crate::device::{DeviceAddress, DeviceAddressError};
use crate::transport::{DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SUBMIT_TIMEOUT_SECS};

/// Settings errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Cannot determine config directory")]
    NoConfigDir,
    #[error("Failed to write settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Client settings that can be saved and loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// AutoGLM API server URL
    pub server_url: String,
    /// Target device as "<ip>:<port>" (optional)
    pub device_id: String,
    /// Timeout for health, status and stop calls in seconds
    pub request_timeout_secs: u64,
    /// Timeout for task submission in seconds
    pub submit_timeout_secs: u64,
    /// Status poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Progress refresh interval in milliseconds
    pub progress_interval_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_BASE_URL.to_string(),
            device_id: String::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            submit_timeout_secs: DEFAULT_SUBMIT_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
        }
    }
}

impl ClientSettings {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "moderras", "autoglm-client")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Load settings from the config file, falling back to defaults.
    pub fn load() -> Self {
        Self::settings_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from a specific file, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        let mut loaded: Self = fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        loaded.backfill();
        loaded
    }

    /// Replace empty or zero fields, e.g. from older or hand-edited files.
    fn backfill(&mut self) {
        let defaults = Self::default();

        if self.server_url.trim().is_empty() {
            self.server_url = defaults.server_url;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = defaults.request_timeout_secs;
        }
        if self.submit_timeout_secs == 0 {
            self.submit_timeout_secs = defaults.submit_timeout_secs;
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = defaults.poll_interval_ms;
        }
        if self.progress_interval_ms == 0 {
            self.progress_interval_ms = defaults.progress_interval_ms;
        }
    }

    /// Save settings to the config file.
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Save settings to a specific file, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Configured target device, if any.
    pub fn device(&self) -> Option<Result<DeviceAddress, DeviceAddressError>> {
        let device_id = self.device_id.trim();
        if device_id.is_empty() {
            None
        } else {
            Some(device_id.parse())
        }
    }

    /// Build the client configuration.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_base_url(&self.server_url)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_submit_timeout(Duration::from_secs(self.submit_timeout_secs))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_progress_interval(Duration::from_millis(self.progress_interval_ms))
    }
}
