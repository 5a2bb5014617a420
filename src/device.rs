//! Device addresses for tasks targeting a specific phone.
//!
//! A device reached over ADB TCP/IP is identified as `"<ip>:<port>"`, e.g.
//! `192.168.1.100:5555`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Default ADB TCP/IP port.
pub const DEFAULT_ADB_PORT: u16 = 5555;

/// Device address errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceAddressError {
    #[error("Device address is empty")]
    Empty,
    #[error("Device address has no host: {0}")]
    MissingHost(String),
    #[error("Invalid port in device address: {0}")]
    InvalidPort(String),
}

/// Address of a device in `<ip>:<port>` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    host: String,
    port: u16,
}

impl DeviceAddress {
    /// Create an address from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for DeviceAddress {
    type Err = DeviceAddressError;

    /// Parse `"host:port"`, defaulting to port 5555 when none is given.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DeviceAddressError::Empty);
        }

        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .ok()
                    .filter(|port| *port != 0)
                    .ok_or_else(|| DeviceAddressError::InvalidPort(s.to_string()))?;
                (host, port)
            }
            None => (s, DEFAULT_ADB_PORT),
        };

        if host.is_empty() {
            return Err(DeviceAddressError::MissingHost(s.to_string()));
        }

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<DeviceAddress> for String {
    fn from(address: DeviceAddress) -> Self {
        address.to_string()
    }
}
