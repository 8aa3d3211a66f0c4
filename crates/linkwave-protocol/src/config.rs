//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Device name reported to the server
    pub device_name: String,
    /// Network configuration
    pub network: NetworkConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device_name: "LinkWave Device".to_string(),
            network: NetworkConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create with device name
    pub fn with_device_name(name: impl Into<String>) -> Self {
        Self {
            device_name: name.into(),
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.network.validate()
    }
}

/// Network configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Per-packet response timeout (seconds)
    pub packet_timeout_secs: u64,
    /// Caller-side safety-net deadline (seconds); independent of the
    /// packet's own timeout
    pub caller_deadline_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            packet_timeout_secs: 10,
            caller_deadline_secs: 20,
        }
    }
}

impl NetworkConfig {
    /// Per-packet response timeout
    pub fn packet_timeout(&self) -> Duration {
        Duration::from_secs(self.packet_timeout_secs)
    }

    /// Caller-side safety-net deadline
    pub fn caller_deadline(&self) -> Duration {
        Duration::from_secs(self.caller_deadline_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.packet_timeout_secs == 0 {
            return Err(ProtocolError::Config(
                "packet_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.caller_deadline_secs < self.packet_timeout_secs {
            return Err(ProtocolError::Config(
                "caller_deadline_secs must not be shorter than packet_timeout_secs".to_string(),
            ));
        }
        Ok(())
    }
}
