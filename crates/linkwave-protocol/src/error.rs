//! Error types for the LinkWave protocol core

use std::time::Duration;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Protocol error types.
///
/// Transport and protocol failures surface to the original caller
/// through the packet's terminal state; nothing here is retried inside
/// the core. `StateFault` marks an internal invariant violation and
/// additionally trips a debug assertion.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Server responded with a non-zero status
    #[error("Protocol failure {code}: {message}")]
    Protocol { code: u32, message: String },

    /// No matching response within the deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Internal invariant violation (programming defect)
    #[error("State fault: {0}")]
    StateFault(String),

    /// Send attempted while not connected
    #[error("Not connected (state: {0})")]
    NotConnected(String),

    /// Transport collaborator failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Frame could not be encoded or decoded
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Configuration rejected
    #[error("Configuration error: {0}")]
    Config(String),
}
