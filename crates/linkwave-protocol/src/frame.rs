//! Wire frame codec.
//!
//! One frame is one decoded unit on the wire: a correlation sign, a
//! kind, a server status, and an opaque payload. Responses carry the
//! status of the request they answer; pushes carry a sign the server
//! minted that no pending packet will match.

use serde::{Deserialize, Serialize};

use linkwave_core::Sign;

use crate::error::{ProtocolError, Result};

/// Frame kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    /// Outgoing request
    Request,
    /// Response correlated to a request by sign
    Response,
    /// Server push: presence online/offline
    PresencePush,
    /// Server push: new message notification
    MessagePush,
}

/// One decoded wire frame
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Frame {
    /// Protocol version
    pub version: u32,
    /// Correlation sign
    pub sign: Sign,
    /// Frame kind
    pub kind: FrameKind,
    /// Server status; zero means success
    pub status: u32,
    /// Server-supplied error message for non-zero status
    pub message: Option<String>,
    /// Opaque payload
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build an outgoing request frame
    pub fn request(sign: Sign, payload: Vec<u8>) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            sign,
            kind: FrameKind::Request,
            status: 0,
            message: None,
            payload,
        }
    }

    /// Build a successful response frame
    pub fn response_ok(sign: Sign, payload: Vec<u8>) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            sign,
            kind: FrameKind::Response,
            status: 0,
            message: None,
            payload,
        }
    }

    /// Build a failed response frame
    pub fn response_err(sign: Sign, status: u32, message: impl Into<String>) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            sign,
            kind: FrameKind::Response,
            status,
            message: Some(message.into()),
            payload: Vec::new(),
        }
    }

    /// Build a push frame
    pub fn push(sign: Sign, kind: FrameKind, payload: Vec<u8>) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            sign,
            kind,
            status: 0,
            message: None,
            payload,
        }
    }

    /// Whether the server reported success
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ProtocolError::InvalidFrame(e.to_string()))
    }

    /// Decode from wire bytes. A frame from a different protocol
    /// version is rejected here, before any dispatch can act on it.
    pub fn decode(bytes: &[u8]) -> Result<Frame> {
        let frame: Frame =
            bincode::deserialize(bytes).map_err(|e| ProtocolError::InvalidFrame(e.to_string()))?;
        if frame.version != crate::PROTOCOL_VERSION {
            return Err(ProtocolError::InvalidFrame(format!(
                "unsupported protocol version {} (expected {})",
                frame.version,
                crate::PROTOCOL_VERSION
            )));
        }
        Ok(frame)
    }
}
