//! Core identifier types used throughout LinkWave

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-request correlation identifier.
///
/// Signs are globally unique within a process and weakly time-ordered;
/// they exist only to match an outgoing request to its response and are
/// never persisted past the lifetime of the pending request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sign(u64);

impl Sign {
    /// Create from a raw value
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Locally derived ordering value for stored records.
///
/// Computed from a [`Sign`] plus a [`Scope`]; for fixed inputs the
/// derivation is stable and reproducible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sequence(u64);

impl Sequence {
    /// Create from a raw value
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Create from string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Conversation identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(String);

impl ConversationId {
    /// Create from string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A (session, conversation) namespace under which blocks and sequences
/// are independently tracked.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Owning session
    pub session: SessionId,
    /// Conversation within the session
    pub conversation: ConversationId,
}

impl Scope {
    /// Create a new scope
    pub fn new(session: impl Into<String>, conversation: impl Into<String>) -> Self {
        Self {
            session: SessionId::from_string(session),
            conversation: ConversationId::from_string(conversation),
        }
    }

    /// Stable byte representation used when hashing the scope
    pub fn discriminator_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            self.session.as_str().len() + self.conversation.as_str().len() + 1,
        );
        bytes.extend_from_slice(self.session.as_str().as_bytes());
        bytes.push(0x1f);
        bytes.extend_from_slice(self.conversation.as_str().as_bytes());
        bytes
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session, self.conversation)
    }
}

/// Remote (server-assigned) message identifier within a conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RemoteId(u64);

impl RemoteId {
    /// Create from a raw value
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The immediately newer message id
    pub fn newer(&self) -> RemoteId {
        RemoteId(self.0 + 1)
    }

    /// The immediately older message id, if any
    pub fn older(&self) -> Option<RemoteId> {
        self.0.checked_sub(1).map(RemoteId)
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a contiguous local storage block covering a run of
/// remote message ids within one scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(u64);

impl BlockId {
    /// Create from a raw value
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp in milliseconds since Unix epoch
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    /// Create from milliseconds
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Get as milliseconds
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Milliseconds elapsed since this timestamp
    pub fn elapsed_millis(&self) -> i64 {
        Self::now().0 - self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp_millis(self.0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f UTC")),
            None => write!(f, "{}ms", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_id_neighbors() {
        let id = RemoteId::from_raw(100);
        assert_eq!(id.newer(), RemoteId::from_raw(101));
        assert_eq!(id.older(), Some(RemoteId::from_raw(99)));
        assert_eq!(RemoteId::from_raw(0).older(), None);
    }

    #[test]
    fn test_scope_discriminator_is_stable() {
        let a = Scope::new("s1", "c1");
        let b = Scope::new("s1", "c1");
        assert_eq!(a.discriminator_bytes(), b.discriminator_bytes());

        // The separator keeps ("ab", "c") distinct from ("a", "bc").
        let c = Scope::new("ab", "c");
        let d = Scope::new("a", "bc");
        assert_ne!(c.discriminator_bytes(), d.discriminator_bytes());
    }

    #[test]
    fn test_timestamp() {
        let ts = Timestamp::now();
        assert!(ts.as_millis() > 0);
        assert!(ts.elapsed_millis() >= 0);
    }
}
