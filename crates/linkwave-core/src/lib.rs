//! Core types and storage boundary for the LinkWave messaging protocol.
//!
//! This crate holds the identifiers shared across the protocol stack
//! (signs, sequences, scopes, block ids) and the storage trait the
//! block allocator and history sync talk to. It has no networking or
//! protocol logic of its own.

pub mod storage;
pub mod types;

pub use storage::{MemoryStore, MessageRecord, MessageStore};
pub use types::{BlockId, ConversationId, RemoteId, Scope, Sequence, SessionId, Sign, Timestamp};
