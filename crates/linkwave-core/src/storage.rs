//! Storage boundary consumed by the block allocator and history sync.
//!
//! The persistent store lives outside this workspace; the protocol core
//! reaches it through [`MessageStore`]. [`MemoryStore`] backs the tests.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{BlockId, RemoteId, Scope, Sequence, Timestamp};

/// One locally stored message, keyed by its remote id within a scope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Server-assigned message id
    pub remote_id: RemoteId,
    /// Local storage block this message belongs to
    pub block_id: BlockId,
    /// Local ordering value
    pub sequence: Sequence,
    /// When the record was stored locally
    pub stored_at: Timestamp,
}

/// Persistent-store boundary.
///
/// Lookups and block relabeling are synchronous; callers that need
/// cross-record atomicity (the block allocator's merge) hold the scope's
/// write lock around them.
pub trait MessageStore: Send + Sync {
    /// Find the record for `remote_id` within `scope`, if it has been
    /// stored locally. Absence is an expected steady-state condition,
    /// not an error.
    fn find_record_by_remote_id(&self, scope: &Scope, remote_id: RemoteId)
        -> Option<MessageRecord>;

    /// Relabel every record in `scope` carrying `old_block_id` to
    /// `new_block_id`.
    fn update_block_id(&self, scope: &Scope, old_block_id: BlockId, new_block_id: BlockId);

    /// Insert or replace the record for its remote id within `scope`.
    fn insert_record(&self, scope: &Scope, record: MessageRecord);
}

/// In-memory store used by tests and the loopback demo path.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Scope, HashMap<RemoteId, MessageRecord>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored under `scope`
    pub fn record_count(&self, scope: &Scope) -> usize {
        self.records.read().get(scope).map_or(0, HashMap::len)
    }

    /// Distinct block ids currently present under `scope`
    pub fn distinct_block_ids(&self, scope: &Scope) -> Vec<BlockId> {
        let records = self.records.read();
        let mut ids: Vec<BlockId> = records
            .get(scope)
            .map(|m| m.values().map(|r| r.block_id).collect())
            .unwrap_or_default();
        ids.sort_by_key(BlockId::as_u64);
        ids.dedup();
        ids
    }
}

impl MessageStore for MemoryStore {
    fn find_record_by_remote_id(
        &self,
        scope: &Scope,
        remote_id: RemoteId,
    ) -> Option<MessageRecord> {
        self.records
            .read()
            .get(scope)
            .and_then(|m| m.get(&remote_id))
            .cloned()
    }

    fn update_block_id(&self, scope: &Scope, old_block_id: BlockId, new_block_id: BlockId) {
        let mut records = self.records.write();
        if let Some(m) = records.get_mut(scope) {
            for record in m.values_mut() {
                if record.block_id == old_block_id {
                    record.block_id = new_block_id;
                }
            }
        }
    }

    fn insert_record(&self, scope: &Scope, record: MessageRecord) {
        self.records
            .write()
            .entry(scope.clone())
            .or_default()
            .insert(record.remote_id, record);
    }
}
