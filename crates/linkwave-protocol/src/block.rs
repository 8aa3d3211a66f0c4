//! Message block allocation.
//!
//! Local storage partitions a conversation's remote message id space
//! into contiguous "blocks" so range queries stay contiguous and sync
//! knows which history pages are already fetched. Within one scope each
//! stored remote id belongs to exactly one block; adjacent blocks merge
//! (never split) as history is paged in, so the block count for a scope
//! only ever shrinks once the first block exists.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use linkwave_core::{BlockId, MessageStore, RemoteId, Scope};

use crate::idgen::SignGenerator;

/// Assigns and merges block ids for remote message ranges.
pub struct MessageBlockAllocator {
    store: Arc<dyn MessageStore>,
    signs: Arc<SignGenerator>,
    /// Per-scope write locks; merges for different scopes never contend.
    scope_locks: DashMap<Scope, Arc<Mutex<()>>>,
}

impl MessageBlockAllocator {
    /// Create an allocator over the given store.
    pub fn new(store: Arc<dyn MessageStore>, signs: Arc<SignGenerator>) -> Self {
        Self {
            store,
            signs,
            scope_locks: DashMap::new(),
        }
    }

    fn scope_lock(&self, scope: &Scope) -> Arc<Mutex<()>> {
        self.scope_locks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Pick the block id for a newly learned `remote_id`.
    ///
    /// The immediately newer neighbor wins, then the immediately older
    /// one; with no stored neighbor the message starts a brand-new
    /// block under a freshly minted id. A missing record is "no block",
    /// an expected steady-state condition, never an error.
    pub fn assign_block_id(&self, scope: &Scope, remote_id: RemoteId) -> BlockId {
        let lock = self.scope_lock(scope);
        let _guard = lock.lock();

        if let Some(newer) = self.store.find_record_by_remote_id(scope, remote_id.newer()) {
            return newer.block_id;
        }

        if let Some(older_id) = remote_id.older() {
            if let Some(older) = self.store.find_record_by_remote_id(scope, older_id) {
                return older.block_id;
            }
        }

        let fresh = BlockId::from_raw(self.signs.next_sign().as_u64());
        debug!(%scope, %remote_id, block = %fresh, "minted new block");
        fresh
    }

    /// Merge after new neighboring history was learned.
    ///
    /// If the message immediately older than `remote_id` belongs to a
    /// different block, that older block is relabeled to this one,
    /// collapsing the two. Merge direction is always toward older
    /// messages, matching the direction history is paged in. Runs under
    /// the scope's write lock so two racing fetches cannot merge the
    /// same pair inconsistently.
    pub fn expand_block_id(&self, scope: &Scope, remote_id: RemoteId) {
        let lock = self.scope_lock(scope);
        let _guard = lock.lock();

        let Some(current) = self.store.find_record_by_remote_id(scope, remote_id) else {
            return;
        };
        let Some(older_id) = remote_id.older() else {
            return;
        };
        let Some(older) = self.store.find_record_by_remote_id(scope, older_id) else {
            return;
        };

        if older.block_id != current.block_id {
            debug!(
                %scope,
                from = %older.block_id,
                into = %current.block_id,
                "merging block toward history"
            );
            self.store
                .update_block_id(scope, older.block_id, current.block_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkwave_core::{MemoryStore, MessageRecord, Sequence, Timestamp};

    fn setup() -> (MessageBlockAllocator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let allocator = MessageBlockAllocator::new(store.clone(), Arc::new(SignGenerator::new()));
        (allocator, store)
    }

    fn insert(store: &MemoryStore, scope: &Scope, remote_id: u64, block_id: BlockId) {
        store.insert_record(
            scope,
            MessageRecord {
                remote_id: RemoteId::from_raw(remote_id),
                block_id,
                sequence: Sequence::from_raw(remote_id),
                stored_at: Timestamp::now(),
            },
        );
    }

    #[test]
    fn test_reuses_newer_neighbor_block() {
        let (allocator, store) = setup();
        let scope = Scope::new("s1", "c1");
        let block = BlockId::from_raw(77);
        insert(&store, &scope, 101, block);

        assert_eq!(allocator.assign_block_id(&scope, RemoteId::from_raw(100)), block);
    }

    #[test]
    fn test_falls_back_to_older_neighbor_block() {
        let (allocator, store) = setup();
        let scope = Scope::new("s1", "c1");
        let block = BlockId::from_raw(77);
        insert(&store, &scope, 99, block);

        assert_eq!(allocator.assign_block_id(&scope, RemoteId::from_raw(100)), block);
    }

    #[test]
    fn test_mints_fresh_block_without_neighbors() {
        let (allocator, store) = setup();
        let scope = Scope::new("s1", "c1");
        insert(&store, &scope, 10, BlockId::from_raw(1));
        insert(&store, &scope, 50, BlockId::from_raw(2));

        let fresh = allocator.assign_block_id(&scope, RemoteId::from_raw(30));
        assert_ne!(fresh, BlockId::from_raw(1));
        assert_ne!(fresh, BlockId::from_raw(2));

        // A second isolated id gets a different fresh block.
        let fresh2 = allocator.assign_block_id(&scope, RemoteId::from_raw(40));
        assert_ne!(fresh2, fresh);
    }

    #[test]
    fn test_expand_merges_toward_older_history() {
        let (allocator, store) = setup();
        let scope = Scope::new("s1", "c1");
        let block_b = BlockId::from_raw(2);
        let block_c = BlockId::from_raw(1);
        insert(&store, &scope, 100, block_b);
        insert(&store, &scope, 99, block_c);

        allocator.expand_block_id(&scope, RemoteId::from_raw(100));

        for id in [99, 100] {
            assert_eq!(
                store
                    .find_record_by_remote_id(&scope, RemoteId::from_raw(id))
                    .unwrap()
                    .block_id,
                block_b
            );
        }
        assert_eq!(store.distinct_block_ids(&scope), vec![block_b]);
    }

    #[test]
    fn test_expand_does_not_touch_other_scopes() {
        let (allocator, store) = setup();
        let scope = Scope::new("s1", "c1");
        let other = Scope::new("s1", "c2");
        insert(&store, &scope, 100, BlockId::from_raw(2));
        insert(&store, &scope, 99, BlockId::from_raw(1));
        insert(&store, &other, 99, BlockId::from_raw(1));

        allocator.expand_block_id(&scope, RemoteId::from_raw(100));

        assert_eq!(
            store
                .find_record_by_remote_id(&other, RemoteId::from_raw(99))
                .unwrap()
                .block_id,
            BlockId::from_raw(1)
        );
    }

    #[test]
    fn test_expand_without_records_is_a_no_op() {
        let (allocator, store) = setup();
        let scope = Scope::new("s1", "c1");
        allocator.expand_block_id(&scope, RemoteId::from_raw(5));
        assert_eq!(store.record_count(&scope), 0);
    }

    #[test]
    fn test_already_merged_expand_is_stable() {
        let (allocator, store) = setup();
        let scope = Scope::new("s1", "c1");
        let block = BlockId::from_raw(9);
        insert(&store, &scope, 99, block);
        insert(&store, &scope, 100, block);

        allocator.expand_block_id(&scope, RemoteId::from_raw(100));
        assert_eq!(store.distinct_block_ids(&scope), vec![block]);
    }
}
