//! `redb`-backed implementation of the Change Store, grounded on the
//! teacher's `crates/store` and `crates/agent` use of `redb` as the
//! workspace's embedded key-value engine.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use redb::{Database, MultimapTableDefinition, ReadableTable, TableDefinition};

use osc_core::crypto::Cid;
use osc_core::error::{CoreError, Result};
use osc_core::ids::{SpaceId, TreeId};

/// `"<spaceId>/<treeId>/<changeId>" -> rawPayload`.
const CHANGES: TableDefinition<&str, &[u8]> = TableDefinition::new("changes");
/// Quarantined changes, same key shape as `CHANGES`, never consulted by replay.
const QUARANTINE: TableDefinition<&str, &[u8]> = TableDefinition::new("quarantine");
/// `"<spaceId>/<treeId>" -> DAG-CBOR-encoded Vec<Cid>` (current heads).
const HEADS: TableDefinition<&str, &[u8]> = TableDefinition::new("heads");
/// `"<spaceId>/<treeId>" -> DAG-CBOR-encoded Vec<Cid>` (append order, used by `iterate_from`).
const APPEND_LOG: TableDefinition<&str, &[u8]> = TableDefinition::new("append_log");
/// `spaceId -> treeId` (repeated), populated on first `put_change` for a tree.
const TREE_INDEX: MultimapTableDefinition<&str, &str> = MultimapTableDefinition::new("tree_index");

/// A raw, encoded change as the store sees it: the store does not interpret
/// `rawPayload`, it only persists and retrieves it by `id`.
#[derive(Debug, Clone)]
pub struct StoredChange {
    pub id: Cid,
    pub raw_payload: Vec<u8>,
}

/// Durable store of raw changes, head indices, and per-space tree roots.
///
/// One `redb` file per `dataDir`; tables are partitioned by composite string
/// keys rather than by separate files, since `redb` supports many tables per
/// file (§6.3).
pub struct ChangeStore {
    db: Arc<Mutex<Database>>,
}

fn tree_key(space: &SpaceId, tree: &TreeId) -> String {
    format!("{}/{}", space.0, tree.0)
}

fn change_key(space: &SpaceId, tree: &TreeId, id: &Cid) -> String {
    format!("{}/{}/{}", space.0, tree.0, id)
}

impl ChangeStore {
    /// Opens (creating if absent) the change store at `<dataDir>/changes.redb`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join("changes.redb");
        let db = Database::create(&path)
            .map_err(|e| CoreError::infrastructure(format!("open change store: {e}")))?;

        // Ensure every table exists so reads on a fresh store don't error.
        let txn = db
            .begin_write()
            .map_err(|e| CoreError::infrastructure(format!("begin write txn: {e}")))?;
        {
            txn.open_table(CHANGES)
                .map_err(|e| CoreError::infrastructure(e.to_string()))?;
            txn.open_table(QUARANTINE)
                .map_err(|e| CoreError::infrastructure(e.to_string()))?;
            txn.open_table(HEADS)
                .map_err(|e| CoreError::infrastructure(e.to_string()))?;
            txn.open_table(APPEND_LOG)
                .map_err(|e| CoreError::infrastructure(e.to_string()))?;
            txn.open_multimap_table(TREE_INDEX)
                .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        }
        txn.commit()
            .map_err(|e| CoreError::infrastructure(format!("commit init txn: {e}")))?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Idempotent insert of one raw change, atomic with the tree's append
    /// log and the space's tree index.
    pub fn put_change(&self, space: &SpaceId, tree: &TreeId, change: &StoredChange) -> Result<()> {
        let db = self.db.lock();
        let txn = db
            .begin_write()
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        {
            let key = change_key(space, tree, &change.id);
            let mut changes = txn
                .open_table(CHANGES)
                .map_err(|e| CoreError::infrastructure(e.to_string()))?;
            let already_present = changes
                .get(key.as_str())
                .map_err(|e| CoreError::infrastructure(e.to_string()))?
                .is_some();
            if !already_present {
                changes
                    .insert(key.as_str(), change.raw_payload.as_slice())
                    .map_err(|e| CoreError::infrastructure(e.to_string()))?;
                drop(changes);

                let tkey = tree_key(space, tree);
                let mut append_log = txn
                    .open_table(APPEND_LOG)
                    .map_err(|e| CoreError::infrastructure(e.to_string()))?;
                let mut ids: Vec<Cid> = match append_log
                    .get(tkey.as_str())
                    .map_err(|e| CoreError::infrastructure(e.to_string()))?
                {
                    Some(bytes) => osc_core::serialization::from_slice(bytes.value())?,
                    None => Vec::new(),
                };
                ids.push(change.id);
                let encoded = osc_core::serialization::to_vec(&ids)?;
                append_log
                    .insert(tkey.as_str(), encoded.as_slice())
                    .map_err(|e| CoreError::infrastructure(e.to_string()))?;
                drop(append_log);

                let mut index = txn
                    .open_multimap_table(TREE_INDEX)
                    .map_err(|e| CoreError::infrastructure(e.to_string()))?;
                index
                    .insert(space.0.as_str(), tree.0.to_hex().as_str())
                    .map_err(|e| CoreError::infrastructure(e.to_string()))?;
            }
        }
        txn.commit()
            .map_err(|e| CoreError::infrastructure(format!("commit put_change: {e}")))?;
        Ok(())
    }

    /// Moves a change into quarantine instead of deleting it: the tree
    /// remains usable at its prior head set, but the bad change is retained
    /// for forensics and surfaced as a fatal error for that change only.
    pub fn quarantine(&self, space: &SpaceId, tree: &TreeId, change: &StoredChange) -> Result<()> {
        let db = self.db.lock();
        let txn = db
            .begin_write()
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        {
            let key = change_key(space, tree, &change.id);
            let mut quarantine = txn
                .open_table(QUARANTINE)
                .map_err(|e| CoreError::infrastructure(e.to_string()))?;
            quarantine
                .insert(key.as_str(), change.raw_payload.as_slice())
                .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        }
        txn.commit()
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        tracing::warn!(change_id = %change.id, tree = %tree, "quarantined corrupt change");
        Ok(())
    }

    pub fn get_change(&self, space: &SpaceId, tree: &TreeId, id: &Cid) -> Result<Option<StoredChange>> {
        let db = self.db.lock();
        let txn = db
            .begin_read()
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        let changes = txn
            .open_table(CHANGES)
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        let key = change_key(space, tree, id);
        let found = changes
            .get(key.as_str())
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        Ok(found.map(|v| StoredChange {
            id: *id,
            raw_payload: v.value().to_vec(),
        }))
    }

    pub fn has_change(&self, space: &SpaceId, tree: &TreeId, id: &Cid) -> Result<bool> {
        Ok(self.get_change(space, tree, id)?.is_some())
    }

    /// Atomically replaces the stored head set for `tree`.
    pub fn put_heads(&self, space: &SpaceId, tree: &TreeId, heads: &[Cid]) -> Result<()> {
        let db = self.db.lock();
        let txn = db
            .begin_write()
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        {
            let mut table = txn
                .open_table(HEADS)
                .map_err(|e| CoreError::infrastructure(e.to_string()))?;
            let key = tree_key(space, tree);
            let encoded = osc_core::serialization::to_vec(&heads.to_vec())?;
            table
                .insert(key.as_str(), encoded.as_slice())
                .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        }
        txn.commit()
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        Ok(())
    }

    pub fn get_heads(&self, space: &SpaceId, tree: &TreeId) -> Result<Vec<Cid>> {
        let db = self.db.lock();
        let txn = db
            .begin_read()
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        let table = txn
            .open_table(HEADS)
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        let key = tree_key(space, tree);
        match table
            .get(key.as_str())
            .map_err(|e| CoreError::infrastructure(e.to_string()))?
        {
            Some(bytes) => osc_core::serialization::from_slice(bytes.value()),
            None => Ok(Vec::new()),
        }
    }

    /// Lists every tree root seen in this space (§4.1 `storedIds`).
    pub fn stored_ids(&self, space: &SpaceId) -> Result<Vec<TreeId>> {
        let db = self.db.lock();
        let txn = db
            .begin_read()
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        let index = txn
            .open_multimap_table(TREE_INDEX)
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        let mut out = Vec::new();
        let values = index
            .get(space.0.as_str())
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        for entry in values {
            let hex = entry.map_err(|e| CoreError::infrastructure(e.to_string()))?;
            let cid = Cid::from_hex(hex.value())
                .map_err(|e| CoreError::corruption(format!("tree index hex: {e}")))?;
            out.push(TreeId(cid));
        }
        Ok(out)
    }

    /// Streams raw changes appended after `snapshot_id` (exclusive), in
    /// storage append order, for full-sync batch responses (§4.3).
    pub fn iterate_from(
        &self,
        space: &SpaceId,
        tree: &TreeId,
        snapshot_id: Option<Cid>,
    ) -> Result<Vec<StoredChange>> {
        let db = self.db.lock();
        let txn = db
            .begin_read()
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        let append_log = txn
            .open_table(APPEND_LOG)
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        let tkey = tree_key(space, tree);
        let ids: Vec<Cid> = match append_log
            .get(tkey.as_str())
            .map_err(|e| CoreError::infrastructure(e.to_string()))?
        {
            Some(bytes) => osc_core::serialization::from_slice(bytes.value())?,
            None => Vec::new(),
        };

        let start = match snapshot_id {
            Some(target) => ids.iter().position(|id| *id == target).map(|i| i + 1).unwrap_or(0),
            None => 0,
        };

        let changes = txn
            .open_table(CHANGES)
            .map_err(|e| CoreError::infrastructure(e.to_string()))?;
        let mut out = Vec::with_capacity(ids.len().saturating_sub(start));
        for id in &ids[start..] {
            let key = change_key(space, tree, id);
            if let Some(bytes) = changes
                .get(key.as_str())
                .map_err(|e| CoreError::infrastructure(e.to_string()))?
            {
                out.push(StoredChange {
                    id: *id,
                    raw_payload: bytes.value().to_vec(),
                });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osc_core::crypto::Hash32;

    fn cid(byte: u8) -> Cid {
        Cid(Hash32([byte; 32]))
    }

    #[test]
    fn put_and_get_change_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChangeStore::open(dir.path()).unwrap();
        let space = SpaceId::new("s1");
        let tree = TreeId(cid(1));
        let change = StoredChange {
            id: cid(2),
            raw_payload: b"hello".to_vec(),
        };
        store.put_change(&space, &tree, &change).unwrap();
        let fetched = store.get_change(&space, &tree, &cid(2)).unwrap().unwrap();
        assert_eq!(fetched.raw_payload, b"hello");
        assert!(store.has_change(&space, &tree, &cid(2)).unwrap());
        assert!(!store.has_change(&space, &tree, &cid(3)).unwrap());
    }

    #[test]
    fn put_change_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChangeStore::open(dir.path()).unwrap();
        let space = SpaceId::new("s1");
        let tree = TreeId(cid(1));
        let change = StoredChange {
            id: cid(2),
            raw_payload: b"hello".to_vec(),
        };
        store.put_change(&space, &tree, &change).unwrap();
        store.put_change(&space, &tree, &change).unwrap();
        let ids = store.iterate_from(&space, &tree, None).unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn stored_ids_lists_tree_roots_per_space() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChangeStore::open(dir.path()).unwrap();
        let space = SpaceId::new("s1");
        let tree_a = TreeId(cid(1));
        let tree_b = TreeId(cid(5));
        store
            .put_change(&space, &tree_a, &StoredChange { id: cid(1), raw_payload: vec![] })
            .unwrap();
        store
            .put_change(&space, &tree_b, &StoredChange { id: cid(5), raw_payload: vec![] })
            .unwrap();
        let mut ids = store.stored_ids(&space).unwrap();
        ids.sort();
        let mut expected = vec![tree_a, tree_b];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn iterate_from_skips_changes_up_to_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChangeStore::open(dir.path()).unwrap();
        let space = SpaceId::new("s1");
        let tree = TreeId(cid(1));
        for i in 1..=4u8 {
            store
                .put_change(&space, &tree, &StoredChange { id: cid(i), raw_payload: vec![i] })
                .unwrap();
        }
        let after_2 = store.iterate_from(&space, &tree, Some(cid(2))).unwrap();
        assert_eq!(after_2.iter().map(|c| c.id).collect::<Vec<_>>(), vec![cid(3), cid(4)]);
    }

    #[test]
    fn quarantine_does_not_appear_in_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChangeStore::open(dir.path()).unwrap();
        let space = SpaceId::new("s1");
        let tree = TreeId(cid(1));
        let bad = StoredChange { id: cid(9), raw_payload: vec![9] };
        store.quarantine(&space, &tree, &bad).unwrap();
        assert!(!store.has_change(&space, &tree, &cid(9)).unwrap());
        assert!(store.iterate_from(&space, &tree, None).unwrap().is_empty());
    }
}
