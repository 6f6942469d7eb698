//! `SyncTree`: wraps an in-memory `ObjectTree` with the Change Store and
//! peer broadcast so a committed write is durable and announced before the
//! caller's method returns (§4.3 persist-then-broadcast-then-fanout).

use std::sync::Arc;

use osc_core::ids::{AccountId, PeerId, SpaceId};
use osc_store::{ChangeStore, StoredChange};
use osc_tree::{AddResult, Change, ObjectTree, ReadKeySource, TreeRootHeader, WriterAuthorization};

use crate::error::{Result, SyncError};
use crate::transport::PeerTransport;
use crate::wire::{HeadUpdate, RootHeaderWire, SyncWireMessage, SyncWirePayload};

/// Owns one `ObjectTree`'s full lifecycle: local writes persist to the
/// Change Store before the wire broadcast goes out, and incoming peer
/// batches persist before they're folded into the in-memory DAG.
pub struct SyncTree {
    space_id: SpaceId,
    tree: ObjectTree,
    store: Arc<ChangeStore>,
    transport: Arc<dyn PeerTransport>,
    auth: Arc<dyn WriterAuthorization>,
    keys: Arc<dyn ReadKeySource>,
}

impl SyncTree {
    pub fn new(
        space_id: SpaceId,
        tree: ObjectTree,
        store: Arc<ChangeStore>,
        transport: Arc<dyn PeerTransport>,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
    ) -> Self {
        Self {
            space_id,
            tree,
            store,
            transport,
            auth,
            keys,
        }
    }

    pub fn tree(&self) -> &ObjectTree {
        &self.tree
    }

    /// Wraps a freshly-sealed root change: builds the `ObjectTree`, persists
    /// the root, and leaves broadcast to a subsequent `announce_root` call
    /// (`UnifiedTreeManager::CreateObjectTree` registers the tree in its
    /// indices between the two so a `HeadUpdate` for a tree nobody can look
    /// up yet is never observable).
    pub fn from_new_root(
        space_id: SpaceId,
        root: Change,
        header: TreeRootHeader,
        snapshot_interval: u32,
        store: Arc<ChangeStore>,
        transport: Arc<dyn PeerTransport>,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
    ) -> Result<Self> {
        let tree = ObjectTree::new(root.clone(), header, snapshot_interval).map_err(SyncError::from)?;
        let sync_tree = Self::new(space_id, tree, store, transport, auth, keys);
        let stored = StoredChange {
            id: root.id,
            raw_payload: root.encode().map_err(SyncError::from)?,
        };
        sync_tree
            .store
            .put_change(&sync_tree.space_id, &sync_tree.tree.id(), &stored)
            .map_err(SyncError::from)?;
        sync_tree
            .store
            .put_heads(&sync_tree.space_id, &sync_tree.tree.id(), &sync_tree.tree.heads())
            .map_err(SyncError::from)?;
        Ok(sync_tree)
    }

    /// Unconditionally broadcasts the tree's root as a `HeadUpdate`, for a
    /// just-created tree that every peer must learn about regardless of
    /// whether any content has been added yet (§4.7 `CreateObjectTree`).
    pub async fn announce_root(&self, peers: &[PeerId]) -> Result<()> {
        let result = AddResult {
            old_heads: Default::default(),
            new_heads: self.tree.heads().into_iter().collect(),
            added: vec![self.tree.id().0],
            mode: osc_tree::AddMode::Append,
        };
        self.broadcast(&result, peers).await
    }

    fn persist(&self, ids: &[osc_core::crypto::Cid]) -> Result<()> {
        for id in ids {
            let change = self
                .tree
                .get_change(id)
                .expect("just-added change must be attached");
            let stored = StoredChange {
                id: *id,
                raw_payload: change.encode().map_err(SyncError::from)?,
            };
            self.store
                .put_change(&self.space_id, &self.tree.id(), &stored)
                .map_err(SyncError::from)?;
        }
        self.store
            .put_heads(&self.space_id, &self.tree.id(), &self.tree.heads())
            .map_err(SyncError::from)?;
        Ok(())
    }

    async fn broadcast(&self, result: &AddResult, peers: &[PeerId]) -> Result<()> {
        if result.added.is_empty() || peers.is_empty() {
            return Ok(());
        }
        let changes: Vec<Change> = result
            .added
            .iter()
            .map(|id| self.tree.get_change(id).unwrap().clone())
            .collect();
        let root_header = if result.old_heads.is_empty() {
            Some(RootHeaderWire {
                object_id: self.tree.header().object_id.clone(),
                object_type: self.tree.header().object_type.clone(),
            })
        } else {
            None
        };
        let message = SyncWireMessage::new(SyncWirePayload::HeadUpdate(HeadUpdate {
            space_id: self.space_id.clone(),
            tree_id: self.tree.id(),
            heads: self.tree.heads(),
            changes,
            snapshot_path: self.tree.snapshot_path().to_vec(),
            root_header,
        }));
        self.transport
            .broadcast(peers, message)
            .await
            .map_err(SyncError::from)
    }

    /// Authors, persists, and broadcasts a local write. Mirrors
    /// `ObjectTree::add_content` but adds the durability and fanout steps.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_content(
        &mut self,
        author: &AccountId,
        data_type: String,
        plaintext: Vec<u8>,
        is_snapshot: bool,
        timestamp: i64,
        signing_key: &osc_core::crypto::Ed25519SigningKey,
        peers: &[PeerId],
    ) -> Result<AddResult> {
        let result = self
            .tree
            .add_content(
                author,
                data_type,
                plaintext,
                is_snapshot,
                timestamp,
                signing_key,
                self.auth.as_ref(),
                self.keys.as_ref(),
            )
            .map_err(SyncError::from)?;
        self.persist(&result.added)?;
        self.broadcast(&result, peers).await?;
        Ok(result)
    }

    /// Applies a peer-originated `HeadUpdate`: persists every newly attached
    /// change before the in-memory DAG is updated so a crash mid-apply never
    /// loses a change the peer believes we have.
    pub fn apply_head_update(&mut self, update: HeadUpdate) -> Result<AddResult> {
        for change in &update.changes {
            change.verify().map_err(SyncError::from)?;
        }
        let result = self
            .tree
            .add_raw_changes_from_peer(update.changes)
            .map_err(SyncError::from)?;
        self.persist(&result.added)?;
        Ok(result)
    }

    /// Applies a batch from a `FullSyncResponse`, used during bootstrap or
    /// after a `HeadSync` diff identifies a gap.
    pub fn apply_full_sync_batch(&mut self, changes: Vec<Change>) -> Result<AddResult> {
        for change in &changes {
            change.verify().map_err(SyncError::from)?;
        }
        let result = self
            .tree
            .add_raw_changes_from_peer(changes)
            .map_err(SyncError::from)?;
        self.persist(&result.added)?;
        Ok(result)
    }
}
