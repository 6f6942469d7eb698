//! Concrete `SyncMessageHandler` (§4.3, §4.8, §4.9): routes every inbound
//! wire message into the Unified Tree Manager's cache, so a `HeadUpdate` or
//! `FullSyncResponse` a peer sends is immediately visible to whatever reader
//! is already holding that `treeId`'s cached `SyncTree`.
//!
//! Bound to a single space at construction, same as `TreeSyncer`/
//! `HeadSyncCycle` are — `FullSyncRequest`/`FullSyncResponse` carry no
//! `spaceId` on the wire, so the handler's own `space_id` supplies it.

use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use osc_core::ids::{PeerId, SpaceId, TreeId};
use osc_sync::wire::{DiffRange, FullSyncResponse, SyncWireMessage, SyncWirePayload};
use osc_sync::{digest_heads, PeerTransport, Result as SyncResult, SyncError, SyncMessageHandler, TreeSyncer};
use osc_tree::Change;

use crate::acl_handle::AclHandle;
use crate::tree_manager::UnifiedTreeManager;

pub struct SpaceSyncHandler {
    space_id: SpaceId,
    tree_manager: Arc<UnifiedTreeManager>,
    acl: AclHandle,
    transport: Arc<dyn PeerTransport>,
    /// Set once `TreeSyncer::new` returns; `TreeSyncer` needs this handler
    /// as a constructor argument, so the two can't be built in one step.
    tree_syncer: OnceLock<Arc<TreeSyncer>>,
}

impl SpaceSyncHandler {
    pub fn new(space_id: SpaceId, tree_manager: Arc<UnifiedTreeManager>, acl: AclHandle, transport: Arc<dyn PeerTransport>) -> Arc<Self> {
        Arc::new(Self {
            space_id,
            tree_manager,
            acl,
            transport,
            tree_syncer: OnceLock::new(),
        })
    }

    /// Called once by `Space::init` right after the `TreeSyncer` it was
    /// built with comes back, so `HeadSyncResponse` handling can drive
    /// `TreeSyncer::sync_all`.
    pub fn bind_tree_syncer(&self, tree_syncer: Arc<TreeSyncer>) {
        let _ = self.tree_syncer.set(tree_syncer);
    }

    fn auth(&self) -> Arc<dyn osc_tree::WriterAuthorization> {
        Arc::new(self.acl.clone())
    }

    fn keys(&self) -> Arc<dyn osc_tree::ReadKeySource> {
        Arc::new(self.acl.clone())
    }

    async fn handle_head_update(&self, update: osc_sync::wire::HeadUpdate) -> SyncResult<()> {
        let tree = self
            .tree_manager
            .get_tree(&update.space_id, update.tree_id, self.auth(), self.keys())
            .await?;
        let result = tree.lock().await.apply_head_update(update)?;
        if let Some(syncer) = self.tree_syncer.get() {
            syncer.counters().heads_applied.fetch_add(1, Ordering::Relaxed);
            if !result.added.is_empty() {
                syncer.counters().trees_changed.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    async fn handle_full_sync_response(&self, response: FullSyncResponse) -> SyncResult<()> {
        let tree = self
            .tree_manager
            .get_tree(&self.space_id, response.tree_id, self.auth(), self.keys())
            .await?;
        let result = tree.lock().await.apply_full_sync_batch(response.changes)?;
        if let Some(syncer) = self.tree_syncer.get() {
            syncer.counters().heads_applied.fetch_add(1, Ordering::Relaxed);
            if !result.added.is_empty() {
                syncer.counters().trees_changed.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Answers a `FullSyncRequest` with every change this replica has
    /// stored for the tree. The requester's `add_raw_changes_from_peer`
    /// already skips anything it has attached, so this does not need to
    /// diff against the requester's declared `heads` first.
    async fn handle_full_sync_request(&self, peer: PeerId, request: osc_sync::wire::FullSyncRequest) -> SyncResult<()> {
        let stored = self.tree_manager.store().iterate_from(&self.space_id, &request.tree_id, None)?;
        let changes: std::result::Result<Vec<Change>, _> = stored.iter().map(|s| Change::decode(&s.raw_payload)).collect();
        let changes = changes.map_err(SyncError::from)?;
        let message = SyncWireMessage::new(SyncWirePayload::FullSyncResponse(FullSyncResponse {
            tree_id: request.tree_id,
            batch_seq: 0,
            changes,
            is_final: true,
        }));
        self.transport.send(&peer, message).await.map_err(SyncError::from)
    }

    /// Answers a `HeadSyncRequest`: if the caller's ldiff hash matches ours
    /// there's nothing to report; otherwise a per-tree head hash goes back
    /// so the requester can classify missing vs. changed trees itself.
    async fn handle_head_sync_request(&self, peer: PeerId, request: osc_sync::wire::HeadSyncRequest) -> SyncResult<()> {
        let pairs = self.tree_manager.space_tree_heads(&self.space_id).map_err(SyncError::from)?;
        if digest_heads(&pairs) == request.ldiff_hash {
            return Ok(());
        }
        let diff_ranges: Vec<DiffRange> = pairs
            .into_iter()
            .map(|(tree_id, heads)| DiffRange {
                tree_id,
                remote_heads_hash: digest_heads(&[(tree_id, heads)]),
            })
            .collect();
        let message = SyncWireMessage::new(SyncWirePayload::HeadSyncResponse(osc_sync::wire::HeadSyncResponse {
            space_id: self.space_id.clone(),
            diff_ranges,
        }));
        self.transport.send(&peer, message).await.map_err(SyncError::from)
    }

    /// Classifies the peer's `DiffRange`s against our own stored heads into
    /// `missingIds`/`existingIds` and hands them to `TreeSyncer::sync_all`
    /// (§4.8 step 3, §4.9 `SyncAll`). A tree with no stored heads at all is
    /// missing; one whose local head hash differs is existing-but-changed;
    /// a matching hash needs no work.
    async fn handle_head_sync_response(&self, peer: PeerId, response: osc_sync::wire::HeadSyncResponse) -> SyncResult<()> {
        if let Some(syncer) = self.tree_syncer.get() {
            syncer
                .counters()
                .heads_received
                .fetch_add(response.diff_ranges.len() as u64, Ordering::Relaxed);
        }

        let store = self.tree_manager.store();
        let mut missing: Vec<TreeId> = Vec::new();
        let mut existing: Vec<TreeId> = Vec::new();
        for range in &response.diff_ranges {
            let local_heads = store.get_heads(&self.space_id, &range.tree_id).map_err(SyncError::from)?;
            if local_heads.is_empty() {
                missing.push(range.tree_id);
                continue;
            }
            let local_hash = digest_heads(&[(range.tree_id, local_heads)]);
            if local_hash != range.remote_heads_hash {
                existing.push(range.tree_id);
            }
        }

        if let Some(syncer) = self.tree_syncer.get() {
            syncer.sync_all(peer, existing, missing);
        }
        Ok(())
    }
}

#[async_trait]
impl SyncMessageHandler for SpaceSyncHandler {
    async fn handle(&self, peer: PeerId, message: SyncWireMessage) -> SyncResult<()> {
        match message.payload {
            SyncWirePayload::HeadUpdate(update) => self.handle_head_update(update).await,
            SyncWirePayload::FullSyncResponse(response) => self.handle_full_sync_response(response).await,
            SyncWirePayload::FullSyncRequest(request) => self.handle_full_sync_request(peer, request).await,
            SyncWirePayload::HeadSyncRequest(request) => self.handle_head_sync_request(peer, request).await,
            SyncWirePayload::HeadSyncResponse(response) => self.handle_head_sync_response(peer, response).await,
            // ACL reconciliation is push-driven today (see `Space::reconcile_acl`);
            // a bootstrap `SpaceHeader` has nothing to act on once a space is
            // already initialized.
            SyncWirePayload::AclRecord(_) | SyncWirePayload::SpaceHeader(_) => Ok(()),
        }
    }

    async fn build_sync_tree_or_get_remote(&self, peer: PeerId, tree_id: TreeId) -> SyncResult<()> {
        let message = SyncWireMessage::new(SyncWirePayload::FullSyncRequest(osc_sync::wire::FullSyncRequest {
            tree_id,
            heads: Vec::new(),
            snapshot_path: Vec::new(),
        }));
        self.transport.send(&peer, message).await.map_err(SyncError::from)
    }

    async fn sync_with_peer(&self, peer: PeerId, tree_id: TreeId) -> SyncResult<()> {
        let heads = self.tree_manager.store().get_heads(&self.space_id, &tree_id).map_err(SyncError::from)?;
        let message = SyncWireMessage::new(SyncWirePayload::FullSyncRequest(osc_sync::wire::FullSyncRequest {
            tree_id,
            heads,
            snapshot_path: Vec::new(),
        }));
        self.transport.send(&peer, message).await.map_err(SyncError::from)
    }
}
