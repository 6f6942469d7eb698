//! `Space` (§3.4, §4.10): one ACL tree plus the Unified Tree Manager's scope
//! for this `spaceId`, wired to a periodic `HeadSyncCycle` and an inbound
//! `TreeSyncer`. The four space types (`private`, `community`,
//! `community-readonly`, `admin`) share this same struct; they differ only
//! in which ACL policy and key-derivation index created them.

use std::sync::Arc;
use std::time::Duration;

use osc_core::ids::{AccountId, PeerId, SpaceId};
use osc_sync::{digest_heads, HeadSyncCycle, PeerTransport, SpaceReconciler, TreeSyncer};
use osc_tree::{ReadKeySource, WriterAuthorization};
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::acl_handle::AclHandle;
use crate::sync_handler::SpaceSyncHandler;
use crate::tree_manager::UnifiedTreeManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceType {
    Private,
    Community,
    CommunityReadonly,
    Admin,
}

/// Background tasks started at `Space::init` and stopped at `Space::close`
/// (§4.9: worker pools are persistent, not rebuilt per cycle).
struct RunningTasks {
    head_sync: Option<JoinHandle<()>>,
}

pub struct Space {
    pub space_id: SpaceId,
    pub space_type: SpaceType,
    pub acl: AclHandle,
    pub tree_manager: Arc<UnifiedTreeManager>,
    pub tree_syncer: Arc<TreeSyncer>,
    own_account: AccountId,
    transport: Arc<dyn PeerTransport>,
    tasks: RwLock<RunningTasks>,
}

impl Space {
    /// `Init` (§4.10): wires the ACL tree, tree manager, HeadSync cycle, and
    /// TreeSyncer pools for a space whose ACL chain is already loaded. The
    /// inbound `SyncMessageHandler` is built internally (`SpaceSyncHandler`)
    /// rather than injected — unlike `PeerTransport`, it's pure business
    /// logic over this space's own tree manager and ACL, not a networking
    /// concern that needs to stay swappable.
    pub fn init(
        space_id: SpaceId,
        space_type: SpaceType,
        own_account: AccountId,
        acl: AclHandle,
        tree_manager: Arc<UnifiedTreeManager>,
        transport: Arc<dyn PeerTransport>,
        sync_period: Duration,
    ) -> Arc<Self> {
        let handler = SpaceSyncHandler::new(space_id.clone(), tree_manager.clone(), acl.clone(), transport.clone());
        let tree_syncer = TreeSyncer::new(handler.clone());
        handler.bind_tree_syncer(tree_syncer.clone());
        let space = Arc::new(Self {
            space_id,
            space_type,
            acl,
            tree_manager,
            tree_syncer,
            own_account,
            transport: transport.clone(),
            tasks: RwLock::new(RunningTasks { head_sync: None }),
        });

        let reconciler: Arc<dyn SpaceReconciler> = space.clone();
        let cycle = Arc::new(HeadSyncCycle::new(reconciler, transport));
        let handle = cycle.spawn(sync_period);
        space.tasks.write().head_sync = Some(handle);
        space
    }

    pub fn auth(&self) -> Arc<dyn WriterAuthorization> {
        Arc::new(self.acl.clone())
    }

    pub fn keys(&self) -> Arc<dyn ReadKeySource> {
        Arc::new(self.acl.clone())
    }

    pub fn own_account(&self) -> &AccountId {
        &self.own_account
    }

    /// `Close` (§4.10): cancels HeadSync and evicts every tree for this
    /// space from the Unified Tree Manager. Idempotent.
    pub fn close(&self) {
        if let Some(handle) = self.tasks.write().head_sync.take() {
            handle.abort();
        }
        self.tree_manager.close(&self.space_id);
    }
}

impl Drop for Space {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait::async_trait]
impl SpaceReconciler for Space {
    fn space_id(&self) -> SpaceId {
        self.space_id.clone()
    }

    async fn reconcile_acl(&self, _peer: &PeerId) -> osc_sync::Result<()> {
        // ACL records arrive as AclRecord wire messages through the
        // TreeSyncer's request pool (`SyncMessageHandler`); this hook exists
        // so a future transport can request a push explicitly. Until then,
        // reconciliation is push-driven and this is a no-op gate.
        Ok(())
    }

    fn local_digest(&self) -> [u8; 32] {
        let pairs = self
            .tree_manager
            .space_tree_heads(&self.space_id)
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, space_id = %self.space_id, "failed to read tree heads for digest");
                Vec::new()
            });
        digest_heads(&pairs)
    }

    fn on_cycle_complete(&self) {
        self.tree_manager.note_head_sync_completed(&self.space_id);
    }
}

