//! The Unified Tree Manager (§4.7): the single cache the sync plane and the
//! application plane both read and write through, so a `HeadUpdate` applied
//! by the sync protocol is immediately visible to an HTTP read handler
//! holding the same `treeId`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use osc_core::backoff::Backoff;
use osc_core::crypto::{Cid, Ed25519SigningKey};
use osc_core::error::{CoreError, Result};
use osc_core::ids::{ObjectId, PeerId, SpaceId, TreeId};
use osc_store::{ChangeStore, StoredChange};
use osc_sync::{PeerTransport, SyncTree};
use osc_tree::{Change, ObjectTree, ReadKeySource, TreeRootHeader, WriterAuthorization};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;

/// Fetches a tree this replica has never stored, from a coordinator or peer.
/// Injected so `osc-space` never imports a networking stack directly (§9).
#[async_trait]
pub trait RemoteTreeSource: Send + Sync {
    async fn fetch_tree(&self, space: &SpaceId, tree: &TreeId) -> Result<Option<Vec<Change>>>;
}

/// A `RemoteTreeSource` that always reports the tree as unavailable, for
/// configurations (tests, a single-node daemon) with no peer to ask.
pub struct NoRemote;

#[async_trait]
impl RemoteTreeSource for NoRemote {
    async fn fetch_tree(&self, _space: &SpaceId, _tree: &TreeId) -> Result<Option<Vec<Change>>> {
        Ok(None)
    }
}

/// One live tree instance plus the accounting the manager needs to decide
/// when a space has "enough" trees for `WaitForSync` to succeed.
struct Entry {
    sync_tree: Arc<AsyncMutex<SyncTree>>,
}

#[derive(Default)]
struct Indices {
    by_tree_id: HashMap<TreeId, Entry>,
    by_space: HashMap<SpaceId, HashSet<TreeId>>,
    by_object_id: HashMap<(SpaceId, ObjectId), TreeId>,
}

/// Single owner of every live `SyncTree`, keyed only by `treeId` (§9: no
/// secondary cache keyed by anything else, and reads never evict).
pub struct UnifiedTreeManager {
    store: Arc<ChangeStore>,
    transport: Arc<dyn PeerTransport>,
    remote: Arc<dyn RemoteTreeSource>,
    snapshot_interval: u32,
    indices: RwLock<Indices>,
    /// One head-sync completion timestamp per space, used by `WaitForSync`.
    last_head_sync: Mutex<HashMap<SpaceId, Instant>>,
}

impl UnifiedTreeManager {
    pub fn new(
        store: Arc<ChangeStore>,
        transport: Arc<dyn PeerTransport>,
        remote: Arc<dyn RemoteTreeSource>,
        snapshot_interval: u32,
    ) -> Self {
        Self {
            store,
            transport,
            remote,
            snapshot_interval,
            indices: RwLock::new(Indices::default()),
            last_head_sync: Mutex::new(HashMap::new()),
        }
    }

    /// Called by `HeadSyncCycle` (or a test) once a reconciliation pass
    /// completes for a space, so `WaitForSync`'s second condition can be met.
    pub fn note_head_sync_completed(&self, space_id: &SpaceId) {
        self.last_head_sync.lock().insert(space_id.clone(), Instant::now());
    }

    /// Shared handle to the backing Change Store, for callers (the space
    /// layer's sync handler) that need to read heads or replay changes
    /// directly rather than through a cached `SyncTree`.
    pub fn store(&self) -> Arc<ChangeStore> {
        self.store.clone()
    }

    /// Every `(treeId, heads)` pair stored for `space_id`, sorted by
    /// `TreeId` so `osc_sync::digest_heads` produces the same hash
    /// regardless of storage iteration order (§4.8 ldiff input).
    pub fn space_tree_heads(&self, space_id: &SpaceId) -> Result<Vec<(TreeId, Vec<Cid>)>> {
        let mut pairs = Vec::new();
        for tree_id in self.store.stored_ids(space_id)? {
            let heads = self.store.get_heads(space_id, &tree_id)?;
            pairs.push((tree_id, heads));
        }
        pairs.sort_by_key(|(tree_id, _)| *tree_id);
        Ok(pairs)
    }

    fn register(
        &self,
        space_id: &SpaceId,
        tree_id: TreeId,
        object_id: ObjectId,
        sync_tree: SyncTree,
    ) -> Arc<AsyncMutex<SyncTree>> {
        let handle = Arc::new(AsyncMutex::new(sync_tree));
        let mut indices = self.indices.write();
        indices.by_tree_id.insert(
            tree_id,
            Entry {
                sync_tree: handle.clone(),
            },
        );
        indices.by_space.entry(space_id.clone()).or_default().insert(tree_id);
        indices.by_object_id.insert((space_id.clone(), object_id), tree_id);
        handle
    }

    /// Returns the cached instance for `tree_id`, building it from local
    /// storage (or fetching remotely) on first access. Every caller for a
    /// given `tree_id` receives the same `Arc`.
    pub async fn get_tree(
        &self,
        space_id: &SpaceId,
        tree_id: TreeId,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
    ) -> Result<Arc<AsyncMutex<SyncTree>>> {
        if let Some(entry) = self.indices.read().by_tree_id.get(&tree_id) {
            return Ok(entry.sync_tree.clone());
        }

        let stored = self.store.iterate_from(space_id, &tree_id, None)?;
        let sync_tree = if !stored.is_empty() {
            self.rebuild_from_stored(space_id, tree_id, stored, auth, keys)?
        } else {
            match self.remote.fetch_tree(space_id, &tree_id).await? {
                Some(changes) if !changes.is_empty() => {
                    self.rebuild_from_remote(space_id, tree_id, changes, auth, keys)?
                }
                _ => {
                    return Err(CoreError::not_found(format!(
                        "tree {tree_id} not found locally or remotely in space {space_id}"
                    )))
                }
            }
        };

        let object_id = ObjectId::new(sync_tree.tree().header().object_id.clone());
        Ok(self.register(space_id, tree_id, object_id, sync_tree))
    }

    fn rebuild_from_stored(
        &self,
        space_id: &SpaceId,
        tree_id: TreeId,
        stored: Vec<StoredChange>,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
    ) -> Result<SyncTree> {
        let mut changes: Vec<Change> = stored
            .iter()
            .map(|s| Change::decode(&s.raw_payload))
            .collect::<std::result::Result<_, _>>()?;
        let root_pos = changes
            .iter()
            .position(|c| c.id == tree_id.0)
            .ok_or_else(|| CoreError::corruption(format!("tree {tree_id} has no stored root change")))?;
        let root = changes.remove(root_pos);
        let header: TreeRootHeader = osc_core::serialization::from_slice(&root.data)?;
        let object_tree = ObjectTree::new(root, header, self.snapshot_interval)?;
        let mut sync_tree = SyncTree::new(
            space_id.clone(),
            object_tree,
            self.store.clone(),
            self.transport.clone(),
            auth,
            keys,
        );
        if !changes.is_empty() {
            sync_tree.apply_full_sync_batch(changes)?;
        }
        Ok(sync_tree)
    }

    fn rebuild_from_remote(
        &self,
        space_id: &SpaceId,
        tree_id: TreeId,
        mut changes: Vec<Change>,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
    ) -> Result<SyncTree> {
        let root_pos = changes
            .iter()
            .position(|c| c.id == tree_id.0)
            .ok_or_else(|| CoreError::not_found(format!("remote tree {tree_id} missing its own root")))?;
        let root = changes.remove(root_pos);
        root.verify()?;
        let header: TreeRootHeader = osc_core::serialization::from_slice(&root.data)?;
        let object_tree = ObjectTree::new(root.clone(), header, self.snapshot_interval)?;
        let mut sync_tree = SyncTree::new(
            space_id.clone(),
            object_tree,
            self.store.clone(),
            self.transport.clone(),
            auth,
            keys,
        );
        self.store.put_change(
            space_id,
            &tree_id,
            &StoredChange {
                id: root.id,
                raw_payload: root.encode()?,
            },
        )?;
        if !changes.is_empty() {
            sync_tree.apply_full_sync_batch(changes)?;
        }
        Ok(sync_tree)
    }

    /// Atomically creates a brand-new object tree: seals the root, persists
    /// it, registers it in all three indices, and broadcasts it, failing
    /// with `ErrAlreadyExists` if `object_id` is already mapped in this space.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_object_tree(
        &self,
        space_id: &SpaceId,
        object_id: ObjectId,
        object_type: String,
        acl_head_id: Cid,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<Arc<AsyncMutex<SyncTree>>> {
        {
            let indices = self.indices.read();
            if indices.by_object_id.contains_key(&(space_id.clone(), object_id.clone())) {
                return Err(CoreError::conflict(format!(
                    "object {object_id} already exists in space {space_id}"
                )));
            }
        }

        let header = TreeRootHeader {
            object_id: object_id.0.clone(),
            object_type,
        };
        let header_bytes = osc_core::serialization::to_vec(&header)?;
        let root = Change::seal(
            BTreeSet::new(),
            acl_head_id,
            None,
            false,
            0,
            timestamp,
            None,
            "root".into(),
            header_bytes,
            signing_key,
        )?;
        let tree_id = TreeId(root.id);

        let sync_tree = SyncTree::from_new_root(
            space_id.clone(),
            root,
            header,
            self.snapshot_interval,
            self.store.clone(),
            self.transport.clone(),
            auth,
            keys,
        )?;
        sync_tree.announce_root(peers).await?;

        Ok(self.register(space_id, tree_id, object_id, sync_tree))
    }

    /// Scans every stored tree root for `space_id` and populates
    /// `byObjectId` without loading each tree fully into the cache.
    pub fn build_space_index(&self, space_id: &SpaceId) -> Result<()> {
        for tree_id in self.store.stored_ids(space_id)? {
            if self.indices.read().by_tree_id.contains_key(&tree_id) {
                continue;
            }
            if let Some(stored) = self.store.get_change(space_id, &tree_id, &tree_id.0)? {
                let root = Change::decode(&stored.raw_payload)?;
                let header: TreeRootHeader = osc_core::serialization::from_slice(&root.data)?;
                let object_id = ObjectId::new(header.object_id);
                self.indices
                    .write()
                    .by_object_id
                    .insert((space_id.clone(), object_id), tree_id);
            }
        }
        Ok(())
    }

    pub fn tree_id_for_object(&self, space_id: &SpaceId, object_id: &ObjectId) -> Option<TreeId> {
        self.indices.read().by_object_id.get(&(space_id.clone(), object_id.clone())).copied()
    }

    /// Lists every `objectId` indexed for `space_id` whose string starts
    /// with `prefix`, the `GET /profiles/{type}`-style listing routes need
    /// (§6.2) since `byObjectId` has no secondary index by `objectType`.
    pub fn object_ids_with_prefix(&self, space_id: &SpaceId, prefix: &str) -> Vec<ObjectId> {
        self.indices
            .read()
            .by_object_id
            .keys()
            .filter(|(space, object_id)| space == space_id && object_id.0.starts_with(prefix))
            .map(|(_, object_id)| object_id.clone())
            .collect()
    }

    /// Looks up the tree for an application-level `objectId` and loads it,
    /// the lookup Object Managers need for every `GET`/`PUT` keyed by id
    /// rather than by `treeId` (§6.2).
    pub async fn get_tree_for_object(
        &self,
        space_id: &SpaceId,
        object_id: &ObjectId,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
    ) -> Result<Arc<AsyncMutex<SyncTree>>> {
        let tree_id = self.tree_id_for_object(space_id, object_id).ok_or_else(|| {
            CoreError::not_found(format!("object {object_id} not found in space {space_id}"))
        })?;
        self.get_tree(space_id, tree_id, auth, keys).await
    }

    pub fn tree_count(&self, space_id: &SpaceId) -> usize {
        self.indices
            .read()
            .by_space
            .get(space_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// Blocks until `space_id` has at least `min_trees` indexed AND one
    /// `HeadSync` cycle has completed for it, backing off from 200ms to a
    /// 5s cap, bounded by `timeout` (§4.7).
    pub async fn wait_for_sync(&self, space_id: &SpaceId, min_trees: usize, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut backoff = Backoff::wait_for_sync();
        loop {
            let have_trees = self.tree_count(space_id) >= min_trees;
            let have_head_sync = self.last_head_sync.lock().contains_key(space_id);
            if have_trees && have_head_sync {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CoreError::timeout(format!(
                    "wait_for_sync({space_id}, min_trees={min_trees}) exceeded {timeout:?}"
                )));
            }
            tokio::time::sleep(backoff.next_delay()).await;
        }
    }

    /// Evicts every tree cached for `space_id`. Idempotent.
    pub fn close(&self, space_id: &SpaceId) {
        let mut indices = self.indices.write();
        if let Some(tree_ids) = indices.by_space.remove(space_id) {
            for tree_id in tree_ids {
                indices.by_tree_id.remove(&tree_id);
            }
        }
        indices.by_object_id.retain(|(space, _), _| space != space_id);
        self.last_head_sync.lock().remove(space_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osc_acl::AclTree;
    use osc_core::crypto::ReadKey;
    use osc_core::ids::AccountId;

    struct NoopTransport;

    #[async_trait]
    impl PeerTransport for NoopTransport {
        async fn send(&self, _peer: &PeerId, _message: osc_sync::wire::SyncWireMessage) -> Result<()> {
            Ok(())
        }

        async fn broadcast(&self, _peers: &[PeerId], _message: osc_sync::wire::SyncWireMessage) -> Result<()> {
            Ok(())
        }

        async fn connected_peers(&self) -> Vec<PeerId> {
            Vec::new()
        }
    }

    fn test_manager() -> (UnifiedTreeManager, SpaceId, Arc<crate::AclHandle>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChangeStore::open(dir.path()).unwrap());
        let manager = UnifiedTreeManager::new(store, Arc::new(NoopTransport), Arc::new(NoRemote), 50);

        let space_id = SpaceId::new("test-space");
        let signing_key = Ed25519SigningKey::from_bytes([3u8; 32]);
        let owner = AccountId("owner".to_string());
        let owner_secret = x25519_dalek::StaticSecret::random_from_rng(rand_core::OsRng);
        let acl = AclTree::init(owner, ReadKey([9u8; 32]), owner_secret, &signing_key, 1000).unwrap();
        let handle = Arc::new(crate::AclHandle::new(acl));

        (manager, space_id, handle)
    }

    #[tokio::test]
    async fn creating_a_duplicate_object_id_conflicts() {
        let (manager, space_id, acl) = test_manager();
        let signing_key = Ed25519SigningKey::from_bytes([4u8; 32]);
        let object_id = ObjectId::new("profile-alice");

        manager
            .create_object_tree(
                &space_id,
                object_id.clone(),
                "Profile".to_string(),
                acl.current_acl_head(),
                &signing_key,
                1001,
                acl.clone(),
                acl.clone(),
                &[],
            )
            .await
            .unwrap();

        let err = manager
            .create_object_tree(
                &space_id,
                object_id,
                "Profile".to_string(),
                acl.current_acl_head(),
                &signing_key,
                1002,
                acl.clone(),
                acl,
                &[],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn get_tree_for_object_reports_not_found_before_creation() {
        let (manager, space_id, acl) = test_manager();
        let err = manager
            .get_tree_for_object(&space_id, &ObjectId::new("missing"), acl.clone(), acl)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn object_ids_with_prefix_filters_by_kind_and_space() {
        let (manager, space_id, acl) = test_manager();
        let signing_key = Ed25519SigningKey::from_bytes([5u8; 32]);
        let other_space = SpaceId::new("other-space");

        for (space, id) in [
            (&space_id, "Profile-alice"),
            (&space_id, "Profile-bob"),
            (&space_id, "Channel-general"),
            (&other_space, "Profile-carol"),
        ] {
            manager
                .create_object_tree(
                    space,
                    ObjectId::new(id),
                    "whatever".to_string(),
                    acl.current_acl_head(),
                    &signing_key,
                    1003,
                    acl.clone(),
                    acl.clone(),
                    &[],
                )
                .await
                .unwrap();
        }

        let mut profiles = manager.object_ids_with_prefix(&space_id, "Profile-");
        profiles.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(profiles, vec![ObjectId::new("Profile-alice"), ObjectId::new("Profile-bob")]);
        assert_eq!(manager.tree_count(&space_id), 3);
    }

    #[tokio::test]
    async fn tree_survives_a_round_trip_through_the_change_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChangeStore::open(dir.path()).unwrap());
        let space_id = SpaceId::new("test-space");
        let signing_key = Ed25519SigningKey::from_bytes([6u8; 32]);
        let owner = AccountId("owner".to_string());
        let owner_secret = x25519_dalek::StaticSecret::random_from_rng(rand_core::OsRng);
        let acl = Arc::new(crate::AclHandle::new(
            AclTree::init(owner, ReadKey([2u8; 32]), owner_secret, &signing_key, 1000).unwrap(),
        ));

        let manager = UnifiedTreeManager::new(store.clone(), Arc::new(NoopTransport), Arc::new(NoRemote), 50);
        let object_id = ObjectId::new("profile-dana");
        manager
            .create_object_tree(&space_id, object_id.clone(), "Profile".to_string(), acl.current_acl_head(), &signing_key, 1004, acl.clone(), acl.clone(), &[])
            .await
            .unwrap();
        let tree_id = manager.tree_id_for_object(&space_id, &object_id).unwrap();

        let reopened = UnifiedTreeManager::new(store, Arc::new(NoopTransport), Arc::new(NoRemote), 50);
        let handle = reopened.get_tree(&space_id, tree_id, acl.clone(), acl).await.unwrap();
        let sync_tree = handle.lock().await;
        assert_eq!(sync_tree.tree().header().object_id, "profile-dana");
    }
}
