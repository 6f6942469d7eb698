//! §8 scenario 5: a freshly joined member's own `SharedProfile` is visible
//! in the listing once it has been created and indexed.

use std::sync::Arc;

use async_trait::async_trait;

use osc_core::crypto::{Cid, Ed25519SigningKey, ReadKey};
use osc_core::error::Result as CoreResult;
use osc_core::ids::{AccountId, PeerId, ReadKeyId, SpaceId};
use osc_identity::SharedProfileManager;
use osc_space::{NoRemote, UnifiedTreeManager};
use osc_store::ChangeStore;
use osc_sync::wire::SyncWireMessage;
use osc_sync::PeerTransport;
use osc_tree::{ReadKeySource, WriterAuthorization};

struct AllowAll {
    acl_head: Cid,
}
impl WriterAuthorization for AllowAll {
    fn can_write(&self, _account: &AccountId, _acl_head_id: &Cid) -> bool {
        true
    }
    fn current_acl_head(&self) -> Cid {
        self.acl_head
    }
}

struct SingleKey {
    id: ReadKeyId,
    key: ReadKey,
}
impl ReadKeySource for SingleKey {
    fn read_key(&self, read_key_id: ReadKeyId) -> Option<ReadKey> {
        (read_key_id == self.id).then_some(self.key)
    }
    fn current_read_key(&self) -> (ReadKeyId, ReadKey) {
        (self.id, self.key)
    }
}

struct NullTransport;
#[async_trait]
impl PeerTransport for NullTransport {
    async fn send(&self, _peer: &PeerId, _message: SyncWireMessage) -> CoreResult<()> {
        Ok(())
    }
    async fn broadcast(&self, _peers: &[PeerId], _message: SyncWireMessage) -> CoreResult<()> {
        Ok(())
    }
    async fn connected_peers(&self) -> Vec<PeerId> {
        Vec::new()
    }
}

#[tokio::test]
async fn newly_created_profile_is_visible_in_the_listing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ChangeStore::open(dir.path()).unwrap());
    let transport: Arc<dyn PeerTransport> = Arc::new(NullTransport);
    let tree_manager = Arc::new(UnifiedTreeManager::new(store, transport, Arc::new(NoRemote), 10));
    let auth: Arc<dyn WriterAuthorization> = Arc::new(AllowAll {
        acl_head: Cid::of_bytes(b"acl-genesis"),
    });
    let keys: Arc<dyn ReadKeySource> = Arc::new(SingleKey {
        id: ReadKeyId(0),
        key: ReadKey([7u8; 32]),
    });
    let space_id = SpaceId::new("community-1");
    let signing_key = Ed25519SigningKey::from_bytes([3u8; 32]);
    let member = AccountId::new("member-a");
    let acl_head = auth.current_acl_head();

    let profiles = SharedProfileManager::new(tree_manager, space_id);

    assert!(profiles.list(auth.clone(), keys.clone()).await.unwrap().is_empty());

    profiles
        .upsert(
            &member,
            "Member A".into(),
            "hello".into(),
            None,
            vec!["https://example.com/a".into()],
            acl_head,
            &signing_key,
            1,
            auth.clone(),
            keys.clone(),
            &[],
        )
        .await
        .unwrap();

    let listed = profiles.list(auth.clone(), keys.clone()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].display_name, "Member A");

    let fetched = profiles.get(&member, auth, keys).await.unwrap();
    assert_eq!(fetched, listed[0]);
}
