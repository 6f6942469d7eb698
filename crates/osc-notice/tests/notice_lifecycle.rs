//! §8 scenario 4: publish, re-publish rejected, archive, publish-after-
//! archive rejected.

use std::sync::Arc;

use async_trait::async_trait;

use osc_core::crypto::{Cid, Ed25519SigningKey, ReadKey};
use osc_core::error::Result as CoreResult;
use osc_core::ids::{AccountId, ObjectId, PeerId, ReadKeyId, SpaceId};
use osc_notice::{LifecycleState, NoticeIndex, NoticeManager, NoticeView};
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
async fn publish_then_archive_then_reject_further_transitions() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ChangeStore::open(dir.path()).unwrap());
    let transport: Arc<dyn PeerTransport> = Arc::new(NullTransport);
    let tree_manager = Arc::new(UnifiedTreeManager::new(store, transport, Arc::new(NoRemote), 10));
    let auth: Arc<dyn WriterAuthorization> = Arc::new(AllowAll {
        acl_head: Cid::of_bytes(b"acl-genesis"),
    });
    let keys: Arc<dyn ReadKeySource> = Arc::new(SingleKey {
        id: ReadKeyId(0),
        key: ReadKey([9u8; 32]),
    });
    let space_id = SpaceId::new("community-1");
    let signing_key = Ed25519SigningKey::from_bytes([4u8; 32]);
    let issuer = AccountId::new("issuer");
    let acl_head = auth.current_acl_head();

    let index = Arc::new(NoticeIndex::new());
    let notices = NoticeManager::new(tree_manager, space_id, index);
    let notice_id = ObjectId::new("N");

    notices
        .create(
            notice_id.clone(),
            "event".into(),
            "X".into(),
            "Y".into(),
            "body".into(),
            Some(1_000),
            acl_head,
            &issuer,
            &signing_key,
            1,
            auth.clone(),
            keys.clone(),
            &[],
        )
        .await
        .unwrap();

    let state = notices.state(&notice_id, auth.clone(), keys.clone()).await.unwrap();
    assert_eq!(state.state, LifecycleState::Draft);

    notices.publish(&notice_id, &issuer, false, &signing_key, 2, auth.clone(), keys.clone(), &[]).await.unwrap();
    let state = notices.state(&notice_id, auth.clone(), keys.clone()).await.unwrap();
    assert_eq!(state.state, LifecycleState::Published);

    let republish = notices.publish(&notice_id, &issuer, false, &signing_key, 3, auth.clone(), keys.clone(), &[]).await;
    assert!(republish.is_err());

    notices.archive(&notice_id, &issuer, false, &signing_key, 4, auth.clone(), keys.clone(), &[]).await.unwrap();
    let state = notices.state(&notice_id, auth.clone(), keys.clone()).await.unwrap();
    assert_eq!(state.state, LifecycleState::Archived);

    let publish_after_archive = notices.publish(&notice_id, &issuer, false, &signing_key, 5, auth.clone(), keys.clone(), &[]).await;
    assert!(publish_after_archive.is_err());

    let past = notices.list_view(NoticeView::Past, 10_000, 0, auth, keys).await.unwrap();
    assert_eq!(past.len(), 1);
}
