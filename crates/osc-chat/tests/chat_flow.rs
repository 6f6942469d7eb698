//! End-to-end exercises of §8 scenarios 1-3 against in-memory fakes for
//! transport and ACL/key resolution.

use std::sync::Arc;

use async_trait::async_trait;

use osc_chat::{ChannelManager, ChannelMessageIndex, MessageManager, ReactionManager};
use osc_core::crypto::{Cid, Ed25519SigningKey, ReadKey};
use osc_core::error::Result as CoreResult;
use osc_core::ids::{AccountId, ObjectId, PeerId, ReadKeyId, SpaceId};
use osc_space::{NoRemote, UnifiedTreeManager};
use osc_store::ChangeStore;
use osc_sync::PeerTransport;
use osc_sync::wire::SyncWireMessage;
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

fn harness() -> (
    tempfile::TempDir,
    Arc<UnifiedTreeManager>,
    SpaceId,
    Arc<dyn WriterAuthorization>,
    Arc<dyn ReadKeySource>,
) {
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
    (dir, tree_manager, SpaceId::new("community-1"), auth, keys)
}

#[tokio::test]
async fn edit_own_succeeds_edit_other_is_forbidden() {
    let (_dir, tree_manager, space_id, auth, keys) = harness();
    let signing_key_a = Ed25519SigningKey::from_bytes([1u8; 32]);
    let signing_key_b = Ed25519SigningKey::from_bytes([2u8; 32]);
    let alice = AccountId::new("alice");
    let bob = AccountId::new("bob");
    let acl_head = auth.current_acl_head();

    let channels = ChannelManager::new(tree_manager.clone(), space_id.clone());
    let channel_id = ObjectId::new("C");
    channels
        .create(
            channel_id.clone(),
            "general".into(),
            "".into(),
            vec![],
            acl_head,
            &alice,
            &signing_key_a,
            1,
            auth.clone(),
            keys.clone(),
            &[],
        )
        .await
        .unwrap();

    let index = Arc::new(ChannelMessageIndex::new());
    let messages = MessageManager::new(tree_manager.clone(), space_id.clone(), index);
    let message_id = ObjectId::new("M");
    messages
        .post(
            message_id.clone(),
            &channel_id,
            "hi".into(),
            None,
            acl_head,
            &alice,
            &signing_key_a,
            2,
            auth.clone(),
            keys.clone(),
            &[],
        )
        .await
        .unwrap();

    messages
        .edit(&message_id, "edited".into(), &alice, &signing_key_a, 3, auth.clone(), keys.clone(), &[])
        .await
        .unwrap();
    let state = messages.state(&message_id, auth.clone(), keys.clone()).await.unwrap();
    assert_eq!(state.content, "edited");

    let forbidden = messages
        .edit(&message_id, "hack".into(), &bob, &signing_key_b, 4, auth.clone(), keys.clone(), &[])
        .await;
    assert!(forbidden.is_err());
}

#[tokio::test]
async fn duplicate_reaction_conflicts_then_remove_then_not_found() {
    let (_dir, tree_manager, space_id, auth, keys) = harness();
    let signing_key = Ed25519SigningKey::from_bytes([3u8; 32]);
    let alice = AccountId::new("alice");
    let acl_head = auth.current_acl_head();

    let reactions = ReactionManager::new(tree_manager, space_id);
    let count = reactions
        .add("M", "heart", &alice, acl_head, &signing_key, 1, auth.clone(), keys.clone(), &[])
        .await
        .unwrap();
    assert_eq!(count, 1);

    let duplicate = reactions
        .add("M", "heart", &alice, acl_head, &signing_key, 2, auth.clone(), keys.clone(), &[])
        .await;
    assert!(duplicate.is_err());

    let count = reactions
        .remove("M", "heart", &alice, &signing_key, 3, auth.clone(), keys.clone(), &[])
        .await
        .unwrap();
    assert_eq!(count, 0);

    let missing = reactions.remove("M", "heart", &alice, &signing_key, 4, auth, keys, &[]).await;
    assert!(missing.is_err());
}
