//! The per-notice engagement kinds that aren't the lifecycle state machine
//! itself: RSVP (last-write-wins per user), and the append-only Ack/Save/
//! Comment/Reaction records (§3.5).

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;

use osc_core::crypto::{Cid, Ed25519SigningKey};
use osc_core::error::{CoreError, Result};
use osc_core::ids::{AccountId, ObjectId, PeerId, SpaceId};
use osc_space::{materialize, UnifiedTreeManager};
use osc_tree::{ChangeOp, ReadKeySource, WriterAuthorization};

fn side_tree_id(kind: &str, notice_id: &str) -> ObjectId {
    ObjectId::new(format!("{kind}-{notice_id}"))
}

async fn tree_for(
    tree_manager: &UnifiedTreeManager,
    space_id: &SpaceId,
    kind: &str,
    notice_id: &str,
    acl_head_id: Cid,
    signing_key: &Ed25519SigningKey,
    timestamp: i64,
    auth: Arc<dyn WriterAuthorization>,
    keys: Arc<dyn ReadKeySource>,
    peers: &[PeerId],
) -> Result<Arc<tokio::sync::Mutex<osc_sync::SyncTree>>> {
    let object_id = side_tree_id(kind, notice_id);
    if let Some(tree_id) = tree_manager.tree_id_for_object(space_id, &object_id) {
        return tree_manager.get_tree(space_id, tree_id, auth, keys).await;
    }
    tree_manager
        .create_object_tree(space_id, object_id, kind.into(), acl_head_id, signing_key, timestamp, auth, keys, peers)
        .await
}

/// Last-write-wins RSVP status per user, one Object Tree per notice.
pub struct NoticeRsvpManager {
    tree_manager: Arc<UnifiedTreeManager>,
    space_id: SpaceId,
}

impl NoticeRsvpManager {
    pub fn new(tree_manager: Arc<UnifiedTreeManager>, space_id: SpaceId) -> Self {
        Self { tree_manager, space_id }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn set_status(
        &self,
        notice_id: &str,
        account: &AccountId,
        status: String,
        acl_head_id: Cid,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let handle = tree_for(&self.tree_manager, &self.space_id, "NoticeRSVP", notice_id, acl_head_id, signing_key, timestamp, auth, keys, peers).await?;
        let ops = ChangeOp::set(account.0.clone(), json!(status));
        let plaintext = osc_core::serialization::to_vec(&ops)?;
        let mut tree = handle.lock().await;
        tree.add_content(account, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn statuses(&self, notice_id: &str, auth: Arc<dyn WriterAuthorization>, keys: Arc<dyn ReadKeySource>) -> Result<Vec<(String, String)>> {
        let object_id = side_tree_id("NoticeRSVP", notice_id);
        let handle = self.tree_manager.get_tree_for_object(&self.space_id, &object_id, auth, keys.clone()).await?;
        let tree = handle.lock().await;
        let fields = materialize(tree.tree(), keys.as_ref())?;
        Ok(fields
            .into_iter()
            .filter_map(|(account, value)| value.as_str().map(|status| (account, status.to_string())))
            .collect())
    }
}

/// An append-only record kind (`NoticeAck`, `NoticeSave`, `NoticeComment`):
/// each entry is keyed by a caller-chosen unique id and, once set, is never
/// unset — the ChangeOp replay model has no notion of deleting a record of
/// this kind.
pub struct AppendOnlyRecordManager {
    kind: &'static str,
    tree_manager: Arc<UnifiedTreeManager>,
    space_id: SpaceId,
}

impl AppendOnlyRecordManager {
    pub fn new(kind: &'static str, tree_manager: Arc<UnifiedTreeManager>, space_id: SpaceId) -> Self {
        Self { kind, tree_manager, space_id }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        notice_id: &str,
        record_id: String,
        record: serde_json::Value,
        author: &AccountId,
        acl_head_id: Cid,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let handle = tree_for(&self.tree_manager, &self.space_id, self.kind, notice_id, acl_head_id, signing_key, timestamp, auth, keys, peers).await?;
        let ops = ChangeOp::set(record_id, record);
        let plaintext = osc_core::serialization::to_vec(&ops)?;
        let mut tree = handle.lock().await;
        tree.add_content(author, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn records(&self, notice_id: &str, auth: Arc<dyn WriterAuthorization>, keys: Arc<dyn ReadKeySource>) -> Result<Vec<serde_json::Value>> {
        let object_id = side_tree_id(self.kind, notice_id);
        let handle = self.tree_manager.get_tree_for_object(&self.space_id, &object_id, auth, keys.clone()).await?;
        let tree = handle.lock().await;
        let fields = materialize(tree.tree(), keys.as_ref())?;
        Ok(fields.into_values().collect())
    }
}

/// `NoticeReaction`, the same set-of-reactors CRDT as chat's
/// `MessageReaction` (§4.5), applied to notices instead of messages.
pub struct NoticeReactionManager {
    tree_manager: Arc<UnifiedTreeManager>,
    space_id: SpaceId,
}

impl NoticeReactionManager {
    pub fn new(tree_manager: Arc<UnifiedTreeManager>, space_id: SpaceId) -> Self {
        Self { tree_manager, space_id }
    }

    fn object_id(notice_id: &str, emoji: &str) -> ObjectId {
        ObjectId::new(format!("NoticeReaction-{notice_id}-{emoji}"))
    }

    fn reactor_set(fields: &osc_tree::SnapshotState) -> BTreeSet<String> {
        fields
            .get("reactorAids")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add(
        &self,
        notice_id: &str,
        emoji: &str,
        account: &AccountId,
        acl_head_id: Cid,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<usize> {
        let object_id = Self::object_id(notice_id, emoji);
        let handle = if let Some(tree_id) = self.tree_manager.tree_id_for_object(&self.space_id, &object_id) {
            self.tree_manager.get_tree(&self.space_id, tree_id, auth.clone(), keys.clone()).await?
        } else {
            self.tree_manager
                .create_object_tree(&self.space_id, object_id, "NoticeReaction".into(), acl_head_id, signing_key, timestamp, auth.clone(), keys.clone(), peers)
                .await?
        };
        let mut tree = handle.lock().await;
        let mut reactors = Self::reactor_set(&materialize(tree.tree(), keys.as_ref())?);
        if !reactors.insert(account.0.clone()) {
            return Err(CoreError::conflict(format!("{account} already reacted with {emoji} on notice {notice_id}")));
        }
        let ops = ChangeOp::set("reactorAids", json!(reactors.iter().collect::<Vec<_>>()));
        let plaintext = osc_core::serialization::to_vec(&ops)?;
        tree.add_content(account, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(reactors.len())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn remove(
        &self,
        notice_id: &str,
        emoji: &str,
        account: &AccountId,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<usize> {
        let object_id = Self::object_id(notice_id, emoji);
        let handle = self.tree_manager.get_tree_for_object(&self.space_id, &object_id, auth, keys.clone()).await?;
        let mut tree = handle.lock().await;
        let mut reactors = Self::reactor_set(&materialize(tree.tree(), keys.as_ref())?);
        if !reactors.remove(&account.0) {
            return Err(CoreError::not_found(format!("{account} has not reacted with {emoji} on notice {notice_id}")));
        }
        let ops = ChangeOp::set("reactorAids", json!(reactors.iter().collect::<Vec<_>>()));
        let plaintext = osc_core::serialization::to_vec(&ops)?;
        tree.add_content(account, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(reactors.len())
    }
}
