//! `MessageReaction` CRDT (§4.5): one Object Tree per `(messageId, emoji)`
//! pair, whose materialised state is the set of reactor account ids.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;

use osc_core::crypto::{Cid, Ed25519SigningKey};
use osc_core::error::{CoreError, Result};
use osc_core::ids::{AccountId, ObjectId, PeerId, SpaceId};
use osc_space::{materialize, UnifiedTreeManager};
use osc_tree::{ChangeOp, ReadKeySource, WriterAuthorization};

fn reaction_tree_id(message_id: &str, emoji: &str) -> ObjectId {
    ObjectId::new(format!("MessageReaction-{message_id}-{emoji}"))
}

fn reactor_set(fields: &osc_tree::SnapshotState) -> BTreeSet<String> {
    fields
        .get("reactorAids")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

pub struct ReactionManager {
    tree_manager: Arc<UnifiedTreeManager>,
    space_id: SpaceId,
}

impl ReactionManager {
    pub fn new(tree_manager: Arc<UnifiedTreeManager>, space_id: SpaceId) -> Self {
        Self { tree_manager, space_id }
    }

    async fn tree_handle(
        &self,
        message_id: &str,
        emoji: &str,
        acl_head_id: Cid,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<Arc<tokio::sync::Mutex<osc_sync::SyncTree>>> {
        let object_id = reaction_tree_id(message_id, emoji);
        if let Some(tree_id) = self.tree_manager.tree_id_for_object(&self.space_id, &object_id) {
            return self.tree_manager.get_tree(&self.space_id, tree_id, auth, keys).await;
        }
        self.tree_manager
            .create_object_tree(
                &self.space_id,
                object_id,
                "MessageReaction".into(),
                acl_head_id,
                signing_key,
                timestamp,
                auth,
                keys,
                peers,
            )
            .await
    }

    /// `ErrConflict` if `account` already reacted with `emoji` (§8 scenario
    /// 3: a duplicate reaction from the same user is a 409, not a no-op).
    #[allow(clippy::too_many_arguments)]
    pub async fn add(
        &self,
        message_id: &str,
        emoji: &str,
        account: &AccountId,
        acl_head_id: Cid,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<usize> {
        let handle = self
            .tree_handle(message_id, emoji, acl_head_id, signing_key, timestamp, auth, keys.clone(), peers)
            .await?;
        let mut tree = handle.lock().await;
        let mut reactors = reactor_set(&materialize(tree.tree(), keys.as_ref())?);
        if !reactors.insert(account.0.clone()) {
            return Err(CoreError::conflict(format!("{account} already reacted with {emoji} on {message_id}")));
        }
        let ops = ChangeOp::set("reactorAids", json!(reactors.iter().collect::<Vec<_>>()));
        let plaintext = osc_core::serialization::to_vec(&ops)?;
        tree.add_content(account, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(reactors.len())
    }

    /// `ErrNotFound` if `account` never reacted with `emoji`.
    #[allow(clippy::too_many_arguments)]
    pub async fn remove(
        &self,
        message_id: &str,
        emoji: &str,
        account: &AccountId,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<usize> {
        let object_id = reaction_tree_id(message_id, emoji);
        let handle = self
            .tree_manager
            .get_tree_for_object(&self.space_id, &object_id, auth, keys.clone())
            .await?;
        let mut tree = handle.lock().await;
        let mut reactors = reactor_set(&materialize(tree.tree(), keys.as_ref())?);
        if !reactors.remove(&account.0) {
            return Err(CoreError::not_found(format!("{account} has not reacted with {emoji} on {message_id}")));
        }
        let ops = ChangeOp::set("reactorAids", json!(reactors.iter().collect::<Vec<_>>()));
        let plaintext = osc_core::serialization::to_vec(&ops)?;
        tree.add_content(account, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(reactors.len())
    }
}
