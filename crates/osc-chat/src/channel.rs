//! `ChatChannel` object manager (§3.5): name, description, allowed roles,
//! and the archived flag, materialised by replaying `ChangeOp`s over the
//! channel's Object Tree.

use std::sync::Arc;

use serde_json::json;

use osc_core::crypto::{Cid, Ed25519SigningKey};
use osc_core::error::{CoreError, Result};
use osc_core::ids::{AccountId, ObjectId, PeerId, SpaceId};
use osc_space::{materialize, UnifiedTreeManager};
use osc_tree::{ChangeOp, ReadKeySource, WriterAuthorization};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelState {
    pub name: String,
    pub description: String,
    pub allowed_roles: Vec<String>,
    pub is_archived: bool,
}

impl From<osc_tree::SnapshotState> for ChannelState {
    fn from(fields: osc_tree::SnapshotState) -> Self {
        Self {
            name: fields.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            description: fields.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            allowed_roles: fields
                .get("allowedRoles")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
            is_archived: fields.get("isArchived").and_then(|v| v.as_bool()).unwrap_or(false),
        }
    }
}

/// Creates and mutates `ChatChannel` trees in one community space.
pub struct ChannelManager {
    tree_manager: Arc<UnifiedTreeManager>,
    space_id: SpaceId,
}

impl ChannelManager {
    pub fn new(tree_manager: Arc<UnifiedTreeManager>, space_id: SpaceId) -> Self {
        Self { tree_manager, space_id }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        channel_id: ObjectId,
        name: String,
        description: String,
        allowed_roles: Vec<String>,
        acl_head_id: Cid,
        author: &AccountId,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let handle = self
            .tree_manager
            .create_object_tree(
                &self.space_id,
                channel_id,
                "ChatChannel".into(),
                acl_head_id,
                signing_key,
                timestamp,
                auth,
                keys,
                peers,
            )
            .await?;

        let ops = ChangeOp::set("name", json!(name))
            .push_set("description", json!(description))
            .push_set("allowedRoles", json!(allowed_roles))
            .push_set("isArchived", json!(false));
        let plaintext = osc_core::serialization::to_vec(&ops)?;

        let mut tree = handle.lock().await;
        tree.add_content(author, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn state(
        &self,
        channel_id: &ObjectId,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
    ) -> Result<ChannelState> {
        let handle = self
            .tree_manager
            .get_tree_for_object(&self.space_id, channel_id, auth, keys.clone())
            .await?;
        let tree = handle.lock().await;
        Ok(materialize(tree.tree(), keys.as_ref())?.into())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn rename(
        &self,
        channel_id: &ObjectId,
        name: String,
        description: String,
        author: &AccountId,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let handle = self.tree_manager.get_tree_for_object(&self.space_id, channel_id, auth, keys).await?;
        let ops = ChangeOp::set("name", json!(name)).push_set("description", json!(description));
        let plaintext = osc_core::serialization::to_vec(&ops)?;
        let mut tree = handle.lock().await;
        tree.add_content(author, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    /// `DELETE /chat/channels/{id}` archives rather than deletes the tree
    /// (§8 scenario 6: the channel remains readable with `isArchived=true`).
    #[allow(clippy::too_many_arguments)]
    pub async fn set_archived(
        &self,
        channel_id: &ObjectId,
        archived: bool,
        author: &AccountId,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let handle = self.tree_manager.get_tree_for_object(&self.space_id, channel_id, auth, keys).await?;
        let ops = ChangeOp::set("isArchived", json!(archived));
        let plaintext = osc_core::serialization::to_vec(&ops)?;
        let mut tree = handle.lock().await;
        tree.add_content(author, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }
}
