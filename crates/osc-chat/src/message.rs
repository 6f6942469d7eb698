//! `ChatMessage` object manager (§3.5, §8 scenario 2: only the original
//! author may edit or delete their own message).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;

use osc_core::crypto::{Cid, Ed25519SigningKey};
use osc_core::error::{CoreError, Result};
use osc_core::ids::{AccountId, ObjectId, PeerId, SpaceId};
use osc_space::{materialize, UnifiedTreeManager};
use osc_tree::{ChangeOp, ReadKeySource, WriterAuthorization};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageState {
    pub channel_id: String,
    pub author: String,
    pub content: String,
    pub reply_to: Option<String>,
    pub edited_at: Option<i64>,
    pub deleted_at: Option<i64>,
}

impl From<osc_tree::SnapshotState> for MessageState {
    fn from(fields: osc_tree::SnapshotState) -> Self {
        Self {
            channel_id: fields.get("channelId").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            author: fields.get("author").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            content: fields.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            reply_to: fields.get("replyTo").and_then(|v| v.as_str()).map(String::from),
            edited_at: fields.get("editedAt").and_then(|v| v.as_i64()),
            deleted_at: fields.get("deletedAt").and_then(|v| v.as_i64()),
        }
    }
}

/// Creation-order record of which message ids belong to which channel, kept
/// in-memory alongside the Unified Tree Manager's own indices: the tree
/// substrate indexes by `objectId`, never by a foreign key like `channelId`
/// (§4.7 "no secondary cache keyed by anything else" governs the manager's
/// own cache, not an application-level listing like this one).
#[derive(Default)]
pub struct ChannelMessageIndex {
    by_channel: RwLock<HashMap<ObjectId, Vec<ObjectId>>>,
}

impl ChannelMessageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, channel_id: &ObjectId, message_id: ObjectId) {
        self.by_channel.write().entry(channel_id.clone()).or_default().push(message_id);
    }

    pub fn messages_in(&self, channel_id: &ObjectId) -> Vec<ObjectId> {
        self.by_channel.read().get(channel_id).cloned().unwrap_or_default()
    }
}

pub struct MessageManager {
    tree_manager: Arc<UnifiedTreeManager>,
    space_id: SpaceId,
    index: Arc<ChannelMessageIndex>,
}

impl MessageManager {
    pub fn new(tree_manager: Arc<UnifiedTreeManager>, space_id: SpaceId, index: Arc<ChannelMessageIndex>) -> Self {
        Self { tree_manager, space_id, index }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn post(
        &self,
        message_id: ObjectId,
        channel_id: &ObjectId,
        content: String,
        reply_to: Option<String>,
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
                message_id.clone(),
                "ChatMessage".into(),
                acl_head_id,
                signing_key,
                timestamp,
                auth,
                keys,
                peers,
            )
            .await?;

        let mut ops = ChangeOp::set("content", json!(content))
            .push_set("channelId", json!(channel_id.0))
            .push_set("author", json!(author.0));
        if let Some(reply_to) = reply_to {
            ops = ops.push_set("replyTo", json!(reply_to));
        }
        let plaintext = osc_core::serialization::to_vec(&ops)?;

        let mut tree = handle.lock().await;
        tree.add_content(author, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        drop(tree);

        self.index.record(channel_id, message_id);
        Ok(())
    }

    pub async fn state(
        &self,
        message_id: &ObjectId,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
    ) -> Result<MessageState> {
        let handle = self
            .tree_manager
            .get_tree_for_object(&self.space_id, message_id, auth, keys.clone())
            .await?;
        let tree = handle.lock().await;
        Ok(materialize(tree.tree(), keys.as_ref())?.into())
    }

    pub async fn list_channel(
        &self,
        channel_id: &ObjectId,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
    ) -> Result<Vec<MessageState>> {
        let mut out = Vec::new();
        for message_id in self.index.messages_in(channel_id) {
            out.push(self.state(&message_id, auth.clone(), keys.clone()).await?);
        }
        Ok(out)
    }

    pub async fn thread(
        &self,
        message_id: &ObjectId,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
    ) -> Result<Vec<MessageState>> {
        let root = self.state(message_id, auth.clone(), keys.clone()).await?;
        let channel_id = ObjectId::new(root.channel_id);
        let mut out = Vec::new();
        for candidate_id in self.index.messages_in(&channel_id) {
            let candidate = self.state(&candidate_id, auth.clone(), keys.clone()).await?;
            if candidate.reply_to.as_deref() == Some(message_id.0.as_str()) {
                out.push(candidate);
            }
        }
        Ok(out)
    }

    /// Rejects the edit with `ErrPermission` unless `editor` authored the
    /// message (§8 scenario 2).
    #[allow(clippy::too_many_arguments)]
    pub async fn edit(
        &self,
        message_id: &ObjectId,
        content: String,
        editor: &AccountId,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let current = self.state(message_id, auth.clone(), keys.clone()).await?;
        if current.author != editor.0 {
            return Err(CoreError::permission(format!(
                "{editor} may not edit message {message_id} authored by {}",
                current.author
            )));
        }
        let handle = self
            .tree_manager
            .get_tree_for_object(&self.space_id, message_id, auth, keys)
            .await?;
        let ops = ChangeOp::set("content", json!(content)).push_set("editedAt", json!(timestamp));
        let plaintext = osc_core::serialization::to_vec(&ops)?;
        let mut tree = handle.lock().await;
        tree.add_content(editor, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn soft_delete(
        &self,
        message_id: &ObjectId,
        deleter: &AccountId,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let current = self.state(message_id, auth.clone(), keys.clone()).await?;
        if current.author != deleter.0 {
            return Err(CoreError::permission(format!(
                "{deleter} may not delete message {message_id} authored by {}",
                current.author
            )));
        }
        let handle = self
            .tree_manager
            .get_tree_for_object(&self.space_id, message_id, auth, keys)
            .await?;
        let ops = ChangeOp::set("deletedAt", json!(timestamp));
        let plaintext = osc_core::serialization::to_vec(&ops)?;
        let mut tree = handle.lock().await;
        tree.add_content(deleter, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }
}
