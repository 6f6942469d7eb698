//! `Credential` (§3.5): a cached verifiable-credential payload, routed to
//! whichever space the caller chooses (community for a member-visible
//! credential, private for one only its holder should read).

use std::sync::Arc;

use serde_json::json;

use osc_core::crypto::{Cid, Ed25519SigningKey};
use osc_core::error::{CoreError, Result};
use osc_core::ids::{AccountId, ObjectId, PeerId, SpaceId};
use osc_space::{materialize, UnifiedTreeManager};
use osc_tree::{ChangeOp, ReadKeySource, SnapshotState, WriterAuthorization};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialState {
    pub schema: String,
    pub issuer: String,
    pub said: String,
    pub payload: serde_json::Value,
    pub revoked: bool,
}

impl From<SnapshotState> for CredentialState {
    fn from(fields: SnapshotState) -> Self {
        Self {
            schema: fields.get("schema").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            issuer: fields.get("issuer").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            said: fields.get("said").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            payload: fields.get("payload").cloned().unwrap_or(serde_json::Value::Null),
            revoked: fields.get("revoked").and_then(|v| v.as_bool()).unwrap_or(false),
        }
    }
}

/// Caches credentials in whichever `SpaceId` the caller routes them to; the
/// manager itself is space-agnostic (§3.5: "routed").
pub struct CredentialManager {
    tree_manager: Arc<UnifiedTreeManager>,
}

impl CredentialManager {
    pub fn new(tree_manager: Arc<UnifiedTreeManager>) -> Self {
        Self { tree_manager }
    }

    fn object_id(said: &str) -> ObjectId {
        ObjectId::new(format!("Credential-{said}"))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn cache(
        &self,
        space_id: &SpaceId,
        said: String,
        schema: String,
        issuer: String,
        payload: serde_json::Value,
        acl_head_id: Cid,
        author: &AccountId,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let object_id = Self::object_id(&said);
        let handle = self
            .tree_manager
            .create_object_tree(space_id, object_id, "Credential".into(), acl_head_id, signing_key, timestamp, auth, keys, peers)
            .await?;

        let ops = ChangeOp::set("schema", json!(schema))
            .push_set("issuer", json!(issuer))
            .push_set("said", json!(said))
            .push_set("payload", payload)
            .push_set("revoked", json!(false));
        let plaintext = osc_core::serialization::to_vec(&ops)?;

        let mut tree = handle.lock().await;
        tree.add_content(author, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn revoke(
        &self,
        space_id: &SpaceId,
        said: &str,
        author: &AccountId,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let object_id = Self::object_id(said);
        let ops = ChangeOp::set("revoked", json!(true));
        let plaintext = osc_core::serialization::to_vec(&ops)?;
        let handle = self.tree_manager.get_tree_for_object(space_id, &object_id, auth, keys).await?;
        let mut tree = handle.lock().await;
        tree.add_content(author, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn get(&self, space_id: &SpaceId, said: &str, auth: Arc<dyn WriterAuthorization>, keys: Arc<dyn ReadKeySource>) -> Result<CredentialState> {
        let object_id = Self::object_id(said);
        let handle = self.tree_manager.get_tree_for_object(space_id, &object_id, auth, keys.clone()).await?;
        let tree = handle.lock().await;
        Ok(materialize(tree.tree(), keys.as_ref())?.into())
    }
}
