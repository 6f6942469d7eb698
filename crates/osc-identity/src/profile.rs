//! `SharedProfile`, `CommunityProfile`, `PrivateProfile` object managers
//! (§3.5): one tree per account per kind, each living in the space its
//! access level calls for (community, community-readonly, private).

use std::sync::Arc;

use serde_json::json;

use osc_core::crypto::{Cid, Ed25519SigningKey};
use osc_core::error::{CoreError, Result};
use osc_core::ids::{AccountId, ObjectId, PeerId, SpaceId};
use osc_space::{materialize, UnifiedTreeManager};
use osc_tree::{ChangeOp, ReadKeySource, SnapshotState, WriterAuthorization};

fn profile_object_id(kind: &str, account: &AccountId) -> ObjectId {
    ObjectId::new(format!("{kind}-{}", account.0))
}

/// Member-editable display name, bio, avatar reference, and social links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedProfileState {
    pub display_name: String,
    pub bio: String,
    pub avatar_ref: Option<String>,
    pub socials: Vec<String>,
}

impl From<SnapshotState> for SharedProfileState {
    fn from(fields: SnapshotState) -> Self {
        Self {
            display_name: fields.get("displayName").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            bio: fields.get("bio").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            avatar_ref: fields.get("avatarRef").and_then(|v| v.as_str()).map(String::from),
            socials: fields
                .get("socials")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
        }
    }
}

pub struct SharedProfileManager {
    tree_manager: Arc<UnifiedTreeManager>,
    space_id: SpaceId,
}

impl SharedProfileManager {
    pub fn new(tree_manager: Arc<UnifiedTreeManager>, space_id: SpaceId) -> Self {
        Self { tree_manager, space_id }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        account: &AccountId,
        display_name: String,
        bio: String,
        avatar_ref: Option<String>,
        socials: Vec<String>,
        acl_head_id: Cid,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let object_id = profile_object_id("SharedProfile", account);
        let handle = if let Some(tree_id) = self.tree_manager.tree_id_for_object(&self.space_id, &object_id) {
            self.tree_manager.get_tree(&self.space_id, tree_id, auth, keys).await?
        } else {
            self.tree_manager
                .create_object_tree(&self.space_id, object_id, "SharedProfile".into(), acl_head_id, signing_key, timestamp, auth, keys, peers)
                .await?
        };

        let mut ops = ChangeOp::set("displayName", json!(display_name))
            .push_set("bio", json!(bio))
            .push_set("socials", json!(socials));
        if let Some(avatar_ref) = avatar_ref {
            ops = ops.push_set("avatarRef", json!(avatar_ref));
        }
        let plaintext = osc_core::serialization::to_vec(&ops)?;

        let mut tree = handle.lock().await;
        tree.add_content(account, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn get(&self, account: &AccountId, auth: Arc<dyn WriterAuthorization>, keys: Arc<dyn ReadKeySource>) -> Result<SharedProfileState> {
        let object_id = profile_object_id("SharedProfile", account);
        let handle = self.tree_manager.get_tree_for_object(&self.space_id, &object_id, auth, keys.clone()).await?;
        let tree = handle.lock().await;
        Ok(materialize(tree.tree(), keys.as_ref())?.into())
    }

    /// Lists every `SharedProfile` this tree manager has indexed for the
    /// space (§8 scenario 5: a freshly joined member must see their own
    /// profile here once `WaitForSync` succeeds).
    pub async fn list(&self, auth: Arc<dyn WriterAuthorization>, keys: Arc<dyn ReadKeySource>) -> Result<Vec<SharedProfileState>> {
        let mut out = Vec::new();
        for object_id in self.tree_manager.object_ids_with_prefix(&self.space_id, "SharedProfile-") {
            let handle = self.tree_manager.get_tree_for_object(&self.space_id, &object_id, auth.clone(), keys.clone()).await?;
            let tree = handle.lock().await;
            out.push(materialize(tree.tree(), keys.as_ref())?.into());
        }
        Ok(out)
    }
}

/// Admin-managed role, permissions, and credentials list, kept in the
/// community-readonly space so ordinary members can read but not write it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommunityProfileState {
    pub role: String,
    pub permissions: Vec<String>,
    pub credential_ids: Vec<String>,
}

impl From<SnapshotState> for CommunityProfileState {
    fn from(fields: SnapshotState) -> Self {
        Self {
            role: fields.get("role").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            permissions: fields
                .get("permissions")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
            credential_ids: fields
                .get("credentialIds")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
        }
    }
}

pub struct CommunityProfileManager {
    tree_manager: Arc<UnifiedTreeManager>,
    space_id: SpaceId,
}

impl CommunityProfileManager {
    pub fn new(tree_manager: Arc<UnifiedTreeManager>, space_id: SpaceId) -> Self {
        Self { tree_manager, space_id }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn set(
        &self,
        account: &AccountId,
        role: String,
        permissions: Vec<String>,
        credential_ids: Vec<String>,
        acl_head_id: Cid,
        admin: &AccountId,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let object_id = profile_object_id("CommunityProfile", account);
        let handle = if let Some(tree_id) = self.tree_manager.tree_id_for_object(&self.space_id, &object_id) {
            self.tree_manager.get_tree(&self.space_id, tree_id, auth, keys).await?
        } else {
            self.tree_manager
                .create_object_tree(&self.space_id, object_id, "CommunityProfile".into(), acl_head_id, signing_key, timestamp, auth, keys, peers)
                .await?
        };

        let ops = ChangeOp::set("role", json!(role))
            .push_set("permissions", json!(permissions))
            .push_set("credentialIds", json!(credential_ids));
        let plaintext = osc_core::serialization::to_vec(&ops)?;

        let mut tree = handle.lock().await;
        tree.add_content(admin, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn get(&self, account: &AccountId, auth: Arc<dyn WriterAuthorization>, keys: Arc<dyn ReadKeySource>) -> Result<CommunityProfileState> {
        let object_id = profile_object_id("CommunityProfile", account);
        let handle = self.tree_manager.get_tree_for_object(&self.space_id, &object_id, auth, keys.clone()).await?;
        let tree = handle.lock().await;
        Ok(materialize(tree.tree(), keys.as_ref())?.into())
    }
}

/// Private preferences and private credential SAIDs, kept in the caller's
/// own private space and never shared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrivateProfileState {
    pub preferences: serde_json::Value,
    pub private_credential_saids: Vec<String>,
}

impl From<SnapshotState> for PrivateProfileState {
    fn from(fields: SnapshotState) -> Self {
        Self {
            preferences: fields.get("preferences").cloned().unwrap_or(serde_json::Value::Null),
            private_credential_saids: fields
                .get("privateCredentialSaids")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
        }
    }
}

pub struct PrivateProfileManager {
    tree_manager: Arc<UnifiedTreeManager>,
    space_id: SpaceId,
}

impl PrivateProfileManager {
    pub fn new(tree_manager: Arc<UnifiedTreeManager>, space_id: SpaceId) -> Self {
        Self { tree_manager, space_id }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        account: &AccountId,
        preferences: serde_json::Value,
        private_credential_saids: Vec<String>,
        acl_head_id: Cid,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let object_id = profile_object_id("PrivateProfile", account);
        let handle = if let Some(tree_id) = self.tree_manager.tree_id_for_object(&self.space_id, &object_id) {
            self.tree_manager.get_tree(&self.space_id, tree_id, auth, keys).await?
        } else {
            self.tree_manager
                .create_object_tree(&self.space_id, object_id, "PrivateProfile".into(), acl_head_id, signing_key, timestamp, auth, keys, peers)
                .await?
        };

        let ops = ChangeOp::set("preferences", preferences).push_set("privateCredentialSaids", json!(private_credential_saids));
        let plaintext = osc_core::serialization::to_vec(&ops)?;

        let mut tree = handle.lock().await;
        tree.add_content(account, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    pub async fn get(&self, account: &AccountId, auth: Arc<dyn WriterAuthorization>, keys: Arc<dyn ReadKeySource>) -> Result<PrivateProfileState> {
        let object_id = profile_object_id("PrivateProfile", account);
        let handle = self.tree_manager.get_tree_for_object(&self.space_id, &object_id, auth, keys.clone()).await?;
        let tree = handle.lock().await;
        Ok(materialize(tree.tree(), keys.as_ref())?.into())
    }
}
