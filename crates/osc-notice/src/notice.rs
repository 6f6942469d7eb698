//! `Notice` lifecycle state machine (§4.6): draft → published → archived,
//! field immutability after publication, and the derived
//! upcoming/current/past views.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;

use osc_core::crypto::{Cid, Ed25519SigningKey};
use osc_core::error::{CoreError, Result};
use osc_core::ids::{AccountId, ObjectId, PeerId, SpaceId};
use osc_space::{materialize, UnifiedTreeManager};
use osc_tree::{ChangeOp, ReadKeySource, SnapshotState, WriterAuthorization};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Draft,
    Published,
    Archived,
}

impl LifecycleState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "published" => Self::Published,
            "archived" => Self::Archived,
            _ => Self::Draft,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoticeState {
    pub notice_type: String,
    pub title: String,
    pub summary: String,
    pub body: String,
    pub event_start: Option<i64>,
    pub state: LifecycleState,
    pub pinned: bool,
    pub active_until: Option<i64>,
    pub publish_at: Option<i64>,
    pub issuer: String,
    pub amends_notice_id: Option<String>,
}

impl From<SnapshotState> for NoticeState {
    fn from(fields: SnapshotState) -> Self {
        Self {
            notice_type: fields.get("type").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            title: fields.get("title").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            summary: fields.get("summary").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            body: fields.get("body").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            event_start: fields.get("eventStart").and_then(|v| v.as_i64()),
            state: fields.get("state").and_then(|v| v.as_str()).map(LifecycleState::parse).unwrap_or(LifecycleState::Draft),
            pinned: fields.get("pinned").and_then(|v| v.as_bool()).unwrap_or(false),
            active_until: fields.get("activeUntil").and_then(|v| v.as_i64()),
            publish_at: fields.get("publishAt").and_then(|v| v.as_i64()),
            issuer: fields.get("issuer").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            amends_notice_id: fields.get("amendsNoticeId").and_then(|v| v.as_str()).map(String::from),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeView {
    Upcoming,
    Current,
    Past,
}

/// Every notice id ever created in a space, in creation order — the
/// application-level listing `GET /notices` needs; the tree substrate only
/// indexes by `objectId` (§4.7).
#[derive(Default)]
pub struct NoticeIndex {
    ids: RwLock<Vec<ObjectId>>,
}

impl NoticeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, notice_id: ObjectId) {
        self.ids.write().push(notice_id);
    }

    pub fn all(&self) -> Vec<ObjectId> {
        self.ids.read().clone()
    }
}

pub struct NoticeManager {
    tree_manager: Arc<UnifiedTreeManager>,
    space_id: SpaceId,
    index: Arc<NoticeIndex>,
}

impl NoticeManager {
    pub fn new(tree_manager: Arc<UnifiedTreeManager>, space_id: SpaceId, index: Arc<NoticeIndex>) -> Self {
        Self { tree_manager, space_id, index }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        notice_id: ObjectId,
        notice_type: String,
        title: String,
        summary: String,
        body: String,
        event_start: Option<i64>,
        acl_head_id: Cid,
        issuer: &AccountId,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let handle = self
            .tree_manager
            .create_object_tree(&self.space_id, notice_id.clone(), "Notice".into(), acl_head_id, signing_key, timestamp, auth, keys, peers)
            .await?;

        let mut ops = ChangeOp::set("type", json!(notice_type))
            .push_set("title", json!(title))
            .push_set("summary", json!(summary))
            .push_set("body", json!(body))
            .push_set("state", json!("draft"))
            .push_set("pinned", json!(false))
            .push_set("issuer", json!(issuer.0));
        if let Some(event_start) = event_start {
            ops = ops.push_set("eventStart", json!(event_start));
        }
        let plaintext = osc_core::serialization::to_vec(&ops)?;

        let mut tree = handle.lock().await;
        tree.add_content(issuer, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        drop(tree);

        self.index.record(notice_id);
        Ok(())
    }

    pub async fn state(&self, notice_id: &ObjectId, auth: Arc<dyn WriterAuthorization>, keys: Arc<dyn ReadKeySource>) -> Result<NoticeState> {
        let handle = self.tree_manager.get_tree_for_object(&self.space_id, notice_id, auth, keys.clone()).await?;
        let tree = handle.lock().await;
        Ok(materialize(tree.tree(), keys.as_ref())?.into())
    }

    fn require_issuer_or_admin(current: &NoticeState, caller: &AccountId, is_admin: bool) -> Result<()> {
        if current.issuer == caller.0 || is_admin {
            Ok(())
        } else {
            Err(CoreError::permission(format!("{caller} may not change notice issued by {}", current.issuer)))
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn transition(
        &self,
        notice_id: &ObjectId,
        target: LifecycleState,
        caller: &AccountId,
        is_admin: bool,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let current = self.state(notice_id, auth.clone(), keys.clone()).await?;
        let allowed = matches!(
            (current.state, target),
            (LifecycleState::Draft, LifecycleState::Published) | (LifecycleState::Published, LifecycleState::Archived)
        );
        if !allowed {
            return Err(CoreError::validation(format!(
                "invalid notice transition {} -> {}",
                current.state.as_str(),
                target.as_str()
            )));
        }
        Self::require_issuer_or_admin(&current, caller, is_admin)?;

        let mut ops = ChangeOp::set("state", json!(target.as_str()));
        if target == LifecycleState::Published {
            ops = ops.push_set("publishAt", json!(timestamp));
        }
        let plaintext = osc_core::serialization::to_vec(&ops)?;

        let handle = self.tree_manager.get_tree_for_object(&self.space_id, notice_id, auth, keys).await?;
        let mut tree = handle.lock().await;
        tree.add_content(caller, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn publish(
        &self,
        notice_id: &ObjectId,
        caller: &AccountId,
        is_admin: bool,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        self.transition(notice_id, LifecycleState::Published, caller, is_admin, signing_key, timestamp, auth, keys, peers)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn archive(
        &self,
        notice_id: &ObjectId,
        caller: &AccountId,
        is_admin: bool,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        self.transition(notice_id, LifecycleState::Archived, caller, is_admin, signing_key, timestamp, auth, keys, peers)
            .await
    }

    /// Mutates `pinned` and/or `activeUntil`, the two fields §4.6 allows to
    /// change after publication. Rejects any attempt to reach an immutable
    /// field with `ErrImmutable` (modelled as `Validation`, §7).
    #[allow(clippy::too_many_arguments)]
    pub async fn set_pinned_and_active_until(
        &self,
        notice_id: &ObjectId,
        pinned: Option<bool>,
        active_until: Option<i64>,
        caller: &AccountId,
        is_admin: bool,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let current = self.state(notice_id, auth.clone(), keys.clone()).await?;
        Self::require_issuer_or_admin(&current, caller, is_admin)?;

        let mut ops = ChangeOp::default();
        if let Some(pinned) = pinned {
            ops = ops.push_set("pinned", json!(pinned));
        }
        if let Some(active_until) = active_until {
            ops = ops.push_set("activeUntil", json!(active_until));
        }
        if ops.ops.is_empty() {
            return Ok(());
        }
        let plaintext = osc_core::serialization::to_vec(&ops)?;

        let handle = self.tree_manager.get_tree_for_object(&self.space_id, notice_id, auth, keys).await?;
        let mut tree = handle.lock().await;
        tree.add_content(caller, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    /// Edits the immutable core body fields. Only legal while `draft`;
    /// `ErrImmutable` once published (§4.6).
    #[allow(clippy::too_many_arguments)]
    pub async fn edit_draft(
        &self,
        notice_id: &ObjectId,
        title: Option<String>,
        summary: Option<String>,
        body: Option<String>,
        caller: &AccountId,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let current = self.state(notice_id, auth.clone(), keys.clone()).await?;
        if current.state != LifecycleState::Draft {
            return Err(CoreError::validation(format!(
                "notice {notice_id} has immutable core fields once in state {}",
                current.state.as_str()
            )));
        }
        Self::require_issuer_or_admin(&current, caller, true)?;

        let mut ops = ChangeOp::default();
        if let Some(title) = title {
            ops = ops.push_set("title", json!(title));
        }
        if let Some(summary) = summary {
            ops = ops.push_set("summary", json!(summary));
        }
        if let Some(body) = body {
            ops = ops.push_set("body", json!(body));
        }
        if ops.ops.is_empty() {
            return Ok(());
        }
        let plaintext = osc_core::serialization::to_vec(&ops)?;

        let handle = self.tree_manager.get_tree_for_object(&self.space_id, notice_id, auth, keys).await?;
        let mut tree = handle.lock().await;
        tree.add_content(caller, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    /// Amends a published notice by creating a new one that carries
    /// `amendsNoticeId`; the amended notice is left untouched (§9 open
    /// question: audit trail only, no UI rendering policy implied here).
    #[allow(clippy::too_many_arguments)]
    pub async fn amend(
        &self,
        old_notice_id: &ObjectId,
        new_notice_id: ObjectId,
        title: String,
        summary: String,
        body: String,
        event_start: Option<i64>,
        acl_head_id: Cid,
        issuer: &AccountId,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
        peers: &[PeerId],
    ) -> Result<()> {
        let old = self.state(old_notice_id, auth.clone(), keys.clone()).await?;
        if old.state != LifecycleState::Published {
            return Err(CoreError::validation(format!("notice {old_notice_id} must be published to be amended")));
        }
        self.create(
            new_notice_id.clone(),
            old.notice_type,
            title,
            summary,
            body,
            event_start,
            acl_head_id,
            issuer,
            signing_key,
            timestamp,
            auth.clone(),
            keys.clone(),
            peers,
        )
        .await?;

        let ops = ChangeOp::set("amendsNoticeId", json!(old_notice_id.0));
        let plaintext = osc_core::serialization::to_vec(&ops)?;
        let handle = self.tree_manager.get_tree_for_object(&self.space_id, &new_notice_id, auth, keys).await?;
        let mut tree = handle.lock().await;
        tree.add_content(issuer, "ops".into(), plaintext, false, timestamp, signing_key, peers)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    /// Derived views (§4.6): `upcoming`/`current` sort ascending/descending
    /// respectively; `past` catches both archived notices and published
    /// ones whose `activeUntil` has lapsed, without mutating their state.
    pub async fn list_view(
        &self,
        view: NoticeView,
        now: i64,
        grace: i64,
        auth: Arc<dyn WriterAuthorization>,
        keys: Arc<dyn ReadKeySource>,
    ) -> Result<Vec<NoticeState>> {
        let mut matched: Vec<NoticeState> = Vec::new();
        for notice_id in self.index.all() {
            let state = self.state(&notice_id, auth.clone(), keys.clone()).await?;
            let include = match view {
                NoticeView::Upcoming => {
                    state.notice_type == "event" && state.state == LifecycleState::Published && state.event_start.unwrap_or(i64::MIN) >= now - grace
                }
                NoticeView::Current => {
                    matches!(state.notice_type.as_str(), "update" | "announcement")
                        && state.state == LifecycleState::Published
                        && state.active_until.map(|t| t >= now).unwrap_or(true)
                }
                NoticeView::Past => state.state == LifecycleState::Archived || state.active_until.map(|t| t < now).unwrap_or(false),
            };
            if include {
                matched.push(state);
            }
        }
        match view {
            NoticeView::Upcoming => matched.sort_by_key(|n| n.event_start.unwrap_or(i64::MAX)),
            NoticeView::Current => matched.sort_by_key(|n| std::cmp::Reverse(n.publish_at.unwrap_or(0))),
            NoticeView::Past => {}
        }
        Ok(matched)
    }
}
