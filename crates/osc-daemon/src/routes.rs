//! Façade methods for every operation §6.2 lists as a route, each a plain
//! async method on `Daemon` rather than an HTTP handler (§6.2: "No HTTP
//! framework dependency is added"). A thin wrapper crate maps these onto
//! whatever framework a deployment picks.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;

use osc_chat::{ChannelState, MessageState};
use osc_core::error::Result;
use osc_core::ids::{AccountId, ObjectId, PeerId};
use osc_events::{Event, EventType};
use osc_identity::{CommunityProfileState, CredentialState, PrivateProfileState, SharedProfileState};
use osc_notice::{NoticeState, NoticeView};

use crate::daemon::Daemon;

fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs() as i64
}

/// Per-space tree counts, the body of `GET /spaces/sync-status`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub private_trees: usize,
    pub community_trees: usize,
    pub community_readonly_trees: usize,
    pub admin_trees: usize,
}

/// No peers are ever connected behind `LoopbackTransport`, so every route
/// below fans its write out to this empty peer list rather than querying
/// one from the transport each call.
const NO_PEERS: &[PeerId] = &[];

impl Daemon {
    pub fn aid(&self) -> &str {
        &self.identity.record.aid
    }

    pub fn health(&self) -> Value {
        serde_json::json!({ "status": "ok", "aid": self.aid() })
    }

    pub fn sync_status(&self) -> SyncStatus {
        SyncStatus {
            private_trees: self.private.tree_manager.tree_count(&self.private.space_id),
            community_trees: self.community.tree_manager.tree_count(&self.community.space_id),
            community_readonly_trees: self.community_readonly.tree_manager.tree_count(&self.community_readonly.space_id),
            admin_trees: self.admin.tree_manager.tree_count(&self.admin.space_id),
        }
    }

    pub fn subscribe_events(&self) -> osc_events::Subscription {
        self.events.subscribe()
    }

    // ---- profiles (§6.2 /profiles) -------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_shared_profile(&self, display_name: String, bio: String, avatar_ref: Option<String>, socials: Vec<String>) -> Result<()> {
        let account = self.identity.aid().clone();
        self.shared_profiles
            .upsert(
                &account,
                display_name,
                bio,
                avatar_ref,
                socials,
                self.community.acl.read().tail_id(),
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await
    }

    pub async fn get_shared_profile(&self, account: &AccountId) -> Result<SharedProfileState> {
        self.shared_profiles.get(account, self.community.auth(), self.community.keys()).await
    }

    pub async fn list_shared_profiles(&self) -> Result<Vec<SharedProfileState>> {
        self.shared_profiles.list(self.community.auth(), self.community.keys()).await
    }

    pub async fn get_my_shared_profile(&self) -> Result<SharedProfileState> {
        self.get_shared_profile(self.identity.aid()).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn set_community_profile(&self, account: &AccountId, role: String, permissions: Vec<String>, credential_ids: Vec<String>) -> Result<()> {
        let admin = self.identity.aid().clone();
        self.community_profiles
            .set(
                account,
                role,
                permissions,
                credential_ids,
                self.community.acl.read().tail_id(),
                &admin,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await
    }

    pub async fn get_community_profile(&self, account: &AccountId) -> Result<CommunityProfileState> {
        self.community_profiles.get(account, self.community.auth(), self.community.keys()).await
    }

    pub async fn upsert_private_profile(&self, preferences: Value, private_credential_saids: Vec<String>) -> Result<()> {
        let account = self.identity.aid().clone();
        self.private_profiles
            .upsert(
                &account,
                preferences,
                private_credential_saids,
                self.private.acl.read().tail_id(),
                &self.identity.private_keys.signing_key,
                now(),
                self.private.auth(),
                self.private.keys(),
                NO_PEERS,
            )
            .await
    }

    pub async fn get_private_profile(&self) -> Result<PrivateProfileState> {
        self.private_profiles.get(self.identity.aid(), self.private.auth(), self.private.keys()).await
    }

    /// `/profiles/init-member` (§6.2): seeds empty shared/private profiles
    /// for a newly joined member so `GET /profiles/me` never 404s.
    pub async fn init_member_profiles(&self) -> Result<()> {
        self.upsert_shared_profile(String::new(), String::new(), None, Vec::new()).await?;
        self.upsert_private_profile(Value::Object(Default::default()), Vec::new()).await
    }

    // ---- credentials ----------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn cache_credential(&self, said: String, schema: String, issuer: String, payload: Value) -> Result<()> {
        let author = self.identity.aid().clone();
        self.credentials
            .cache(
                &self.community.space_id,
                said,
                schema,
                issuer,
                payload,
                self.community.acl.read().tail_id(),
                &author,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await
    }

    pub async fn revoke_credential(&self, said: &str) -> Result<()> {
        let author = self.identity.aid().clone();
        self.credentials
            .revoke(
                &self.community.space_id,
                said,
                &author,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await
    }

    pub async fn get_credential(&self, said: &str) -> Result<CredentialState> {
        self.credentials.get(&self.community.space_id, said, self.community.auth(), self.community.keys()).await
    }

    // ---- chat -------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn create_channel(&self, channel_id: ObjectId, name: String, description: String, allowed_roles: Vec<String>) -> Result<()> {
        let author = self.identity.aid().clone();
        self.channels
            .create(
                channel_id,
                name,
                description,
                allowed_roles,
                self.community.acl.read().tail_id(),
                &author,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await?;
        self.events.publish(Event::new(EventType::ChatChannelNew, self.community.space_id.clone(), Value::Null));
        Ok(())
    }

    pub async fn get_channel(&self, channel_id: &ObjectId) -> Result<ChannelState> {
        self.channels.state(channel_id, self.community.auth(), self.community.keys()).await
    }

    pub async fn rename_channel(&self, channel_id: &ObjectId, name: String, description: String) -> Result<()> {
        let author = self.identity.aid().clone();
        self.channels
            .rename(
                channel_id,
                name,
                description,
                &author,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await
    }

    pub async fn archive_channel(&self, channel_id: &ObjectId) -> Result<()> {
        let author = self.identity.aid().clone();
        self.channels
            .set_archived(
                channel_id,
                true,
                &author,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn post_message(&self, message_id: ObjectId, channel_id: &ObjectId, content: String, reply_to: Option<String>) -> Result<()> {
        let author = self.identity.aid().clone();
        self.messages
            .post(
                message_id,
                channel_id,
                content,
                reply_to,
                self.community.acl.read().tail_id(),
                &author,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await?;
        self.events.publish(Event::new(EventType::ChatMessageNew, self.community.space_id.clone(), Value::Null));
        Ok(())
    }

    pub async fn edit_message(&self, message_id: &ObjectId, content: String) -> Result<()> {
        let editor = self.identity.aid().clone();
        self.messages
            .edit(
                message_id,
                content,
                &editor,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await?;
        self.events.publish(Event::new(EventType::ChatMessageEdit, self.community.space_id.clone(), Value::Null));
        Ok(())
    }

    pub async fn delete_message(&self, message_id: &ObjectId) -> Result<()> {
        let deleter = self.identity.aid().clone();
        self.messages
            .soft_delete(
                message_id,
                &deleter,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await?;
        self.events.publish(Event::new(EventType::ChatMessageDelete, self.community.space_id.clone(), Value::Null));
        Ok(())
    }

    pub async fn list_channel_messages(&self, channel_id: &ObjectId) -> Result<Vec<MessageState>> {
        self.messages.list_channel(channel_id, self.community.auth(), self.community.keys()).await
    }

    pub async fn message_thread(&self, message_id: &ObjectId) -> Result<Vec<MessageState>> {
        self.messages.thread(message_id, self.community.auth(), self.community.keys()).await
    }

    pub async fn add_reaction(&self, message_id: &str, emoji: &str) -> Result<usize> {
        let account = self.identity.aid().clone();
        let count = self
            .reactions
            .add(
                message_id,
                emoji,
                &account,
                self.community.acl.read().tail_id(),
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await?;
        self.events.publish(Event::new(EventType::ChatReactionAdd, self.community.space_id.clone(), Value::Null));
        Ok(count)
    }

    pub async fn remove_reaction(&self, message_id: &str, emoji: &str) -> Result<usize> {
        let account = self.identity.aid().clone();
        let count = self
            .reactions
            .remove(
                message_id,
                emoji,
                &account,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await?;
        self.events.publish(Event::new(EventType::ChatReactionRemove, self.community.space_id.clone(), Value::Null));
        Ok(count)
    }

    // ---- notices ----------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn create_notice(
        &self,
        notice_id: ObjectId,
        notice_type: String,
        title: String,
        summary: String,
        body: String,
        event_start: Option<i64>,
    ) -> Result<()> {
        let issuer = self.identity.aid().clone();
        self.notices
            .create(
                notice_id,
                notice_type,
                title,
                summary,
                body,
                event_start,
                self.community.acl.read().tail_id(),
                &issuer,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await?;
        self.events.publish(Event::new(EventType::NoticeCreated, self.community.space_id.clone(), Value::Null));
        Ok(())
    }

    pub async fn get_notice(&self, notice_id: &ObjectId) -> Result<NoticeState> {
        self.notices.state(notice_id, self.community.auth(), self.community.keys()).await
    }

    pub async fn list_notices(&self, view: NoticeView, grace: i64) -> Result<Vec<NoticeState>> {
        self.notices.list_view(view, now(), grace, self.community.auth(), self.community.keys()).await
    }

    pub async fn publish_notice(&self, notice_id: &ObjectId, is_admin: bool) -> Result<()> {
        let caller = self.identity.aid().clone();
        self.notices
            .publish(
                notice_id,
                &caller,
                is_admin,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await?;
        self.events.publish(Event::new(EventType::NoticePublished, self.community.space_id.clone(), Value::Null));
        Ok(())
    }

    pub async fn archive_notice(&self, notice_id: &ObjectId, is_admin: bool) -> Result<()> {
        let caller = self.identity.aid().clone();
        self.notices
            .archive(
                notice_id,
                &caller,
                is_admin,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await?;
        self.events.publish(Event::new(EventType::NoticeArchived, self.community.space_id.clone(), Value::Null));
        Ok(())
    }

    pub async fn pin_notice(&self, notice_id: &ObjectId, pinned: Option<bool>, active_until: Option<i64>, is_admin: bool) -> Result<()> {
        let caller = self.identity.aid().clone();
        self.notices
            .set_pinned_and_active_until(
                notice_id,
                pinned,
                active_until,
                &caller,
                is_admin,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await
    }

    pub async fn rsvp(&self, notice_id: &str, status: String) -> Result<()> {
        let account = self.identity.aid().clone();
        self.notice_rsvps
            .set_status(
                notice_id,
                &account,
                status,
                self.community.acl.read().tail_id(),
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await
    }

    pub async fn rsvp_statuses(&self, notice_id: &str) -> Result<Vec<(String, String)>> {
        self.notice_rsvps.statuses(notice_id, self.community.auth(), self.community.keys()).await
    }

    pub async fn acknowledge_notice(&self, notice_id: &str, record_id: String) -> Result<()> {
        let author = self.identity.aid().clone();
        self.notice_acks
            .append(
                notice_id,
                record_id,
                Value::Bool(true),
                &author,
                self.community.acl.read().tail_id(),
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await
    }

    pub async fn save_notice(&self, notice_id: &str, record_id: String) -> Result<()> {
        let author = self.identity.aid().clone();
        self.notice_saves
            .append(
                notice_id,
                record_id,
                Value::Bool(true),
                &author,
                self.community.acl.read().tail_id(),
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await
    }

    pub async fn comment_on_notice(&self, notice_id: &str, record_id: String, comment: Value) -> Result<()> {
        let author = self.identity.aid().clone();
        self.notice_comments
            .append(
                notice_id,
                record_id,
                comment,
                &author,
                self.community.acl.read().tail_id(),
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await?;
        self.events.publish(Event::new(EventType::NoticeComment, self.community.space_id.clone(), Value::Null));
        Ok(())
    }

    pub async fn notice_comments(&self, notice_id: &str) -> Result<Vec<Value>> {
        self.notice_comments.records(notice_id, self.community.auth(), self.community.keys()).await
    }

    pub async fn add_notice_reaction(&self, notice_id: &str, emoji: &str) -> Result<usize> {
        let account = self.identity.aid().clone();
        let count = self
            .notice_reactions
            .add(
                notice_id,
                emoji,
                &account,
                self.community.acl.read().tail_id(),
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await?;
        self.events.publish(Event::new(EventType::NoticeReaction, self.community.space_id.clone(), Value::Null));
        Ok(count)
    }

    pub async fn remove_notice_reaction(&self, notice_id: &str, emoji: &str) -> Result<usize> {
        let account = self.identity.aid().clone();
        self.notice_reactions
            .remove(
                notice_id,
                emoji,
                &account,
                &self.identity.community_keys.signing_key,
                now(),
                self.community.auth(),
                self.community.keys(),
                NO_PEERS,
            )
            .await
    }
}
