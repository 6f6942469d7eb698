//! The daemon's bootstrap: on first run, generates an identity and a
//! four-space ACL chain set from a fresh mnemonic; on every run after,
//! rehydrates both from `<dataDir>` and wires up a `Space` per space type
//! (§4.10, §6.3). Route-level façade methods live in `routes.rs`.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use osc_acl::AclTree;
use osc_chat::{ChannelManager, ChannelMessageIndex, MessageManager, ReactionManager};
use osc_core::config::CoreConfig;
use osc_core::crypto::key_derivation::{generate_mnemonic, SpaceKeySet};
use osc_core::error::Result;
use osc_core::ids::AccountId;
use osc_events::EventBroker;
use osc_identity::{
    CommunityProfileManager, CredentialManager, Identity, IdentityStore, PrivateProfileManager, SharedProfileManager,
};
use osc_notice::{AppendOnlyRecordManager, NoticeIndex, NoticeManager, NoticeReactionManager, NoticeRsvpManager};
use osc_space::{AclHandle, NoRemote, Space, SpaceType, UnifiedTreeManager};
use osc_store::ChangeStore;

use crate::acl_store::AclStore;
use crate::peer_key::PeerKeyStore;
use crate::transport::LoopbackTransport;

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs() as i64
}

/// One wired-up `Space` per well-known space type, plus the identity and
/// shared infrastructure (`ChangeStore`, `EventBroker`) they're all built on.
pub struct Daemon {
    pub config: CoreConfig,
    pub identity: Identity,
    pub private: Arc<Space>,
    pub community: Arc<Space>,
    pub community_readonly: Arc<Space>,
    pub admin: Arc<Space>,
    pub events: EventBroker,
    pub credentials: CredentialManager,
    pub shared_profiles: SharedProfileManager,
    pub community_profiles: CommunityProfileManager,
    pub private_profiles: PrivateProfileManager,
    pub channels: ChannelManager,
    pub messages: MessageManager,
    pub reactions: ReactionManager,
    pub notices: NoticeManager,
    pub notice_rsvps: NoticeRsvpManager,
    pub notice_acks: AppendOnlyRecordManager,
    pub notice_saves: AppendOnlyRecordManager,
    pub notice_comments: AppendOnlyRecordManager,
    pub notice_reactions: NoticeReactionManager,
    store: Arc<ChangeStore>,
}

impl Daemon {
    /// Loads `identity.json` if present, otherwise mints a fresh mnemonic
    /// and persists the new identity before bootstrapping any space.
    pub async fn start(config: CoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let identity_store = IdentityStore::new(&config.data_dir);
        let identity = if identity_store.exists() {
            let record = identity_store.load()?;
            Identity::from_mnemonic(&record.mnemonic, "")?
        } else {
            let mnemonic = generate_mnemonic();
            let identity = Identity::from_mnemonic(&mnemonic, "")?;
            identity_store.save(&identity.record)?;
            identity
        };

        let peer_secret = PeerKeyStore::new(&config.data_dir, &identity.record.aid).load_or_create()?;
        let store = Arc::new(ChangeStore::open(&config.data_dir)?);
        let events = EventBroker::from_config(&config);
        let credentials = CredentialManager::new(Arc::new(UnifiedTreeManager::new(
            store.clone(),
            Arc::new(LoopbackTransport),
            Arc::new(NoRemote),
            config.snapshot_interval,
        )));

        let private = Self::bootstrap_space(
            &config,
            SpaceType::Private,
            "private",
            identity.account_id.clone(),
            &identity.private_keys,
            peer_secret.clone(),
            store.clone(),
        )?;
        let community = Self::bootstrap_space(
            &config,
            SpaceType::Community,
            "community",
            identity.account_id.clone(),
            &identity.community_keys,
            peer_secret.clone(),
            store.clone(),
        )?;
        let community_readonly = Self::bootstrap_space(
            &config,
            SpaceType::CommunityReadonly,
            "community_readonly",
            identity.account_id.clone(),
            &identity.community_readonly_keys,
            peer_secret.clone(),
            store.clone(),
        )?;
        let admin = Self::bootstrap_space(
            &config,
            SpaceType::Admin,
            "admin",
            identity.account_id.clone(),
            &identity.admin_keys,
            peer_secret,
            store.clone(),
        )?;

        let shared_profiles = SharedProfileManager::new(community.tree_manager.clone(), community.space_id.clone());
        let community_profiles = CommunityProfileManager::new(community.tree_manager.clone(), community.space_id.clone());
        let private_profiles = PrivateProfileManager::new(private.tree_manager.clone(), private.space_id.clone());

        let channels = ChannelManager::new(community.tree_manager.clone(), community.space_id.clone());
        let message_index = Arc::new(ChannelMessageIndex::new());
        let messages = MessageManager::new(community.tree_manager.clone(), community.space_id.clone(), message_index);
        let reactions = ReactionManager::new(community.tree_manager.clone(), community.space_id.clone());

        let notice_index = Arc::new(NoticeIndex::new());
        let notices = NoticeManager::new(community.tree_manager.clone(), community.space_id.clone(), notice_index);
        let notice_rsvps = NoticeRsvpManager::new(community.tree_manager.clone(), community.space_id.clone());
        let notice_acks = AppendOnlyRecordManager::new("NoticeAck", community.tree_manager.clone(), community.space_id.clone());
        let notice_saves = AppendOnlyRecordManager::new("NoticeSave", community.tree_manager.clone(), community.space_id.clone());
        let notice_comments =
            AppendOnlyRecordManager::new("NoticeComment", community.tree_manager.clone(), community.space_id.clone());
        let notice_reactions = NoticeReactionManager::new(community.tree_manager.clone(), community.space_id.clone());

        Ok(Self {
            config,
            identity,
            private,
            community,
            community_readonly,
            admin,
            events,
            credentials,
            shared_profiles,
            community_profiles,
            private_profiles,
            channels,
            messages,
            reactions,
            notices,
            notice_rsvps,
            notice_acks,
            notice_saves,
            notice_comments,
            notice_reactions,
            store,
        })
    }

    fn bootstrap_space(
        config: &CoreConfig,
        space_type: SpaceType,
        dir_name: &str,
        own_account: AccountId,
        keys: &SpaceKeySet,
        own_x25519_private: x25519_dalek::StaticSecret,
        store: Arc<ChangeStore>,
    ) -> Result<Arc<Space>> {
        let space_id = osc_core::ids::SpaceId::new(hex::encode(keys.signing_key.verifying_key().as_bytes()));
        let acl_store = AclStore::new(&config.data_dir, dir_name);
        let own_account_for_space = own_account.clone();

        let acl_tree = if acl_store.exists() {
            let records = acl_store.load()?;
            AclTree::from_records(records, own_account, own_x25519_private)?
        } else {
            let tree = AclTree::init(own_account, keys.read_key, own_x25519_private, &keys.signing_key, now_unix())?;
            acl_store.save(tree.records())?;
            tree
        };

        let acl = AclHandle::new(acl_tree);
        let transport = Arc::new(LoopbackTransport);
        let tree_manager = Arc::new(UnifiedTreeManager::new(
            store,
            transport.clone(),
            Arc::new(NoRemote),
            config.snapshot_interval,
        ));

        Ok(Space::init(
            space_id,
            space_type,
            own_account_for_space,
            acl,
            tree_manager,
            transport,
            config.sync_period(),
        ))
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Stops every space's HeadSync cycle. `Space::drop` would do this
    /// anyway, but an explicit call lets the daemon log a clean shutdown.
    pub fn close(&self) {
        self.private.close();
        self.community.close();
        self.community_readonly.close();
        self.admin.close();
    }

    /// Persists the current ACL chain for every space, called after any
    /// mutation that appends a record (invite issuance, join, rotation).
    pub fn persist_acl(&self, space_type: SpaceType) -> Result<()> {
        let (space, dir_name) = match space_type {
            SpaceType::Private => (&self.private, "private"),
            SpaceType::Community => (&self.community, "community"),
            SpaceType::CommunityReadonly => (&self.community_readonly, "community_readonly"),
            SpaceType::Admin => (&self.admin, "admin"),
        };
        let acl_store = AclStore::new(&self.config.data_dir, dir_name);
        acl_store.save(space.acl.read().records())
    }
}
