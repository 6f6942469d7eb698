//! The per-space linear ACL chain: invite issuance, join flow, permission
//! resolution, and read-key rotation/chaining (§3.3, §4.4).

use std::collections::{BTreeMap, HashMap};

use osc_core::crypto::{Cid, Ed25519SigningKey, ReadKey};
use osc_core::error::{CoreError, Result};
use osc_core::ids::{AccountId, ReadKeyId};
use osc_tree::{ReadKeySource, WriterAuthorization};

use crate::record::{AccountStatus, AclRecord, AclRecordBody, Permission};

/// Derived view of the chain at some prefix (possibly not the tail): the
/// spec requires permission checks to be resolved against the ACL state at
/// a change's `aclHeadId`, not the current tail (§3.3 invariant).
#[derive(Debug, Clone, Default)]
pub struct AclState {
    pub account_states: HashMap<AccountId, (Permission, AccountStatus)>,
}

impl AclState {
    pub fn permission_of(&self, account: &AccountId) -> Permission {
        self.account_states
            .get(account)
            .map(|(permission, _)| *permission)
            .unwrap_or(Permission::None)
    }
}

/// The space's linear (non-DAG) ACL chain plus the local participant's
/// decrypted read-key cache.
pub struct AclTree {
    records: Vec<AclRecord>,
    index_by_id: HashMap<Cid, usize>,
    /// Keys this local participant has been able to decrypt so far, via
    /// their own X25519 identity or an invite's ephemeral private key.
    read_keys: BTreeMap<ReadKeyId, ReadKey>,
    current_read_key_id: ReadKeyId,
    own_account: AccountId,
    own_x25519_private: x25519_dalek::StaticSecret,
}

impl AclTree {
    /// Starts a new chain for a freshly-created space.
    pub fn init(
        owner: AccountId,
        owner_read_key: ReadKey,
        owner_x25519_private: x25519_dalek::StaticSecret,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
    ) -> Result<Self> {
        let record = AclRecord::seal(
            None,
            AclRecordBody::SpaceInit {
                owner: owner.clone(),
                read_key_id: ReadKeyId(0),
            },
            timestamp,
            signing_key,
        )?;
        let mut tree = Self {
            records: Vec::new(),
            index_by_id: HashMap::new(),
            read_keys: BTreeMap::new(),
            current_read_key_id: ReadKeyId(0),
            own_account: owner,
            own_x25519_private: owner_x25519_private,
        };
        tree.read_keys.insert(ReadKeyId(0), owner_read_key);
        tree.push(record)?;
        Ok(tree)
    }

    /// Rehydrates a chain from records already verified and persisted
    /// (e.g. loaded from the Change Store-backed ACL log at startup).
    pub fn from_records(
        records: Vec<AclRecord>,
        own_account: AccountId,
        own_x25519_private: x25519_dalek::StaticSecret,
    ) -> Result<Self> {
        let mut tree = Self {
            records: Vec::new(),
            index_by_id: HashMap::new(),
            read_keys: BTreeMap::new(),
            current_read_key_id: ReadKeyId(0),
            own_account,
            own_x25519_private,
        };
        for record in records {
            tree.push(record)?;
        }
        Ok(tree)
    }

    pub fn tail_id(&self) -> Cid {
        self.records.last().expect("chain always has spaceInit").id
    }

    pub fn records(&self) -> &[AclRecord] {
        &self.records
    }

    fn push(&mut self, record: AclRecord) -> Result<()> {
        record.verify()?;
        let expected_prev = self.records.last().map(|r| r.id);
        if record.prev_id != expected_prev {
            return Err(CoreError::conflict(format!(
                "acl record {} has stale prevId (expected {:?}, got {:?})",
                record.id, expected_prev, record.prev_id
            )));
        }
        self.try_decrypt_read_key(&record);
        self.index_by_id.insert(record.id, self.records.len());
        self.records.push(record);
        Ok(())
    }

    /// Appends and validates a new record against the current tail.
    pub fn append(&mut self, record: AclRecord) -> Result<()> {
        self.push(record)
    }

    fn try_decrypt_read_key(&mut self, record: &AclRecord) {
        match &record.body {
            AclRecordBody::SpaceInit { read_key_id, .. } => {
                // already supplied by the space-creating participant at `init`
                let _ = read_key_id;
            }
            AclRecordBody::JoinWithoutApprove { account, enc_read_key_for_self, .. } => {
                if *account == self.own_account {
                    if let Ok(bytes) = osc_core::crypto::open_sealed(&self.own_x25519_private, enc_read_key_for_self) {
                        if let Ok(arr) = <[u8; 32]>::try_from(bytes.as_slice()) {
                            self.read_keys.insert(self.current_read_key_id, ReadKey(arr));
                        }
                    }
                }
            }
            AclRecordBody::ReadKeyChange { new_key_id, enc_for_each_member } => {
                for (account, sealed) in enc_for_each_member {
                    if *account == self.own_account {
                        if let Ok(bytes) = osc_core::crypto::open_sealed(&self.own_x25519_private, sealed) {
                            if let Ok(arr) = <[u8; 32]>::try_from(bytes.as_slice()) {
                                self.read_keys.insert(*new_key_id, ReadKey(arr));
                                self.current_read_key_id = *new_key_id;
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Replays the chain from genesis up to and including `head_id`,
    /// producing the ACL state valid at that point (§3.3, §4.4 permission
    /// resolution uses the change's own `aclHeadId`, not the tail).
    pub fn state_at(&self, head_id: Cid) -> Result<AclState> {
        let position = *self
            .index_by_id
            .get(&head_id)
            .ok_or_else(|| CoreError::not_found(format!("unknown acl head {head_id}")))?;

        let mut state = AclState::default();
        for record in &self.records[..=position] {
            match &record.body {
                AclRecordBody::SpaceInit { owner, .. } => {
                    state
                        .account_states
                        .insert(owner.clone(), (Permission::Owner, AccountStatus::Active));
                }
                AclRecordBody::InviteAnyone { .. } => {}
                AclRecordBody::JoinWithoutApprove { account, .. } => {
                    state
                        .account_states
                        .entry(account.clone())
                        .or_insert((Permission::Writer, AccountStatus::Active));
                }
                AclRecordBody::PermissionChange { account, permission } => {
                    let entry = state
                        .account_states
                        .entry(account.clone())
                        .or_insert((Permission::None, AccountStatus::Active));
                    entry.0 = *permission;
                }
                AclRecordBody::ReadKeyChange { .. } => {}
                AclRecordBody::AccountRemove { account } => {
                    if let Some(entry) = state.account_states.get_mut(account) {
                        entry.1 = AccountStatus::Removed;
                        entry.0 = Permission::None;
                    }
                }
            }
        }
        Ok(state)
    }

    /// `canWrite(accountId, aclHeadId)` (§4.4).
    pub fn can_write_at(&self, account: &AccountId, acl_head_id: Cid) -> bool {
        match self.state_at(acl_head_id) {
            Ok(state) => {
                let (permission, status) = state
                    .account_states
                    .get(account)
                    .copied()
                    .unwrap_or((Permission::None, AccountStatus::Removed));
                status == AccountStatus::Active && permission >= Permission::Writer
            }
            Err(_) => false,
        }
    }

    /// Invite-issuance step 1-3 (§4.4): generates an ephemeral keypair,
    /// seals the current read key to it, and appends the record. The
    /// caller is responsible for delivering `invite_private` out of band.
    pub fn issue_invite(
        &mut self,
        permissions: Permission,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
    ) -> Result<(x25519_dalek::StaticSecret, AclRecord)> {
        let invite_private = x25519_dalek::StaticSecret::random_from_rng(rand_core::OsRng);
        let invite_public = x25519_dalek::PublicKey::from(&invite_private);
        let current_key = *self
            .read_keys
            .get(&self.current_read_key_id)
            .ok_or_else(|| CoreError::infrastructure("no local read key to seal for invite"))?;
        let sealed = osc_core::crypto::seal_to(&invite_public, &current_key.0)?;

        let record = AclRecord::seal(
            Some(self.tail_id()),
            AclRecordBody::InviteAnyone {
                invite_public: *invite_public.as_bytes(),
                enc_read_key: sealed,
                permissions,
            },
            timestamp,
            signing_key,
        )?;
        self.append(record.clone())?;
        Ok((invite_private, record))
    }

    /// Join-flow step 1-4 (§4.4): decrypts the invite's read key and
    /// re-encrypts it to the joining account's own X25519 public key.
    pub fn join_with_invite(
        &mut self,
        invite_record: &AclRecord,
        invite_private: &x25519_dalek::StaticSecret,
        account: AccountId,
        own_x25519_public: &x25519_dalek::PublicKey,
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
        metadata: String,
    ) -> Result<AclRecord> {
        let AclRecordBody::InviteAnyone { enc_read_key, .. } = &invite_record.body else {
            return Err(CoreError::validation("record is not an inviteAnyone record"));
        };
        let read_key_bytes = osc_core::crypto::open_sealed(invite_private, enc_read_key)?;
        let resealed = osc_core::crypto::seal_to(own_x25519_public, &read_key_bytes)?;

        let record = AclRecord::seal(
            Some(self.tail_id()),
            AclRecordBody::JoinWithoutApprove {
                account,
                enc_read_key_for_self: resealed,
                metadata,
            },
            timestamp,
            signing_key,
        )?;
        self.append(record.clone())?;
        Ok(record)
    }

    /// Read-key rotation (§4.4): appends a `readKeyChange` record whose
    /// `encForEachMember` seals the new key to every currently-active
    /// member's X25519 public key.
    pub fn rotate_read_key(
        &mut self,
        new_key_id: ReadKeyId,
        new_key: ReadKey,
        member_public_keys: &[(AccountId, x25519_dalek::PublicKey)],
        signing_key: &Ed25519SigningKey,
        timestamp: i64,
    ) -> Result<AclRecord> {
        let mut enc_for_each_member = Vec::with_capacity(member_public_keys.len());
        for (account, public_key) in member_public_keys {
            let sealed = osc_core::crypto::seal_to(public_key, &new_key.0)?;
            enc_for_each_member.push((account.clone(), sealed));
        }
        let record = AclRecord::seal(
            Some(self.tail_id()),
            AclRecordBody::ReadKeyChange {
                new_key_id,
                enc_for_each_member,
            },
            timestamp,
            signing_key,
        )?;
        self.append(record.clone())?;
        Ok(record)
    }
}

impl WriterAuthorization for AclTree {
    fn can_write(&self, account: &AccountId, acl_head_id: &Cid) -> bool {
        self.can_write_at(account, *acl_head_id)
    }

    fn current_acl_head(&self) -> Cid {
        self.tail_id()
    }
}

impl ReadKeySource for AclTree {
    fn read_key(&self, read_key_id: ReadKeyId) -> Option<ReadKey> {
        self.read_keys.get(&read_key_id).copied()
    }

    fn current_read_key(&self) -> (ReadKeyId, ReadKey) {
        (
            self.current_read_key_id,
            self.read_keys[&self.current_read_key_id],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_owner() -> (AclTree, Ed25519SigningKey, AccountId) {
        let signing_key = Ed25519SigningKey::from_bytes([4u8; 32]);
        let owner = AccountId::new("owner");
        let owner_private = x25519_dalek::StaticSecret::random_from_rng(rand_core::OsRng);
        let tree = AclTree::init(owner.clone(), ReadKey([1u8; 32]), owner_private, &signing_key, 1).unwrap();
        (tree, signing_key, owner)
    }

    #[test]
    fn owner_can_write_from_genesis() {
        let (tree, _signing_key, owner) = test_owner();
        let head = tree.tail_id();
        assert!(tree.can_write_at(&owner, head));
    }

    #[test]
    fn stale_prev_id_is_rejected() {
        let (mut tree, signing_key, _owner) = test_owner();
        let stale = Cid::of_bytes(b"not-the-tail");
        let bad = AclRecord::seal(
            Some(stale),
            AclRecordBody::AccountRemove { account: AccountId::new("x") },
            2,
            &signing_key,
        )
        .unwrap();
        assert!(tree.append(bad).is_err());
    }

    #[test]
    fn invite_and_join_grants_writer_permission() {
        let (mut tree, signing_key, _owner) = test_owner();
        let (invite_private, invite_record) = tree
            .issue_invite(Permission::Writer, &signing_key, 2)
            .unwrap();

        let member_private = x25519_dalek::StaticSecret::random_from_rng(rand_core::OsRng);
        let member_public = x25519_dalek::PublicKey::from(&member_private);
        let member_signing_key = Ed25519SigningKey::from_bytes([8u8; 32]);
        let member = AccountId::new("member-1");

        let mut member_tree = AclTree::from_records(
            tree.records().to_vec(),
            member.clone(),
            member_private,
        )
        .unwrap();

        let join_record = member_tree
            .join_with_invite(
                &invite_record,
                &invite_private,
                member.clone(),
                &member_public,
                &member_signing_key,
                3,
                "{}".into(),
            )
            .unwrap();
        tree.append(join_record.clone()).unwrap();

        let head = tree.tail_id();
        assert!(tree.can_write_at(&member, head));
        assert!(member_tree.read_key(ReadKeyId(0)).is_some());
    }
}
