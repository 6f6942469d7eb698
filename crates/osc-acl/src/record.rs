//! ACL chain record kinds (§3.3, §4.4).

use serde::{Deserialize, Serialize};

use osc_core::crypto::{Cid, Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey, SealedBox};
use osc_core::error::Result;
use osc_core::ids::{AccountId, ReadKeyId};
use osc_core::serialization;

/// Permission level, ordered so `permission >= Writer` comparisons work
/// directly (§3.3 `accountStates`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    None,
    Reader,
    Writer,
    Admin,
    Owner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Joining,
    Active,
    Declined,
    Removed,
}

/// One of the six record kinds forming the space's linear ACL chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AclRecordBody {
    SpaceInit {
        owner: AccountId,
        read_key_id: ReadKeyId,
    },
    InviteAnyone {
        /// Raw X25519 public key bytes (the invite keypair is
        /// encryption-only, never used to sign or verify anything).
        invite_public: [u8; 32],
        enc_read_key: SealedBox,
        permissions: Permission,
    },
    JoinWithoutApprove {
        account: AccountId,
        enc_read_key_for_self: SealedBox,
        metadata: String,
    },
    PermissionChange {
        account: AccountId,
        permission: Permission,
    },
    ReadKeyChange {
        new_key_id: ReadKeyId,
        enc_for_each_member: Vec<(AccountId, SealedBox)>,
    },
    AccountRemove {
        account: AccountId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignableRecord {
    prev_id: Option<Cid>,
    body: AclRecordBody,
    author: Ed25519VerifyingKey,
    timestamp: i64,
}

/// A signed record in the space's linear ACL chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclRecord {
    pub id: Cid,
    pub prev_id: Option<Cid>,
    pub body: AclRecordBody,
    pub author: Ed25519VerifyingKey,
    pub timestamp: i64,
    pub signature: Ed25519Signature,
}

impl AclRecord {
    pub fn seal(
        prev_id: Option<Cid>,
        body: AclRecordBody,
        timestamp: i64,
        signing_key: &Ed25519SigningKey,
    ) -> Result<Self> {
        let author = signing_key.verifying_key();
        let signable = SignableRecord {
            prev_id,
            body,
            author,
            timestamp,
        };
        let raw_payload = serialization::to_vec(&signable)?;
        let id = Cid::of_bytes(&raw_payload);
        let signature = signing_key.sign(&raw_payload);
        Ok(Self {
            id,
            prev_id: signable.prev_id,
            body: signable.body,
            author: signable.author,
            timestamp: signable.timestamp,
            signature,
        })
    }

    pub fn verify(&self) -> Result<()> {
        let signable = SignableRecord {
            prev_id: self.prev_id,
            body: self.body.clone(),
            author: self.author,
            timestamp: self.timestamp,
        };
        let raw_payload = serialization::to_vec(&signable)?;
        let expected_id = Cid::of_bytes(&raw_payload);
        if expected_id != self.id {
            return Err(osc_core::error::CoreError::corruption(format!(
                "acl record {} has mismatched CID",
                self.id
            )));
        }
        self.author.verify(&raw_payload, &self.signature)
    }
}
