//! The `Change` primitive and its incremental payload form (§3.1, §3.6).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use osc_core::crypto::{Cid, Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey};
use osc_core::error::{CoreError, Result};
use osc_core::ids::ReadKeyId;
use osc_core::serialization;

/// Unencrypted header carried by a tree's root change, so object indexing
/// works without holding the space's read key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRootHeader {
    pub object_id: String,
    pub object_type: String,
}

/// One field mutation in an incremental `ChangeOp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOp {
    pub field: String,
    pub op: FieldOpKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FieldOpKind {
    Set(serde_json::Value),
    Unset,
}

/// `{ops: [...]}` application payload (§3.6); replayed in topological order
/// from the nearest snapshot to materialise state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeOp {
    pub ops: Vec<FieldOp>,
}

impl ChangeOp {
    pub fn set(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            ops: vec![FieldOp {
                field: field.into(),
                op: FieldOpKind::Set(value),
            }],
        }
    }

    pub fn unset(field: impl Into<String>) -> Self {
        Self {
            ops: vec![FieldOp {
                field: field.into(),
                op: FieldOpKind::Unset,
            }],
        }
    }

    pub fn push_set(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.ops.push(FieldOp {
            field: field.into(),
            op: FieldOpKind::Set(value),
        });
        self
    }
}

/// Complete materialised state at a snapshot point (§3.6: "Snapshots store
/// the complete field map").
pub type SnapshotState = std::collections::BTreeMap<String, serde_json::Value>;

/// The payload carried in `Change.data` once decrypted, or in the root's
/// unencrypted `changePayload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChangePayload {
    /// Root change: `{objectId, objectType}`, never encrypted.
    Root(TreeRootHeader),
    /// Ordinary change: incremental field mutations.
    Ops(ChangeOp),
    /// Snapshot change: full materialised state.
    Snapshot(SnapshotState),
}

/// Fields that are signed and hashed to produce `id`; everything but `id`
/// and `signature` itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignableFields {
    previous_ids: BTreeSet<Cid>,
    acl_head_id: Cid,
    snapshot_base_id: Option<Cid>,
    is_snapshot: bool,
    snapshot_counter: u32,
    timestamp: i64,
    identity: Ed25519VerifyingKey,
    read_key_id: Option<ReadKeyId>,
    data_type: String,
    data: Vec<u8>,
}

/// An immutable, signed record in an Object Tree (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub id: Cid,
    pub previous_ids: BTreeSet<Cid>,
    pub acl_head_id: Cid,
    pub snapshot_base_id: Option<Cid>,
    pub is_snapshot: bool,
    pub snapshot_counter: u32,
    pub timestamp: i64,
    pub identity: Ed25519VerifyingKey,
    pub read_key_id: Option<ReadKeyId>,
    pub data_type: String,
    pub data: Vec<u8>,
    pub signature: Ed25519Signature,
}

impl Change {
    /// Builds, signs, and computes the CID for a new change. `data` must
    /// already be encrypted (or, for a root change, the plaintext header
    /// bytes — the root is never encrypted).
    #[allow(clippy::too_many_arguments)]
    pub fn seal(
        previous_ids: BTreeSet<Cid>,
        acl_head_id: Cid,
        snapshot_base_id: Option<Cid>,
        is_snapshot: bool,
        snapshot_counter: u32,
        timestamp: i64,
        read_key_id: Option<ReadKeyId>,
        data_type: String,
        data: Vec<u8>,
        signing_key: &Ed25519SigningKey,
    ) -> Result<Self> {
        let identity = signing_key.verifying_key();
        let signable = SignableFields {
            previous_ids,
            acl_head_id,
            snapshot_base_id,
            is_snapshot,
            snapshot_counter,
            timestamp,
            identity,
            read_key_id,
            data_type,
            data,
        };
        let raw_payload = serialization::to_vec(&signable)?;
        let id = Cid::of_bytes(&raw_payload);
        let signature = signing_key.sign(&raw_payload);

        Ok(Self {
            id,
            previous_ids: signable.previous_ids,
            acl_head_id: signable.acl_head_id,
            snapshot_base_id: signable.snapshot_base_id,
            is_snapshot: signable.is_snapshot,
            snapshot_counter: signable.snapshot_counter,
            timestamp: signable.timestamp,
            identity: signable.identity,
            read_key_id: signable.read_key_id,
            data_type: signable.data_type,
            data: signable.data,
            signature,
        })
    }

    fn signable(&self) -> SignableFields {
        SignableFields {
            previous_ids: self.previous_ids.clone(),
            acl_head_id: self.acl_head_id,
            snapshot_base_id: self.snapshot_base_id,
            is_snapshot: self.is_snapshot,
            snapshot_counter: self.snapshot_counter,
            timestamp: self.timestamp,
            identity: self.identity,
            read_key_id: self.read_key_id,
            data_type: self.data_type.clone(),
            data: self.data.clone(),
        }
    }

    fn raw_payload(&self) -> Result<Vec<u8>> {
        serialization::to_vec(&self.signable())
    }

    /// Verifies `id = CID(rawPayload)` and `signature` over `rawPayload`
    /// under `identity` (§3.1 invariants). A failure here is corruption,
    /// never a transient condition.
    pub fn verify(&self) -> Result<()> {
        let raw_payload = self.raw_payload()?;
        let expected_id = Cid::of_bytes(&raw_payload);
        if expected_id != self.id {
            return Err(CoreError::corruption(format!(
                "change {} has mismatched CID (expected {expected_id})",
                self.id
            )));
        }
        self.identity.verify(&raw_payload, &self.signature)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serialization::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serialization::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signing_key() -> Ed25519SigningKey {
        Ed25519SigningKey::from_bytes([3u8; 32])
    }

    #[test]
    fn sealed_change_verifies() {
        let key = signing_key();
        let change = Change::seal(
            BTreeSet::new(),
            Cid::of_bytes(b"acl-head"),
            None,
            false,
            0,
            1,
            None,
            "root".into(),
            b"header".to_vec(),
            &key,
        )
        .unwrap();
        assert!(change.verify().is_ok());
    }

    #[test]
    fn tampered_data_fails_verification() {
        let key = signing_key();
        let mut change = Change::seal(
            BTreeSet::new(),
            Cid::of_bytes(b"acl-head"),
            None,
            false,
            0,
            1,
            None,
            "ops".into(),
            b"payload".to_vec(),
            &key,
        )
        .unwrap();
        change.data = b"tampered".to_vec();
        assert!(change.verify().is_err());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let key = signing_key();
        let change = Change::seal(
            BTreeSet::new(),
            Cid::of_bytes(b"acl-head"),
            None,
            false,
            0,
            1,
            None,
            "ops".into(),
            b"payload".to_vec(),
            &key,
        )
        .unwrap();
        let encoded = change.encode().unwrap();
        let decoded = Change::decode(&encoded).unwrap();
        assert_eq!(change.id, decoded.id);
        assert!(decoded.verify().is_ok());
    }
}
