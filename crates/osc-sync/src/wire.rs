//! Peer/coordinator wire protocol (§6.1), grounded on the teacher's
//! `aura-anti-entropy::wire::SyncWireMessage` framing: a schema version tag
//! plus a DAG-CBOR payload, rather than a hand-rolled protobuf schema (see
//! `DESIGN.md` for the substitution note).

use osc_core::crypto::Cid;
use osc_core::error::{CoreError, Result};
use osc_core::ids::{SpaceId, TreeId};
use osc_tree::Change;
use serde::{Deserialize, Serialize};

/// Bump when the wire payload shape changes incompatibly.
pub const SYNC_WIRE_SCHEMA_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootHeaderWire {
    pub object_id: String,
    pub object_type: String,
}

/// Unsolicited broadcast emitted by `SyncTree` on every committed change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadUpdate {
    pub space_id: SpaceId,
    pub tree_id: TreeId,
    pub heads: Vec<Cid>,
    pub changes: Vec<Change>,
    pub snapshot_path: Vec<Cid>,
    pub root_header: Option<RootHeaderWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadSyncRequest {
    pub space_id: SpaceId,
    pub ldiff_hash: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffRange {
    pub tree_id: TreeId,
    pub remote_heads_hash: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadSyncResponse {
    pub space_id: SpaceId,
    pub diff_ranges: Vec<DiffRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullSyncRequest {
    pub tree_id: TreeId,
    pub heads: Vec<Cid>,
    pub snapshot_path: Vec<Cid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullSyncResponse {
    pub tree_id: TreeId,
    pub batch_seq: u32,
    pub changes: Vec<Change>,
    pub is_final: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclRecordWire {
    pub space_id: SpaceId,
    pub record: osc_acl_record::AclRecordEnvelope,
}

/// Sent on first contact to bootstrap a space (§6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceHeader {
    pub space_id: SpaceId,
    pub space_type: String,
    pub acl_root: Cid,
    pub settings: std::collections::BTreeMap<String, String>,
}

/// Every wire message kind, tagged so a receiver can dispatch without
/// peeking into the payload first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncWirePayload {
    HeadUpdate(HeadUpdate),
    HeadSyncRequest(HeadSyncRequest),
    HeadSyncResponse(HeadSyncResponse),
    FullSyncRequest(FullSyncRequest),
    FullSyncResponse(FullSyncResponse),
    AclRecord(AclRecordWire),
    SpaceHeader(SpaceHeader),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncWireMessage {
    pub schema_version: u16,
    pub payload: SyncWirePayload,
}

impl SyncWireMessage {
    pub fn new(payload: SyncWirePayload) -> Self {
        Self {
            schema_version: SYNC_WIRE_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Encodes a message with a 4-byte big-endian length prefix ahead of the
/// DAG-CBOR payload, matching the teacher's envelope shape for a framed
/// stream transport.
pub fn serialize_message(message: &SyncWireMessage) -> Result<Vec<u8>> {
    let body = osc_core::serialization::to_vec(message)?;
    let len = u32::try_from(body.len())
        .map_err(|_| CoreError::validation("sync wire message too large to frame"))?;
    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Decodes one length-prefixed frame, returning the message and the number
/// of bytes consumed from `buf`.
pub fn deserialize_message(buf: &[u8]) -> Result<Option<(SyncWireMessage, usize)>> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if buf.len() < 4 + len {
        return Ok(None);
    }
    let message: SyncWireMessage = osc_core::serialization::from_slice(&buf[4..4 + len])?;
    if message.schema_version > SYNC_WIRE_SCHEMA_VERSION {
        return Err(CoreError::validation(format!(
            "unsupported sync wire schema version {}",
            message.schema_version
        )));
    }
    Ok(Some((message, 4 + len)))
}

/// ACL records travel on the wire as opaque signed envelopes so `osc-sync`
/// does not need a dependency on `osc-acl`'s internal record types; the
/// receiving space deserializes the envelope's inner bytes with `osc-acl`.
pub mod osc_acl_record {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AclRecordEnvelope {
        pub encoded: Vec<u8>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip() {
        let message = SyncWireMessage::new(SyncWirePayload::HeadSyncRequest(HeadSyncRequest {
            space_id: SpaceId::new("s1"),
            ldiff_hash: [1u8; 32],
        }));
        let framed = serialize_message(&message).unwrap();
        let (decoded, consumed) = deserialize_message(&framed).unwrap().unwrap();
        assert_eq!(consumed, framed.len());
        match decoded.payload {
            SyncWirePayload::HeadSyncRequest(req) => assert_eq!(req.ldiff_hash, [1u8; 32]),
            _ => panic!("wrong payload kind"),
        }
    }

    #[test]
    fn incomplete_frame_returns_none() {
        let message = SyncWireMessage::new(SyncWirePayload::HeadSyncRequest(HeadSyncRequest {
            space_id: SpaceId::new("s1"),
            ldiff_hash: [1u8; 32],
        }));
        let framed = serialize_message(&message).unwrap();
        assert!(deserialize_message(&framed[..framed.len() - 1]).unwrap().is_none());
    }
}
