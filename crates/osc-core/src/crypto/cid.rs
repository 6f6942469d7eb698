//! Content identifier: a typed multihash over a canonical encoding.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::hash::Hash32;
use crate::serialization;

/// Content address of a canonically-encoded payload. `Change.id`,
/// `previousIds`, `aclHeadId`, and `snapshotBaseId` are all `Cid`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cid(pub Hash32);

impl Cid {
    /// Computes the CID of a value by canonically encoding it and hashing
    /// the result (DAG-CBOR + SHA-256, per `Hash32::ALGORITHM`).
    pub fn of<T: Serialize>(value: &T) -> crate::error::Result<Self> {
        let bytes = serialization::to_vec(value)?;
        Ok(Self(Hash32::digest(&bytes)))
    }

    /// Computes the CID of an already-encoded byte string.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(Hash32::digest(bytes))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self(Hash32::from_hex(s)?))
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Payload {
        field: String,
    }

    #[test]
    fn same_value_same_cid() {
        let a = Cid::of(&Payload {
            field: "hello".into(),
        })
        .unwrap();
        let b = Cid::of(&Payload {
            field: "hello".into(),
        })
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_value_different_cid() {
        let a = Cid::of(&Payload { field: "a".into() }).unwrap();
        let b = Cid::of(&Payload { field: "b".into() }).unwrap();
        assert_ne!(a, b);
    }
}
