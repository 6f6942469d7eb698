//! Typed identifiers used throughout the workspace.
//!
//! Every id is a thin wrapper so a `SpaceId` can never be passed where a
//! `TreeId` is expected, matching the teacher's identifier convention.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::cid::Cid;

/// Content-addressed tree identifier: the `Cid` of the tree's root change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TreeId(pub Cid);

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tree:{}", self.0)
    }
}

impl From<Cid> for TreeId {
    fn from(cid: Cid) -> Self {
        Self(cid)
    }
}

/// Identifies one encryption/membership domain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpaceId(pub String);

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "space:{}", self.0)
    }
}

impl SpaceId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

/// Application-level identifier for an object (channel, message, notice, ...),
/// distinct from the `TreeId` that stores it so the Unified Tree Manager can
/// index both directions independently.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub String);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object:{}", self.0)
    }
}

impl ObjectId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

/// Opaque account identifier (KERI AID in the originating system; the core
/// treats it as an opaque string).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account:{}", self.0)
    }
}

impl AccountId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

/// Identifies a read-key version within a space's key chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReadKeyId(pub u32);

impl fmt::Display for ReadKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "readkey#{}", self.0)
    }
}

/// Peer identifier at the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_are_prefixed() {
        assert_eq!(SpaceId::new("abc").to_string(), "space:abc");
        assert_eq!(ObjectId::new("xyz").to_string(), "object:xyz");
        assert_eq!(ReadKeyId(3).to_string(), "readkey#3");
    }
}
