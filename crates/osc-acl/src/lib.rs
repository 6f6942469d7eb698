//! # Object Sync Core - ACL Tree
//!
//! The linear (non-DAG) signed chain governing a space's membership, invite
//! issuance, join-without-approval, permission resolution, and read-key
//! rotation/chaining (§3.3, §4.4).

#![forbid(unsafe_code)]

mod chain;
mod record;

pub use chain::{AclState, AclTree};
pub use record::{AccountStatus, AclRecord, AclRecordBody, Permission};
