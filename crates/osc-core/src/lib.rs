//! # Object Sync Core - Foundation
//!
//! **Purpose**: single source of truth for identifiers, cryptography,
//! canonical encoding, configuration, and the error taxonomy shared by every
//! other crate in this workspace.
//!
//! # Architecture constraints
//!
//! This crate has **zero dependencies on other workspace crates**.
//! - YES identifiers (`TreeId`, `SpaceId`, `ObjectId`, `AccountId`, `ReadKeyId`, `PeerId`)
//! - YES cryptography (Ed25519 signing, content addressing, symmetric
//!   encryption, BIP39/HKDF key derivation)
//! - YES canonical encoding (DAG-CBOR)
//! - YES the `CoreError` taxonomy and backoff policy
//! - YES configuration loading
//! - NO tree/ACL/sync semantics (those live in `osc-tree`, `osc-acl`, `osc-sync`)
//! - NO storage backend (that's `osc-store`)

#![forbid(unsafe_code)]

pub mod backoff;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ids;
pub mod serialization;

pub use backoff::Backoff;
pub use config::CoreConfig;
pub use error::{CoreError, Result};
pub use ids::{AccountId, ObjectId, PeerId, ReadKeyId, SpaceId, TreeId};
