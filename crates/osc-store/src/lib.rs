//! # Object Sync Core - Change Store
//!
//! Durable, crash-safe persistence of raw changes per tree, with a secondary
//! head index per tree and a quarantine table for changes that fail
//! signature or CID verification on replay (§4.1).

#![forbid(unsafe_code)]

mod store;

pub use store::{ChangeStore, StoredChange};
