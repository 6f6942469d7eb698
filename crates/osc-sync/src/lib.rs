//! # Object Sync Core - Sync
//!
//! Durable write path, wire framing, and peer reconciliation for a single
//! space's trees (§4.3, §4.8, §4.9, §6.1). `osc-tree` and `osc-store` supply
//! the DAG and the durable table respectively; this crate is where they meet
//! the network.

#![forbid(unsafe_code)]

mod error;
mod head_sync;
mod sync_tree;
mod transport;
mod tree_syncer;
pub mod wire;

pub use error::{Result, SyncError};
pub use head_sync::{digest_heads, HeadSyncCycle, SpaceReconciler};
pub use sync_tree::SyncTree;
pub use transport::PeerTransport;
pub use tree_syncer::{ExistingWork, Inbound, MissingWork, SyncMessageHandler, TreeSyncer, TreeSyncerCounters};
