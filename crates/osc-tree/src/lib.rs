//! # Object Sync Core - Object Tree
//!
//! The signed, append-only, content-addressed DAG of `Change`s that
//! underlies every first-class entity in a space (§3.1, §3.2, §4.2).
//!
//! `ObjectTree` is pure in-memory state; persistence (`osc-store`) and
//! network broadcast (`osc-sync`) are layered on top rather than imported
//! here, so this crate has no I/O of its own.

#![forbid(unsafe_code)]

mod change;
mod tree;

pub use change::{ChangeOp, ChangePayload, FieldOp, FieldOpKind, SnapshotState, TreeRootHeader};
pub use change::Change;
pub use tree::{replay, AddMode, AddResult, ObjectTree, ReadKeySource, WriterAuthorization};
