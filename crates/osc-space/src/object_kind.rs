//! Explicit `ObjectKind` registry (§9 design notes: replace
//! method-based polymorphism on object kinds with a table of
//! `{type-name → {validate, initialState}}` so new kinds can be added
//! without touching the tree substrate).

use std::collections::HashMap;
use std::sync::Arc;

use osc_core::error::{CoreError, Result};
use osc_core::ids::AccountId;
use osc_tree::{ChangeOp, SnapshotState};

/// Facts available to a kind's `validate` that the tree substrate itself
/// has no notion of: who's writing, and what they're allowed to do.
pub struct ValidationContext<'a> {
    pub author: &'a AccountId,
    pub is_admin: bool,
    pub timestamp: i64,
}

/// One object type's behaviour: whether a proposed `ChangeOp` is legal given
/// the current materialised state, and the state a brand-new tree of this
/// kind starts from.
pub trait ObjectKind: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn initial_state(&self) -> SnapshotState {
        SnapshotState::new()
    }

    /// Rejects the op with a `CoreError` before it's ever sealed into a
    /// `Change`; called by the owning Object Manager, not by `osc-tree`
    /// itself (which has no notion of per-kind rules).
    fn validate(&self, state: &SnapshotState, op: &ChangeOp, ctx: &ValidationContext<'_>) -> Result<()>;
}

/// A kind with no extra invariants beyond "any writer may set any field",
/// used for the append-only record kinds (`NoticeAck`, `NoticeSave`, ...).
pub struct PermissiveKind(pub &'static str);

impl ObjectKind for PermissiveKind {
    fn type_name(&self) -> &'static str {
        self.0
    }

    fn validate(&self, _state: &SnapshotState, _op: &ChangeOp, _ctx: &ValidationContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// `{type-name → ObjectKind}`, populated once at daemon startup.
#[derive(Default)]
pub struct ObjectKindRegistry {
    kinds: HashMap<&'static str, Arc<dyn ObjectKind>>,
}

impl ObjectKindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: Arc<dyn ObjectKind>) {
        self.kinds.insert(kind.type_name(), kind);
    }

    pub fn get(&self, type_name: &str) -> Result<Arc<dyn ObjectKind>> {
        self.kinds
            .get(type_name)
            .cloned()
            .ok_or_else(|| CoreError::validation(format!("unknown object type {type_name}")))
    }
}
