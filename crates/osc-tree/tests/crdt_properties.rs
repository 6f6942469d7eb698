//! Property tests for the testable invariants in §8: causal completeness
//! and convergence, grounded on the teacher's
//! `aura-journal/tests/semilattice_property_tests.rs` style of asserting
//! algebraic laws via `proptest` rather than example-based tables.

use std::collections::BTreeSet;

use osc_core::crypto::{Cid, Ed25519SigningKey, ReadKey};
use osc_core::ids::{AccountId, ReadKeyId};
use osc_tree::{replay, AddMode, ChangeOp, ObjectTree, ReadKeySource, TreeRootHeader, WriterAuthorization};
use proptest::prelude::*;
use serde_json::json;

struct AllowAll {
    acl_head: Cid,
}
impl WriterAuthorization for AllowAll {
    fn can_write(&self, _account: &AccountId, _acl_head_id: &Cid) -> bool {
        true
    }
    fn current_acl_head(&self) -> Cid {
        self.acl_head
    }
}

struct SingleKey {
    id: ReadKeyId,
    key: ReadKey,
}
impl ReadKeySource for SingleKey {
    fn read_key(&self, read_key_id: ReadKeyId) -> Option<ReadKey> {
        (read_key_id == self.id).then_some(self.key)
    }
    fn current_read_key(&self) -> (ReadKeyId, ReadKey) {
        (self.id, self.key)
    }
}

fn new_tree() -> (ObjectTree, Ed25519SigningKey, Cid) {
    let signing_key = Ed25519SigningKey::from_bytes([2u8; 32]);
    let acl_head = Cid::of_bytes(b"acl-genesis");
    let header = TreeRootHeader {
        object_id: "obj-1".into(),
        object_type: "ChatMessage".into(),
    };
    let header_bytes = osc_core::serialization::to_vec(&header).unwrap();
    let root = osc_tree::Change::seal(
        BTreeSet::new(),
        acl_head,
        None,
        false,
        0,
        0,
        None,
        "root".into(),
        header_bytes,
        &signing_key,
    )
    .unwrap();
    let tree = ObjectTree::new(root, header, 10).unwrap();
    (tree, signing_key, acl_head)
}

proptest! {
    /// Causal completeness: after appending any sequence of locally-authored
    /// changes, every attached change's `previousIds` are themselves attached.
    #[test]
    fn causal_completeness_holds_after_random_appends(values in prop::collection::vec(0u32..1000, 1..12)) {
        let (mut tree, signing_key, acl_head) = new_tree();
        let auth = AllowAll { acl_head };
        let keys = SingleKey { id: ReadKeyId(0), key: ReadKey([9u8; 32]) };
        let account = AccountId::new("alice");

        for (i, value) in values.iter().enumerate() {
            let ops = ChangeOp::set("counter", json!(value));
            let plaintext = osc_core::serialization::to_vec(&ops).unwrap();
            tree.add_content(&account, "ops".into(), plaintext, false, i as i64 + 1, &signing_key, &auth, &keys).unwrap();
        }

        let mut all_ids = BTreeSet::new();
        let mut parent_sets = Vec::new();
        tree.iterate_root(&keys, |change, _payload| {
            all_ids.insert(change.id);
            parent_sets.push(change.previous_ids.clone());
            true
        }).unwrap();

        for parents in &parent_sets {
            prop_assert!(parents.iter().all(|p| all_ids.contains(p)));
        }
    }

    /// Convergence: replaying the same changes in forward or reverse arrival
    /// order into two independent trees yields byte-equal materialised state.
    #[test]
    fn convergence_independent_of_arrival_order(values in prop::collection::vec(0u32..1000, 1..8)) {
        let (mut source, signing_key, acl_head) = new_tree();
        let auth = AllowAll { acl_head };
        let keys = SingleKey { id: ReadKeyId(0), key: ReadKey([9u8; 32]) };
        let account = AccountId::new("alice");

        let mut changes = Vec::new();
        for (i, value) in values.iter().enumerate() {
            let ops = ChangeOp::set("counter", json!(value));
            let plaintext = osc_core::serialization::to_vec(&ops).unwrap();
            source.add_content(&account, "ops".into(), plaintext, false, i as i64 + 1, &signing_key, &auth, &keys).unwrap();
            let head = source.heads()[0];
            changes.push(source.get_change(&head).unwrap().clone());
        }

        let (mut replica_a, _, _) = new_tree();
        let (mut replica_b, _, _) = new_tree();
        replica_a.add_raw_changes_from_peer(changes.clone()).unwrap();
        let mut reversed = changes;
        reversed.reverse();
        replica_b.add_raw_changes_from_peer(reversed).unwrap();

        let mut payloads_a = Vec::new();
        replica_a.iterate_root(&keys, |_c, p| { payloads_a.push(p); true }).unwrap();
        let mut payloads_b = Vec::new();
        replica_b.iterate_root(&keys, |_c, p| { payloads_b.push(p); true }).unwrap();

        let state_a = replay(payloads_a);
        let state_b = replay(payloads_b);
        prop_assert_eq!(state_a, state_b);
        prop_assert_eq!(replica_a.heads(), replica_b.heads());
    }
}

#[test]
fn snapshot_insertion_marks_rebuild_mode() {
    let (mut source, signing_key, acl_head) = new_tree();
    let auth = AllowAll { acl_head };
    let keys = SingleKey { id: ReadKeyId(0), key: ReadKey([9u8; 32]) };
    let account = AccountId::new("alice");

    let ops = ChangeOp::set("counter", json!(1));
    let plaintext = osc_core::serialization::to_vec(&ops).unwrap();
    source
        .add_content(&account, "ops".into(), plaintext, true, 1, &signing_key, &auth, &keys)
        .unwrap();
    let head = source.heads()[0];
    let snapshot_change = source.get_change(&head).unwrap().clone();

    let (mut replica, _, _) = new_tree();
    let result = replica.add_raw_changes_from_peer(vec![snapshot_change]).unwrap();
    assert_eq!(result.mode, AddMode::Rebuild);
}
