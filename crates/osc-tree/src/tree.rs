//! In-memory DAG of changes belonging to one object: attach/iterate/replay
//! (§3.2, §4.2).

use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet};

use osc_core::crypto::{Cid, Ed25519SigningKey, ReadKey};
use osc_core::error::{CoreError, Result};
use osc_core::ids::{AccountId, ReadKeyId, TreeId};

use crate::change::{Change, ChangePayload, TreeRootHeader};

/// Resolves read keys by id; implemented by the space/ACL layer and
/// injected so the tree substrate never imports ACL code (§9 design notes:
/// break cyclic references via constructor injection).
pub trait ReadKeySource: Send + Sync {
    fn read_key(&self, read_key_id: ReadKeyId) -> Option<ReadKey>;
    fn current_read_key(&self) -> (ReadKeyId, ReadKey);
}

/// Resolves write permission for an account at a given ACL head; implemented
/// by `osc-acl`.
pub trait WriterAuthorization: Send + Sync {
    fn can_write(&self, account: &AccountId, acl_head_id: &Cid) -> bool;
    fn current_acl_head(&self) -> Cid;
}

/// Outcome of `addContent` / `addRawChangesFromPeer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddMode {
    /// Heads advanced without a topology-shortening snapshot.
    Append,
    /// A new snapshot path shortened replay distance for some reader.
    Rebuild,
}

#[derive(Debug, Clone)]
pub struct AddResult {
    pub old_heads: BTreeSet<Cid>,
    pub new_heads: BTreeSet<Cid>,
    pub added: Vec<Cid>,
    pub mode: AddMode,
}

/// A replicated DAG of `Change`s belonging to one object (§3.2).
pub struct ObjectTree {
    tree_id: TreeId,
    root: Change,
    header: TreeRootHeader,
    attached: HashMap<Cid, Change>,
    un_attached: HashMap<Cid, Change>,
    /// missing parent id -> children waiting on it.
    reverse_deps: HashMap<Cid, Vec<Cid>>,
    heads: BTreeSet<Cid>,
    snapshot_path: Vec<Cid>,
    snapshot_generation: u32,
    changes_since_snapshot: u32,
    snapshot_interval: u32,
}

impl ObjectTree {
    /// Constructs a tree from an already-sealed, already-verified root change.
    pub fn new(root: Change, header: TreeRootHeader, snapshot_interval: u32) -> Result<Self> {
        root.verify()?;
        if !root.previous_ids.is_empty() {
            return Err(CoreError::validation("root change must have no parents"));
        }
        let tree_id = TreeId(root.id);
        let mut attached = HashMap::new();
        let mut heads = BTreeSet::new();
        heads.insert(root.id);
        attached.insert(root.id, root.clone());

        Ok(Self {
            tree_id,
            root,
            header,
            attached,
            un_attached: HashMap::new(),
            reverse_deps: HashMap::new(),
            heads,
            snapshot_path: Vec::new(),
            snapshot_generation: 0,
            changes_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        })
    }

    pub fn id(&self) -> TreeId {
        self.tree_id
    }

    pub fn header(&self) -> &TreeRootHeader {
        &self.header
    }

    pub fn heads(&self) -> Vec<Cid> {
        self.heads.iter().copied().collect()
    }

    pub fn snapshot_path(&self) -> &[Cid] {
        &self.snapshot_path
    }

    pub fn has_change(&self, id: &Cid) -> bool {
        self.attached.contains_key(id)
    }

    pub fn get_change(&self, id: &Cid) -> Option<&Change> {
        self.attached.get(id)
    }

    /// Whether the next appended change should be marked as a snapshot
    /// (§4.2 snapshot promotion: every `N` attached changes).
    pub fn should_snapshot_next(&self) -> bool {
        self.changes_since_snapshot + 1 >= self.snapshot_interval
    }

    /// Builds, signs, and attaches a locally-authored change.
    #[allow(clippy::too_many_arguments)]
    pub fn add_content(
        &mut self,
        author: &AccountId,
        data_type: String,
        plaintext: Vec<u8>,
        is_snapshot: bool,
        timestamp: i64,
        signing_key: &Ed25519SigningKey,
        auth: &dyn WriterAuthorization,
        keys: &dyn ReadKeySource,
    ) -> Result<AddResult> {
        let acl_head_id = auth.current_acl_head();
        if !auth.can_write(author, &acl_head_id) {
            return Err(CoreError::permission(format!(
                "{author} lacks Writer permission at acl head {acl_head_id}"
            )));
        }

        let (read_key_id, read_key) = keys.current_read_key();
        let old_heads = self.heads.clone();
        let snapshot_counter = self.snapshot_generation;
        let snapshot_base_id = self.snapshot_path.last().copied();

        // The encryption nonce is bound to `(treeId, changeId)`, but
        // `changeId` is only known once the change is sealed. Bind it
        // instead to the pre-image that determines the id deterministically
        // (the parent set plus timestamp), which is unique per change
        // for a well-behaved signer.
        let nonce_context = osc_core::serialization::to_vec(&(&old_heads, timestamp))?;
        let data = osc_core::crypto::encrypt_change_data(
            &read_key,
            self.tree_id.0.to_hex().as_bytes(),
            &nonce_context,
            &plaintext,
        )?;

        let change = Change::seal(
            old_heads.clone(),
            acl_head_id,
            snapshot_base_id,
            is_snapshot,
            snapshot_counter,
            timestamp,
            Some(read_key_id),
            data_type,
            data,
            signing_key,
        )?;

        self.attach(change.clone())?;
        self.note_attached(&change);

        Ok(AddResult {
            old_heads,
            new_heads: self.heads.clone(),
            added: vec![change.id],
            mode: AddMode::Append,
        })
    }

    /// Attaches changes received from a peer, transitively resolving the
    /// unattached queue as parents arrive (§4.2).
    pub fn add_raw_changes_from_peer(&mut self, changes: Vec<Change>) -> Result<AddResult> {
        let old_heads = self.heads.clone();
        let mut added = Vec::new();
        let mut mode = AddMode::Append;

        let mut queue = changes;
        while let Some(change) = queue.pop() {
            if self.attached.contains_key(&change.id) || self.un_attached.contains_key(&change.id) {
                continue; // duplicate, no-op
            }
            change.verify()?;

            let missing: Vec<Cid> = change
                .previous_ids
                .iter()
                .filter(|p| !self.attached.contains_key(*p))
                .copied()
                .collect();

            let parents_present = missing.is_empty();
            if parents_present {
                let id = change.id;
                if change.is_snapshot {
                    mode = AddMode::Rebuild;
                }
                self.attach(change.clone())?;
                self.note_attached(&change);
                added.push(id);

                if let Some(waiting) = self.reverse_deps.remove(&id) {
                    for waiting_id in waiting {
                        if let Some(waiting_change) = self.un_attached.remove(&waiting_id) {
                            queue.push(waiting_change);
                        }
                    }
                }
            } else {
                for parent in &missing {
                    self.reverse_deps.entry(*parent).or_default().push(change.id);
                }
                self.un_attached.insert(change.id, change);
            }
        }

        Ok(AddResult {
            old_heads,
            new_heads: self.heads.clone(),
            added,
            mode,
        })
    }

    fn attach(&mut self, change: Change) -> Result<()> {
        for parent in &change.previous_ids {
            self.heads.remove(parent);
        }
        self.heads.insert(change.id);
        self.attached.insert(change.id, change);
        Ok(())
    }

    fn note_attached(&mut self, change: &Change) {
        if change.is_snapshot {
            self.snapshot_path.push(change.id);
            self.snapshot_generation += 1;
            self.changes_since_snapshot = 0;
        } else {
            self.changes_since_snapshot += 1;
        }
    }

    /// Walks from root to heads in the total order (§4.2: `(snapshotCounter
    /// ascending, id lexicographic ascending)` tie-break), decrypting each
    /// change and invoking `visitor`. Stops early if `visitor` returns false.
    pub fn iterate_root(
        &self,
        keys: &dyn ReadKeySource,
        mut visitor: impl FnMut(&Change, ChangePayload) -> bool,
    ) -> Result<()> {
        let order = self.topological_order();
        for id in order {
            let change = &self.attached[&id];
            let payload = self.decode_payload(change, keys)?;
            if !visitor(change, payload) {
                break;
            }
        }
        Ok(())
    }

    fn decode_payload(&self, change: &Change, keys: &dyn ReadKeySource) -> Result<ChangePayload> {
        if change.id == self.root.id {
            let header: TreeRootHeader = osc_core::serialization::from_slice(&change.data)?;
            return Ok(ChangePayload::Root(header));
        }
        let read_key_id = change
            .read_key_id
            .ok_or_else(|| CoreError::corruption("non-root change missing readKeyId"))?;
        let key = keys.read_key(read_key_id).ok_or_else(|| {
            CoreError::not_found(format!("unknown read key {read_key_id}, triggering acl sync"))
        })?;
        let nonce_context = osc_core::serialization::to_vec(&(&change.previous_ids, change.timestamp))?;
        let plaintext = osc_core::crypto::decrypt_change_data(
            &key,
            self.tree_id.0.to_hex().as_bytes(),
            &nonce_context,
            &change.data,
        )?;
        if change.is_snapshot {
            let state: crate::change::SnapshotState = osc_core::serialization::from_slice(&plaintext)?;
            Ok(ChangePayload::Snapshot(state))
        } else {
            let ops: crate::change::ChangeOp = osc_core::serialization::from_slice(&plaintext)?;
            Ok(ChangePayload::Ops(ops))
        }
    }

    /// Full topological order via Kahn's algorithm with the spec's
    /// deterministic tie-break among ready nodes.
    fn topological_order(&self) -> Vec<Cid> {
        #[derive(PartialEq, Eq)]
        struct Ready(u32, Cid);
        impl Ord for Ready {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                // BinaryHeap is a max-heap; reverse so the smallest
                // (snapshotCounter, id) pair pops first.
                other.0.cmp(&self.0).then_with(|| other.1.cmp(&self.1))
            }
        }
        impl PartialOrd for Ready {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut in_degree: HashMap<Cid, usize> = HashMap::new();
        let mut children: HashMap<Cid, Vec<Cid>> = HashMap::new();
        for change in self.attached.values() {
            in_degree.entry(change.id).or_insert(0);
            for parent in &change.previous_ids {
                *in_degree.entry(change.id).or_insert(0) += 1;
                children.entry(*parent).or_default().push(change.id);
            }
        }

        let mut ready = BinaryHeap::new();
        for (id, degree) in &in_degree {
            if *degree == 0 {
                ready.push(Ready(self.attached[id].snapshot_counter, *id));
            }
        }

        let mut visited: HashSet<Cid> = HashSet::new();
        let mut order = Vec::with_capacity(self.attached.len());
        while let Some(Ready(_, id)) = ready.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            if let Some(kids) = children.get(&id) {
                for kid in kids {
                    let degree = in_degree.get_mut(kid).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Ready(self.attached[kid].snapshot_counter, *kid));
                    }
                }
            }
        }
        order
    }
}

/// State materialised from an ordered sequence of `ChangeOp`/snapshot
/// payloads, shared by every Object Manager (§3.6 replay rule).
pub fn replay(payloads: impl IntoIterator<Item = ChangePayload>) -> BTreeMap<String, serde_json::Value> {
    let mut state = BTreeMap::new();
    for payload in payloads {
        match payload {
            ChangePayload::Root(_) => {}
            ChangePayload::Snapshot(snapshot) => state = snapshot,
            ChangePayload::Ops(change_op) => {
                for field_op in change_op.ops {
                    match field_op.op {
                        crate::change::FieldOpKind::Set(value) => {
                            state.insert(field_op.field, value);
                        }
                        crate::change::FieldOpKind::Unset => {
                            state.remove(&field_op.field);
                        }
                    }
                }
            }
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use osc_core::crypto::Ed25519SigningKey;
    use serde_json::json;
    use std::collections::HashMap as StdHashMap;

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
            if read_key_id == self.id {
                Some(self.key)
            } else {
                None
            }
        }
        fn current_read_key(&self) -> (ReadKeyId, ReadKey) {
            (self.id, self.key)
        }
    }

    fn new_tree() -> (ObjectTree, Ed25519SigningKey, Cid) {
        let signing_key = Ed25519SigningKey::from_bytes([1u8; 32]);
        let acl_head = Cid::of_bytes(b"acl-genesis");
        let header = TreeRootHeader {
            object_id: "chan-1".into(),
            object_type: "ChatChannel".into(),
        };
        let header_bytes = osc_core::serialization::to_vec(&header).unwrap();
        let root = Change::seal(
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

    #[test]
    fn add_content_advances_heads_and_replays() {
        let (mut tree, signing_key, acl_head) = new_tree();
        let auth = AllowAll { acl_head };
        let keys = SingleKey {
            id: ReadKeyId(0),
            key: ReadKey([5u8; 32]),
        };
        let account = AccountId::new("alice");

        let ops = ChangeOp::set("name", json!("general"));
        let plaintext = osc_core::serialization::to_vec(&ops).unwrap();
        let result = tree
            .add_content(&account, "ops".into(), plaintext, false, 1, &signing_key, &auth, &keys)
            .unwrap();
        assert_eq!(result.added.len(), 1);
        assert_eq!(tree.heads().len(), 1);

        let mut payloads = Vec::new();
        tree.iterate_root(&keys, |_change, payload| {
            payloads.push(payload);
            true
        })
        .unwrap();
        let state = replay(payloads);
        assert_eq!(state.get("name"), Some(&json!("general")));
    }

    #[test]
    fn duplicate_peer_change_is_noop() {
        let (mut tree, signing_key, acl_head) = new_tree();
        let auth = AllowAll { acl_head };
        let keys = SingleKey {
            id: ReadKeyId(0),
            key: ReadKey([5u8; 32]),
        };
        let account = AccountId::new("alice");
        let ops = ChangeOp::set("name", json!("general"));
        let plaintext = osc_core::serialization::to_vec(&ops).unwrap();
        tree.add_content(&account, "ops".into(), plaintext, false, 1, &signing_key, &auth, &keys)
            .unwrap();

        let heads_before = tree.heads();
        let change = tree.get_change(&heads_before[0]).unwrap().clone();
        let result = tree.add_raw_changes_from_peer(vec![change]).unwrap();
        assert!(result.added.is_empty());
    }

    #[test]
    fn out_of_order_peer_changes_attach_transitively() {
        let (mut tree, signing_key, acl_head) = new_tree();
        let auth = AllowAll { acl_head };
        let keys = SingleKey {
            id: ReadKeyId(0),
            key: ReadKey([5u8; 32]),
        };
        let account = AccountId::new("alice");

        let mut changes = Vec::new();
        for i in 0..3u8 {
            let ops = ChangeOp::set(format!("field{i}"), json!(i));
            let plaintext = osc_core::serialization::to_vec(&ops).unwrap();
            tree.add_content(&account, "ops".into(), plaintext, false, i as i64 + 1, &signing_key, &auth, &keys)
                .unwrap();
            let head = tree.heads()[0];
            changes.push(tree.get_change(&head).unwrap().clone());
        }

        let (mut fresh_tree, _, _) = new_tree();
        // feed in reverse order: only the last one is immediately missing a parent.
        let mut reversed = changes.clone();
        reversed.reverse();
        let result = fresh_tree.add_raw_changes_from_peer(reversed).unwrap();
        assert_eq!(result.added.len(), 3);
        assert_eq!(fresh_tree.heads(), vec![changes.last().unwrap().id]);
        let _ = StdHashMap::<Cid, Change>::new();
    }
}
