//! Shared materialisation helper: every Object Manager replays a tree's
//! payloads the same way (§3.6), so it lives here instead of being
//! duplicated per object kind.

use osc_core::error::Result;
use osc_tree::{replay, ObjectTree, ReadKeySource, SnapshotState};

pub fn materialize(tree: &ObjectTree, keys: &dyn ReadKeySource) -> Result<SnapshotState> {
    let mut payloads = Vec::new();
    tree.iterate_root(keys, |_change, payload| {
        payloads.push(payload);
        true
    })?;
    Ok(replay(payloads))
}
