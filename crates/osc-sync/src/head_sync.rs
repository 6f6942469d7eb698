//! Periodic background reconciliation (§4.8). `HeadUpdate` broadcasts cover
//! the common case; this loop exists to catch the missed-broadcast case
//! (peer was offline, message dropped) by comparing a cheap digest of local
//! state against each peer's on a fixed period.
//!
//! A cycle always reconciles ACL state before tree heads: a stale read key
//! or ACL tail makes every subsequent tree diff meaningless, so the ACL
//! check gates the rest of the cycle rather than running concurrently with it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use osc_core::crypto::Cid;
use osc_core::ids::{PeerId, SpaceId, TreeId};

use crate::error::Result;
use crate::transport::PeerTransport;
use crate::wire::{HeadSyncRequest, SyncWireMessage, SyncWirePayload};

/// Hashes a space's `(treeId, sortedHeads)` pairs into the digest carried on
/// a `HeadSyncRequest`. Callers sort `trees` by `TreeId` first so replicas
/// with identical state always produce the same digest regardless of
/// iteration order over their tree map.
pub fn digest_heads(trees: &[(TreeId, Vec<Cid>)]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for (tree_id, heads) in trees {
        hasher.update(tree_id.0.to_hex().as_bytes());
        for head in heads {
            hasher.update(head.to_hex().as_bytes());
        }
        hasher.update(b"|");
    }
    *hasher.finalize().as_bytes()
}

/// One space's reconciliation surface, implemented by the space layer.
/// `osc-sync` only ever sees the digest, never the ACL chain or tree
/// contents directly.
#[async_trait]
pub trait SpaceReconciler: Send + Sync {
    fn space_id(&self) -> SpaceId;

    /// Reconciles the ACL chain first; must complete (and, if it advanced
    /// the chain, cause `local_digest` to reflect the new read keys) before
    /// tree digests are compared.
    async fn reconcile_acl(&self, peer: &PeerId) -> Result<()>;

    /// Digest over every owned tree's `(treeId, heads)` pairs, sorted by
    /// tree id so two replicas with identical state always agree.
    fn local_digest(&self) -> [u8; 32];

    /// Called once per space at the end of every `run_once` pass, regardless
    /// of whether any peer diverged, so `UnifiedTreeManager::wait_for_sync`
    /// can observe that a reconciliation cycle has completed for this space.
    fn on_cycle_complete(&self);
}

/// Drives one reconciliation pass across every connected peer for one space.
pub struct HeadSyncCycle {
    reconciler: Arc<dyn SpaceReconciler>,
    transport: Arc<dyn PeerTransport>,
}

impl HeadSyncCycle {
    pub fn new(reconciler: Arc<dyn SpaceReconciler>, transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            reconciler,
            transport,
        }
    }

    /// Runs one pass: ACL reconciliation then a digest probe, per peer.
    /// Tree-level diffing happens on the receiving end once a
    /// `HeadSyncResponse` comes back through the inbound dispatch path.
    pub async fn run_once(&self) -> Result<()> {
        let peers = self.transport.connected_peers().await;
        for peer in &peers {
            self.reconciler.reconcile_acl(peer).await?;
        }

        let digest = self.reconciler.local_digest();
        let message = SyncWireMessage::new(SyncWirePayload::HeadSyncRequest(HeadSyncRequest {
            space_id: self.reconciler.space_id(),
            ldiff_hash: digest,
        }));
        for peer in &peers {
            self.transport.send(peer, message.clone()).await?;
        }
        self.reconciler.on_cycle_complete();
        Ok(())
    }

    /// Spawns a background task that calls `run_once` on a fixed period
    /// (`CoreConfig::sync_period`), logging and continuing past individual
    /// cycle failures rather than aborting the loop.
    pub fn spawn(self: Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(err) = self.run_once().await {
                    tracing::warn!(error = %err, "head sync cycle failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osc_core::crypto::Hash32;

    fn cid(byte: u8) -> Cid {
        Cid(Hash32([byte; 32]))
    }

    #[test]
    fn digest_is_order_independent_within_a_tree_but_sensitive_to_heads() {
        let tree = TreeId(cid(1));
        let a = digest_heads(&[(tree, vec![cid(2), cid(3)])]);
        let b = digest_heads(&[(tree, vec![cid(2), cid(3)])]);
        let c = digest_heads(&[(tree, vec![cid(2)])]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
