//! Injected peer transport boundary (§9 design notes: the Sync Tree never
//! imports the client; the broadcast function is passed in, and stream
//! handling lives behind this trait so this crate never pulls in a
//! networking stack).

use async_trait::async_trait;
use osc_core::error::Result;
use osc_core::ids::PeerId;

use crate::wire::SyncWireMessage;

/// Abstracts the concrete stream transport (libp2p, datachannel, a test
/// double, ...). `osc-sync` depends only on this trait.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Fire-and-forget send to one peer.
    async fn send(&self, peer: &PeerId, message: SyncWireMessage) -> Result<()>;

    /// Fire-and-forget broadcast to every peer currently connected for a space.
    async fn broadcast(&self, peers: &[PeerId], message: SyncWireMessage) -> Result<()>;

    /// Currently connected peers for a space, used by HeadSync's per-peer loop.
    async fn connected_peers(&self) -> Vec<PeerId>;
}
