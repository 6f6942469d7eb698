//! The daemon's default wiring for the injected `PeerTransport` boundary
//! (§6.1 transport note): this crate is explicitly told not to pull in a
//! networking stack, so the concrete implementation here is a single-node
//! loopback that reports no connected peers. A real deployment swaps this
//! for a `libp2p`/`datachannel` backed implementation of the same trait
//! without touching anything else. The inbound `SyncMessageHandler` is no
//! longer injected here — `Space::init` builds its own (`SpaceSyncHandler`
//! in `osc-space`), since routing inbound messages into the tree cache is
//! business logic, not a networking concern.

use async_trait::async_trait;
use osc_core::ids::PeerId;
use osc_sync::wire::SyncWireMessage;
use osc_sync::PeerTransport;

pub struct LoopbackTransport;

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn send(&self, _peer: &PeerId, _message: SyncWireMessage) -> osc_core::error::Result<()> {
        Ok(())
    }

    async fn broadcast(&self, _peers: &[PeerId], _message: SyncWireMessage) -> osc_core::error::Result<()> {
        Ok(())
    }

    async fn connected_peers(&self) -> Vec<PeerId> {
        Vec::new()
    }
}
