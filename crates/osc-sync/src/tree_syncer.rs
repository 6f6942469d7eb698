//! Inbound message processing (§4.9): a small request pool for the
//! expensive, order-independent messages (full-sync request/response, ACL
//! records, space headers) and one dedicated worker per peer for
//! `HeadUpdate`/`HeadSyncResponse`, since head ordering within a peer's
//! stream must be preserved but cross-peer ordering never matters.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use osc_core::crypto::Cid;
use osc_core::ids::{PeerId, TreeId};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};

use crate::error::Result;
use crate::wire::{SyncWireMessage, SyncWirePayload};

const REQUEST_POOL_WORKERS: usize = 10;
const MISSING_POOL_WORKERS: usize = 10;
const QUEUE_DEPTH: usize = 256;
/// Bound on the recently-seen change id window used for broadcast dedup.
const DEDUP_WINDOW: usize = 4096;

/// One tree this replica has no local copy of yet, surfaced by a HeadSync
/// diff against a peer (§4.8 `missingIds`).
pub struct MissingWork {
    pub peer: PeerId,
    pub tree_id: TreeId,
}

/// One tree this replica already has, but whose heads diverge from a peer's
/// (§4.8 `changedIds`).
pub struct ExistingWork {
    pub peer: PeerId,
    pub tree_id: TreeId,
}

/// One inbound message, tagged with the peer it arrived from.
pub struct Inbound {
    pub peer: PeerId,
    pub message: SyncWireMessage,
}

/// Handles one fully-deduplicated inbound message. Implemented by the space
/// layer, which owns the `SyncTree`/ACL state this crate only moves bytes
/// around.
#[async_trait]
pub trait SyncMessageHandler: Send + Sync {
    async fn handle(&self, peer: PeerId, message: SyncWireMessage) -> Result<()>;

    /// Fetches a tree this replica has never stored from `peer` (§4.9
    /// `BuildSyncTreeOrGetRemote`). The fetch itself is a `FullSyncRequest`
    /// sent over the wire; the tree becomes visible once the matching
    /// `FullSyncResponse` arrives back through `handle`.
    async fn build_sync_tree_or_get_remote(&self, peer: PeerId, tree_id: TreeId) -> Result<()>;

    /// Requests whatever `peer` has beyond this replica's current heads for
    /// a tree it already holds (§4.9 `SyncWithPeer`).
    async fn sync_with_peer(&self, peer: PeerId, tree_id: TreeId) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct TreeSyncerCounters {
    pub processed: AtomicU64,
    pub duplicates_skipped: AtomicU64,
    pub errors: AtomicU64,
    /// Trees for which a `BuildSyncTreeOrGetRemote`/`SyncWithPeer` round
    /// completed without error.
    pub trees_changed: AtomicU64,
    /// `DiffRange`s classified from an inbound `HeadSyncResponse`.
    pub heads_received: AtomicU64,
    /// `HeadUpdate`/`FullSyncResponse` batches folded into a cached tree.
    pub heads_applied: AtomicU64,
}

/// A bounded, fixed-capacity "seen" set used to drop re-broadcast
/// `HeadUpdate`s whose changes we already attached, evicting the oldest
/// entry once the window fills.
struct SeenWindow {
    order: VecDeque<Cid>,
    set: HashSet<Cid>,
}

impl SeenWindow {
    fn new() -> Self {
        Self {
            order: VecDeque::with_capacity(DEDUP_WINDOW),
            set: HashSet::with_capacity(DEDUP_WINDOW),
        }
    }

    /// Returns true if `id` was already seen (and thus should be skipped).
    fn check_and_insert(&mut self, id: Cid) -> bool {
        if !self.set.insert(id) {
            return true;
        }
        self.order.push_back(id);
        if self.order.len() > DEDUP_WINDOW {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        false
    }
}

/// Dispatches inbound wire messages to a bounded request-pool and a
/// per-peer head queue, per §4.9.
pub struct TreeSyncer {
    request_tx: mpsc::Sender<Inbound>,
    head_txs: Mutex<HashMap<PeerId, mpsc::Sender<Inbound>>>,
    missing_tx: mpsc::Sender<MissingWork>,
    existing_txs: Mutex<HashMap<PeerId, mpsc::Sender<ExistingWork>>>,
    pending_missing: Arc<Mutex<HashSet<TreeId>>>,
    pending_existing: Arc<Mutex<HashSet<(PeerId, TreeId)>>>,
    handler: Arc<dyn SyncMessageHandler>,
    seen: Arc<Mutex<SeenWindow>>,
    counters: Arc<TreeSyncerCounters>,
}

impl TreeSyncer {
    pub fn new(handler: Arc<dyn SyncMessageHandler>) -> Arc<Self> {
        let (request_tx, request_rx) = mpsc::channel(QUEUE_DEPTH);
        let (missing_tx, missing_rx) = mpsc::channel(QUEUE_DEPTH);
        let counters = Arc::new(TreeSyncerCounters::default());
        let syncer = Arc::new(Self {
            request_tx,
            head_txs: Mutex::new(HashMap::new()),
            missing_tx,
            existing_txs: Mutex::new(HashMap::new()),
            pending_missing: Arc::new(Mutex::new(HashSet::new())),
            pending_existing: Arc::new(Mutex::new(HashSet::new())),
            handler,
            seen: Arc::new(Mutex::new(SeenWindow::new())),
            counters,
        });
        syncer.clone().spawn_request_pool(request_rx);
        syncer.clone().spawn_missing_pool(missing_rx);
        syncer
    }

    pub fn counters(&self) -> Arc<TreeSyncerCounters> {
        self.counters.clone()
    }

    /// A single task owns the receiver (channel receivers aren't shareable)
    /// and hands each message to one of `REQUEST_POOL_WORKERS` concurrent
    /// permits, so up to ten full-sync/ACL/header messages process at once
    /// without the dispatcher itself blocking on any one of them.
    fn spawn_request_pool(self: Arc<Self>, mut request_rx: mpsc::Receiver<Inbound>) {
        let permits = Arc::new(Semaphore::new(REQUEST_POOL_WORKERS));
        tokio::spawn(async move {
            while let Some(inbound) = request_rx.recv().await {
                let syncer = self.clone();
                let permit = permits.clone().acquire_owned().await.expect("semaphore never closed");
                tokio::spawn(async move {
                    syncer.process(inbound).await;
                    drop(permit);
                });
            }
        });
    }

    /// Mirrors `spawn_request_pool`, but for `MissingWork`: up to
    /// `MISSING_POOL_WORKERS` trees are fetched from their peer and folded
    /// in concurrently (§4.9 request pool).
    fn spawn_missing_pool(self: Arc<Self>, mut missing_rx: mpsc::Receiver<MissingWork>) {
        let permits = Arc::new(Semaphore::new(MISSING_POOL_WORKERS));
        tokio::spawn(async move {
            while let Some(work) = missing_rx.recv().await {
                let syncer = self.clone();
                let permit = permits.clone().acquire_owned().await.expect("semaphore never closed");
                tokio::spawn(async move {
                    syncer.pending_missing.lock().remove(&work.tree_id);
                    let outcome = async {
                        syncer
                            .handler
                            .build_sync_tree_or_get_remote(work.peer.clone(), work.tree_id)
                            .await?;
                        syncer.handler.sync_with_peer(work.peer.clone(), work.tree_id).await
                    }
                    .await;
                    match outcome {
                        Ok(()) => {
                            syncer.counters.trees_changed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            syncer.counters.errors.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(error = %err, tree_id = %work.tree_id, "missing tree sync failed");
                        }
                    }
                    drop(permit);
                });
            }
        });
    }

    /// Lazily spawns the one-worker-per-peer queue for `ExistingWork`,
    /// mirroring `head_queue_for` so head ordering per peer is preserved.
    fn existing_queue_for(&self, peer: &PeerId) -> mpsc::Sender<ExistingWork> {
        let mut txs = self.existing_txs.lock();
        if let Some(tx) = txs.get(peer) {
            return tx.clone();
        }
        let (tx, mut rx) = mpsc::channel::<ExistingWork>(QUEUE_DEPTH);
        let handler = self.handler.clone();
        let counters = self.counters.clone();
        let pending = self.pending_existing.clone();
        tokio::spawn(async move {
            while let Some(work) = rx.recv().await {
                pending.lock().remove(&(work.peer.clone(), work.tree_id));
                if let Err(err) = handler.sync_with_peer(work.peer.clone(), work.tree_id).await {
                    counters.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %err, tree_id = %work.tree_id, "existing tree sync failed");
                } else {
                    counters.trees_changed.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
        txs.insert(peer.clone(), tx.clone());
        tx
    }

    /// Non-blocking enqueue of a HeadSync diff's classification onto the
    /// missing-tree and per-peer existing-tree pools (§4.9 `SyncAll`). A
    /// `tree_id` already queued for the same pool is dropped silently.
    pub fn sync_all(&self, peer: PeerId, existing: Vec<TreeId>, missing: Vec<TreeId>) {
        for tree_id in existing {
            let key = (peer.clone(), tree_id);
            if !self.pending_existing.lock().insert(key.clone()) {
                continue;
            }
            let tx = self.existing_queue_for(&peer);
            if tx.try_send(ExistingWork { peer: peer.clone(), tree_id }).is_err() {
                self.pending_existing.lock().remove(&key);
                tracing::warn!(tree_id = %tree_id, "existing-tree queue full or closed, dropping enqueue");
            }
        }
        for tree_id in missing {
            if !self.pending_missing.lock().insert(tree_id) {
                continue;
            }
            if self.missing_tx.try_send(MissingWork { peer: peer.clone(), tree_id }).is_err() {
                self.pending_missing.lock().remove(&tree_id);
                tracing::warn!(tree_id = %tree_id, "missing-tree queue full or closed, dropping enqueue");
            }
        }
    }

    fn head_queue_for(&self, peer: &PeerId) -> mpsc::Sender<Inbound> {
        let mut txs = self.head_txs.lock();
        if let Some(tx) = txs.get(peer) {
            return tx.clone();
        }
        let (tx, mut rx) = mpsc::channel::<Inbound>(QUEUE_DEPTH);
        let syncer_handler = self.handler.clone();
        let counters = self.counters.clone();
        tokio::spawn(async move {
            while let Some(inbound) = rx.recv().await {
                if let Err(err) = syncer_handler.handle(inbound.peer, inbound.message).await {
                    counters.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %err, "head update processing failed");
                } else {
                    counters.processed.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
        txs.insert(peer.clone(), tx.clone());
        tx
    }

    /// Routes one inbound message to the appropriate queue. Returns once the
    /// message is enqueued, not once it's processed.
    pub async fn dispatch(&self, peer: PeerId, message: SyncWireMessage) {
        if let SyncWirePayload::HeadUpdate(update) = &message.payload {
            let mut seen = self.seen.lock();
            let all_seen = update.changes.iter().all(|c| seen.check_and_insert(c.id));
            if all_seen && !update.changes.is_empty() {
                self.counters.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        let queue = match &message.payload {
            SyncWirePayload::HeadUpdate(_) | SyncWirePayload::HeadSyncResponse(_) => {
                self.head_queue_for(&peer)
            }
            _ => self.request_tx.clone(),
        };
        if queue.send(Inbound { peer, message }).await.is_err() {
            tracing::warn!("tree syncer queue closed, dropping inbound message");
        }
    }

    async fn process(&self, inbound: Inbound) {
        if let Err(err) = self.handler.handle(inbound.peer, inbound.message).await {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %err, "request pool message processing failed");
        } else {
            self.counters.processed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
