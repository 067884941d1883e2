use std::sync::Arc;

use ledger_core::ReplaceOutcome;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::{BlockEvent, Peer};
use crate::node::Node;

/// Everything the replication consumer reacts to.
#[derive(Clone, Debug)]
pub enum ReplicationEvent {
    /// A block announced by some cluster member.
    NewBlock(BlockEvent),
    /// Pull a chain from `peer_id`, or from the first known peer.
    SyncRequest { peer_id: Option<String> },
}

/// What handling a single event did to the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    /// Our own announcement came back.
    Echo,
    Stale { index: u64, height: u64 },
    Appended { index: u64 },
    Rejected { index: u64, reason: String },
    Synced(ReplaceOutcome),
    SyncFailed { peer: String, reason: String },
    NoPeers,
}

/// The single replication consumer. Runs until cancelled or until every
/// sender is gone; a failing event never ends the loop.
pub async fn run(
    node: Arc<Node>,
    mut events: mpsc::Receiver<ReplicationEvent>,
    token: CancellationToken,
) {
    info!(node_id = %node.id(), "replication consumer started");
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let outcome = node.handle_event(event).await;
        debug!(?outcome, "replication event handled");
    }
    info!("replication consumer stopped");
}

impl Node {
    pub async fn handle_event(&self, event: ReplicationEvent) -> EventOutcome {
        match event {
            ReplicationEvent::NewBlock(event) => self.handle_block_event(event).await,
            ReplicationEvent::SyncRequest { peer_id } => self.handle_sync_request(peer_id).await,
        }
    }

    /// Next block: append. Ahead of us: pull the sender's chain. Otherwise
    /// ignore. Only the index is compared.
    pub async fn handle_block_event(&self, event: BlockEvent) -> EventOutcome {
        if event.node_id == self.id() {
            return EventOutcome::Echo;
        }
        let index = event.block.index;
        let height = self.ledger().height();

        if index <= height {
            debug!(index, height, origin = %event.node_id, "stale block ignored");
            return EventOutcome::Stale { index, height };
        }

        if index == height + 1 {
            return match self.ledger().append(event.block) {
                Ok(()) => {
                    self.persist().await;
                    EventOutcome::Appended { index }
                }
                Err(e) => {
                    warn!(index, origin = %event.node_id, error = %e, "announced block rejected");
                    EventOutcome::Rejected {
                        index,
                        reason: e.to_string(),
                    }
                }
            };
        }

        info!(index, height, origin = %event.node_id, "gap detected, syncing from origin");
        match self.cluster().peer(&event.node_id) {
            Some(peer) => self.sync_with(&peer).await,
            None => {
                warn!(origin = %event.node_id, "gap announced by unknown peer");
                EventOutcome::SyncFailed {
                    peer: event.node_id,
                    reason: "unknown peer".to_string(),
                }
            }
        }
    }

    async fn handle_sync_request(&self, peer_id: Option<String>) -> EventOutcome {
        let peer = match peer_id {
            Some(id) => match self.cluster().peer(&id) {
                Some(peer) => peer,
                None => {
                    return EventOutcome::SyncFailed {
                        peer: id,
                        reason: "unknown peer".to_string(),
                    }
                }
            },
            None => match self.first_peer() {
                Some(peer) => peer,
                None => return EventOutcome::NoPeers,
            },
        };
        self.sync_with(&peer).await
    }

    async fn sync_with(&self, peer: &Peer) -> EventOutcome {
        match self.sync_from(peer).await {
            Ok(outcome) => EventOutcome::Synced(outcome),
            Err(e) => {
                warn!(peer_id = %peer.id, error = %e, "sync failed");
                EventOutcome::SyncFailed {
                    peer: peer.id.clone(),
                    reason: e.to_string(),
                }
            }
        }
    }
}
