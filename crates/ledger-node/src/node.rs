use std::sync::Arc;

use ledger_core::{
    mine_next_block, Block, ChainStore, Ledger, MiningStrategy, ReplaceOutcome, Transaction,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cluster::{BlockEvent, Cluster, Peer};
use crate::error::NodeError;
use crate::replication::ReplicationEvent;
use crate::transfer::fetch_chain_from;

/// Writes ledger snapshots through to a [`ChainStore`].
///
/// Remembers the tip it last wrote: if the new snapshot still contains that
/// tip only the blocks above it are written, otherwise the whole chain is
/// rewritten.
struct Persister {
    store: Arc<dyn ChainStore>,
    tip: Mutex<Option<(u64, String)>>,
}

impl Persister {
    fn new(store: Arc<dyn ChainStore>) -> Self {
        Self {
            store,
            tip: Mutex::new(None),
        }
    }

    fn write(&self, ledger: &Ledger) -> anyhow::Result<()> {
        let mut tip = self.tip.lock();
        let chain = ledger.snapshot();
        let extends_from = tip.as_ref().and_then(|(height, hash)| {
            let height = *height as usize;
            chain
                .get(height)
                .filter(|b| &b.hash == hash)
                .map(|_| height + 1)
        });
        match extends_from {
            Some(start) => {
                for block in &chain[start..] {
                    self.store.put_block(block)?;
                }
            }
            None => self.store.save_chain(&chain)?,
        }
        *tip = chain.last().map(|b| (b.index, b.hash.clone()));
        Ok(())
    }

    fn close(&self) -> anyhow::Result<()> {
        self.store.close()
    }
}

/// One ledger replica: the chain, its cluster membership and optional
/// persistence.
pub struct Node {
    ledger: Arc<Ledger>,
    cluster: Arc<dyn Cluster>,
    persister: Option<Arc<Persister>>,
    mining: MiningStrategy,
    events: mpsc::Sender<ReplicationEvent>,
}

impl Node {
    pub fn new(
        ledger: Arc<Ledger>,
        cluster: Arc<dyn Cluster>,
        store: Option<Arc<dyn ChainStore>>,
        mining: MiningStrategy,
        events: mpsc::Sender<ReplicationEvent>,
    ) -> Self {
        Self {
            ledger,
            cluster,
            persister: store.map(|s| Arc::new(Persister::new(s))),
            mining,
            events,
        }
    }

    pub fn id(&self) -> &str {
        self.cluster.local_id()
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn cluster(&self) -> &Arc<dyn Cluster> {
        &self.cluster
    }

    /// Mine a block carrying `data`, append it and announce it to the cluster.
    /// A failed announcement is only logged.
    pub async fn mine(&self, data: Vec<Transaction>) -> Result<Block, NodeError> {
        let ledger = self.ledger.clone();
        let strategy = self.mining;
        let block = tokio::task::spawn_blocking(move || mine_next_block(&ledger, data, strategy))
            .await
            .map_err(|e| NodeError::Mining(e.to_string()))??;
        self.persist().await;

        let event = BlockEvent::new_block(block.clone(), self.id());
        if let Err(e) = self.cluster.broadcast(&event).await {
            warn!(index = block.index, error = %e, "block broadcast failed");
        }
        Ok(block)
    }

    /// Fetch `peer`'s chain and adopt it if it carries more work.
    pub async fn sync_from(&self, peer: &Peer) -> Result<ReplaceOutcome, NodeError> {
        info!(peer_id = %peer.id, addr = %peer.transfer_addr, "syncing chain");
        let chain = fetch_chain_from(peer).await?;
        let ledger = self.ledger.clone();
        let outcome = tokio::task::spawn_blocking(move || ledger.replace(chain))
            .await
            .map_err(|e| NodeError::Task(e.to_string()))??;
        if let ReplaceOutcome::Replaced { .. } = outcome {
            self.persist().await;
        }
        Ok(outcome)
    }

    pub async fn sync_from_id(&self, peer_id: &str) -> Result<ReplaceOutcome, NodeError> {
        let peer = self
            .cluster
            .peer(peer_id)
            .ok_or_else(|| NodeError::UnknownPeer(peer_id.to_string()))?;
        self.sync_from(&peer).await
    }

    /// The first peer other than this node, if any.
    pub fn first_peer(&self) -> Option<Peer> {
        self.cluster.peers().into_iter().find(|p| p.id != self.id())
    }

    /// Catch up with the cluster on join. `None` when there is nobody to ask.
    pub async fn initial_sync(&self) -> Result<Option<ReplaceOutcome>, NodeError> {
        match self.first_peer() {
            Some(peer) => self.sync_from(&peer).await.map(Some),
            None => {
                info!("no peers to sync from, keeping local chain");
                Ok(None)
            }
        }
    }

    /// Queue a sync for the replication consumer.
    pub async fn request_sync(&self, peer_id: Option<String>) -> Result<(), NodeError> {
        self.events
            .send(ReplicationEvent::SyncRequest { peer_id })
            .await
            .map_err(|_| NodeError::QueueClosed)
    }

    /// Write the current chain to the store, if there is one. Failures are
    /// logged; the in-memory ledger stays authoritative.
    pub async fn persist(&self) {
        if let Err(e) = self.try_persist().await {
            warn!(error = %e, "chain not persisted");
        }
    }

    async fn try_persist(&self) -> Result<(), NodeError> {
        let Some(persister) = self.persister.clone() else {
            return Ok(());
        };
        let ledger = self.ledger.clone();
        tokio::task::spawn_blocking(move || persister.write(&ledger))
            .await
            .map_err(|e| NodeError::Task(e.to_string()))?
            .map_err(|e| NodeError::Persist(format!("{e:#}")))?;
        debug!(height = self.ledger.height(), "chain persisted");
        Ok(())
    }

    pub fn close(&self) {
        if let Some(persister) = &self.persister {
            if let Err(e) = persister.close() {
                warn!(error = %e, "closing chain store failed");
            }
        }
    }
}
