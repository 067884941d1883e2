use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use ledger_core::{ChainStore, Ledger, ReplaceOutcome};
use ledger_storage::SledStore;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api;
use crate::cluster::Peer;
use crate::config::NodeConfig;
use crate::gossip::UdpGossip;
use crate::node::Node;
use crate::replication;
use crate::transfer::TransferServer;

/// A started node and the background tasks serving it.
pub struct RunningNode {
    pub node: Arc<Node>,
    pub gossip: Arc<UdpGossip>,
    pub http_addr: SocketAddr,
    pub gossip_addr: SocketAddr,
    pub transfer_addr: SocketAddr,
    token: CancellationToken,
    tasks: JoinSet<()>,
}

impl RunningNode {
    /// How other members should address this node.
    pub fn as_peer(&self) -> Peer {
        Peer::new(self.node.id(), self.gossip_addr, self.transfer_addr)
    }

    /// Cancel every task, wait for them, then close the store.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        while let Some(done) = self.tasks.join_next().await {
            if let Err(e) = done {
                warn!(error = %e, "node task panicked");
            }
        }
        self.node.close();
        info!(node_id = %self.node.id(), "node stopped");
    }
}

/// Restore the ledger, bind every listener, catch up with the cluster and
/// start serving. HTTP only comes up once the initial sync has finished.
pub async fn launch(config: NodeConfig, token: CancellationToken) -> Result<RunningNode> {
    let store: Option<Arc<dyn ChainStore>> = match &config.data_dir {
        Some(dir) => Some(Arc::new(SledStore::open(dir)?) as Arc<dyn ChainStore>),
        None => None,
    };
    let ledger = match &store {
        Some(store) => match store.load_chain().context("reading stored chain")? {
            Some(chain) => {
                let ledger = Ledger::from_chain(chain).context("stored chain is invalid")?;
                info!(height = ledger.height(), "restored chain from store");
                ledger
            }
            None => Ledger::new(),
        },
        None => Ledger::new(),
    };
    let ledger = Arc::new(ledger);

    let gossip = Arc::new(
        UdpGossip::bind(&config.node_id, config.gossip_listen, config.peers.clone())
            .await
            .with_context(|| format!("binding gossip on {}", config.gossip_listen))?,
    );
    let transfer_listener = TcpListener::bind(config.transfer_listen)
        .await
        .with_context(|| format!("binding transfer on {}", config.transfer_listen))?;
    let http_listener = TcpListener::bind(config.http_listen)
        .await
        .with_context(|| format!("binding http on {}", config.http_listen))?;
    let gossip_addr = gossip.local_addr()?;
    let transfer_addr = transfer_listener.local_addr()?;
    let http_addr = http_listener.local_addr()?;

    let (events_tx, events_rx) = mpsc::channel(config.event_queue.max(1));
    let node = Arc::new(Node::new(
        ledger.clone(),
        gossip.clone(),
        store,
        config.mining,
        events_tx.clone(),
    ));
    node.persist().await;

    let mut tasks = JoinSet::new();
    tasks.spawn(gossip.clone().receive(events_tx, token.clone()));

    let transfer = TransferServer::new(ledger, config.transfer_queue, config.transfer_workers);
    let transfer_token = token.clone();
    tasks.spawn(async move {
        if let Err(e) = transfer.serve(transfer_listener, transfer_token).await {
            error!(error = %e, "transfer server failed");
        }
    });

    match node.initial_sync().await {
        Ok(Some(ReplaceOutcome::Replaced { new_height, .. })) => {
            info!(height = new_height, "joined cluster with peer chain")
        }
        Ok(Some(ReplaceOutcome::NotBetter { .. })) => info!("local chain already best"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "initial sync failed, keeping local chain"),
    }

    tasks.spawn(replication::run(node.clone(), events_rx, token.clone()));

    let app = api::router(node.clone());
    let http_token = token.clone();
    tasks.spawn(async move {
        let served = axum::serve(http_listener, app)
            .with_graceful_shutdown(http_token.cancelled_owned())
            .await;
        if let Err(e) = served {
            error!(error = %e, "http server failed");
        }
    });

    info!(
        node_id = %node.id(),
        http = %http_addr,
        gossip = %gossip_addr,
        transfer = %transfer_addr,
        height = node.ledger().height(),
        "node ready"
    );
    Ok(RunningNode {
        node,
        gossip,
        http_addr,
        gossip_addr,
        transfer_addr,
        token,
        tasks,
    })
}
